use anyhow::{anyhow, Result};
use clap::Subcommand;

use crate::{hydration::HydrationLog, settings::Language, todo::TodoList};

use super::AppContext;

#[derive(Debug, Subcommand)]
pub enum WaterCommand {
    #[command(about = "Log a drink")]
    Add {
        #[arg(help = "Amount in milliliters")]
        amount_ml: u32,
    },
    #[command(about = "Show today's intake against the daily goal")]
    Today,
}

#[derive(Debug, Subcommand)]
pub enum TodoCommand {
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },
    #[command(about = "Mark a todo as done, or not done if it already was")]
    Done { id: String },
    Remove { id: String },
    List,
    #[command(about = "Remove every finished todo")]
    ClearDone,
}

#[derive(Debug, clap::Args)]
pub struct SettingsCommand {
    #[arg(long = "water-goal", help = "Daily water goal in milliliters")]
    water_goal_ml: Option<u32>,
    #[arg(long, value_enum)]
    language: Option<Language>,
}

pub async fn process_water_command(context: &AppContext, command: WaterCommand) -> Result<()> {
    let mut log = HydrationLog::load(context.store.clone(), context.clock.clone()).await?;
    if let WaterCommand::Add { amount_ml } = command {
        log.add(amount_ml)?;
    }
    let goal = context.settings.daily_water_goal_ml;
    println!(
        "Today: {}ml of {goal}ml ({:.0}%)",
        log.today_total_ml(),
        log.today_progress(goal) * 100.
    );
    Ok(())
}

pub async fn process_todo_command(context: &AppContext, command: TodoCommand) -> Result<()> {
    let mut list = TodoList::load(context.store.clone(), context.clock.clone()).await?;
    match command {
        TodoCommand::Add { title } => {
            let item = list.add(title.join(" "))?;
            println!("Added {}", item.id);
        }
        TodoCommand::Done { id } => {
            let done = list.toggle(&id)?;
            println!("{id} is now {}", if done { "done" } else { "open" });
        }
        TodoCommand::Remove { id } => list.remove(&id)?,
        TodoCommand::List => {
            for item in list.items() {
                println!(
                    "[{}] {}\t{}",
                    if item.done { "x" } else { " " },
                    item.title,
                    item.id
                );
            }
        }
        TodoCommand::ClearDone => {
            let removed = list.clear_completed()?;
            println!("Removed {removed} todos");
        }
    }
    Ok(())
}

pub fn process_settings_command(context: &AppContext, command: SettingsCommand) -> Result<()> {
    let mut settings = context.settings.clone();
    if let Some(goal) = command.water_goal_ml {
        if goal == 0 {
            return Err(anyhow!("Water goal must be positive"));
        }
        settings.daily_water_goal_ml = goal;
    }
    if let Some(language) = command.language {
        settings.language = language;
    }
    if settings != context.settings {
        settings.save(&context.store)?;
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
