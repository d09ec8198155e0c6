use std::path::PathBuf;

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Subcommand;

use crate::{
    running::{
        csv_export::write_export_file,
        filter::{FilterOptions, MetricField, RangeFilter},
        journal::RunningJournal,
        session::{Feeling, RunningSession, SessionMetrics},
    },
    settings::Language,
    utils::time::format_day,
};

use super::{parse_date, AppContext};

#[derive(Debug, Subcommand)]
pub enum RunsCommand {
    #[command(about = "List sessions, most recent first")]
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    #[command(about = "Log a run or a rest day")]
    Add {
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Replace a logged session")]
    Edit {
        id: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    #[command(about = "Delete a logged session")]
    Delete { id: String },
    #[command(about = "Export sessions passing the filters as CSV")]
    Export {
        #[arg(long, help = "Directory for the export. Defaults to <app dir>/exports")]
        out: Option<PathBuf>,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct SessionArgs {
    #[arg(
        long,
        help = "When the session happened, e.g. \"yesterday\", \"15/03/2025\". Defaults to now"
    )]
    date: Option<String>,
    #[arg(long, value_enum)]
    feeling: Feeling,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, help = "Log a rest day. Metrics aren't allowed")]
    rest: bool,
    #[arg(long, help = "Kilometers")]
    distance: Option<f64>,
    #[arg(long, help = "Minutes")]
    duration: Option<f64>,
    #[arg(long, help = "Minutes per kilometer. Derived from distance and duration if omitted")]
    pace: Option<f64>,
    #[arg(long)]
    calories: Option<f64>,
    #[arg(long, help = "Elevation gain in meters")]
    elevation: Option<f64>,
    #[arg(long = "avg-hr")]
    avg_heart_rate: Option<f64>,
    #[arg(long = "max-hr")]
    max_heart_rate: Option<f64>,
}

impl SessionArgs {
    fn into_session(self, now: DateTime<Utc>) -> Result<RunningSession> {
        let date = match &self.date {
            Some(v) => parse_date(v, now)?,
            None => now,
        };
        let metrics = SessionMetrics {
            distance: self.distance,
            duration: self.duration,
            pace: self.pace,
            calories: self.calories,
            elevation_gain: self.elevation,
            avg_heart_rate: self.avg_heart_rate,
            max_heart_rate: self.max_heart_rate,
        };
        if self.rest {
            let mut session = RunningSession::new_rest(date, self.feeling, self.description);
            // Kept so validation rejects rest days with numbers instead of silently dropping them.
            session.metrics = metrics;
            return Ok(session);
        }
        Ok(RunningSession::new_run(
            date,
            self.feeling,
            self.description,
            metrics.with_derived_pace(),
        ))
    }
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct FilterArgs {
    #[arg(long, help = "Only sessions strictly after this date")]
    from: Option<String>,
    #[arg(long, help = "Only sessions strictly before this date")]
    to: Option<String>,
    #[arg(long, value_enum, help = "Only sessions with these feelings. Can be repeated")]
    feeling: Vec<Feeling>,
    #[arg(long)]
    min_distance: Option<f64>,
    #[arg(long)]
    max_distance: Option<f64>,
    #[arg(long)]
    min_duration: Option<f64>,
    #[arg(long)]
    max_duration: Option<f64>,
    #[arg(long)]
    min_pace: Option<f64>,
    #[arg(long)]
    max_pace: Option<f64>,
    #[arg(long)]
    min_elevation: Option<f64>,
    #[arg(long)]
    max_elevation: Option<f64>,
    #[arg(long = "min-hr")]
    min_heart_rate: Option<f64>,
    #[arg(long = "max-hr")]
    max_heart_rate: Option<f64>,
}

impl FilterArgs {
    /// Only the sub-filters the user gave values for are enabled.
    fn into_options(self, now: DateTime<Utc>) -> Result<FilterOptions> {
        let mut options = FilterOptions::default_at(now);

        if self.from.is_some() || self.to.is_some() {
            options.date_range.enabled = true;
            if let Some(from) = &self.from {
                options.date_range.start_date = parse_date(from, now)?;
            }
            if let Some(to) = &self.to {
                options.date_range.end_date = parse_date(to, now)?;
            }
        }

        if !self.feeling.is_empty() {
            options.feeling.enabled = true;
            options.feeling.values = self.feeling.into_iter().collect();
        }

        let bounds = [
            (MetricField::Distance, self.min_distance, self.max_distance),
            (MetricField::Duration, self.min_duration, self.max_duration),
            (MetricField::Pace, self.min_pace, self.max_pace),
            (MetricField::Elevation, self.min_elevation, self.max_elevation),
            (MetricField::HeartRate, self.min_heart_rate, self.max_heart_rate),
        ];
        for (field, min, max) in bounds {
            if min.is_some() || max.is_some() {
                *options.range_mut(field) = RangeFilter::between(min, max);
            }
        }
        Ok(options)
    }
}

pub async fn process_runs_command(context: &AppContext, command: RunsCommand) -> Result<()> {
    let now = context.clock.time();
    let mut journal = RunningJournal::load(context.store.clone(), context.clock.clone()).await?;

    match command {
        RunsCommand::List { filters } => {
            journal.set_filters(filters.into_options(now)?);
            let sessions = journal.filtered_sessions();
            if sessions.is_empty() {
                println!("No sessions");
            }
            if journal.unreadable_count() > 0 {
                println!(
                    "{} stored sessions couldn't be read, see the logs",
                    journal.unreadable_count()
                );
            }
            for session in sessions {
                print_session(&session, context.settings.language);
            }
        }
        RunsCommand::Add { session } => {
            let session = session.into_session(now)?;
            let id = session.id.clone();
            journal.add(session)?;
            println!("Added session {id}");
        }
        RunsCommand::Edit { id, session } => {
            let mut session = session.into_session(now)?;
            session.id = id.clone();
            journal.update(session)?;
            println!("Updated session {id}");
        }
        RunsCommand::Delete { id } => {
            journal.delete(&id)?;
            println!("Deleted session {id}");
        }
        RunsCommand::Export { out, filters } => {
            journal.set_filters(filters.into_options(now)?);
            match journal.export_csv()? {
                Some(csv) => {
                    let dir = out.unwrap_or_else(|| context.app_dir.join("exports"));
                    let path = write_export_file(&dir, &csv, now).await?;
                    println!("Exported to {}", path.display());
                }
                None => println!("No data to export"),
            }
        }
    }
    Ok(())
}

fn print_session(session: &RunningSession, language: Language) {
    let colour = match session.feeling {
        Feeling::Excellent => Colour::Green,
        Feeling::Good => Colour::Cyan,
        Feeling::Average => Colour::Yellow,
        Feeling::Difficult => Colour::Red,
    };
    let metrics = &session.metrics;
    let summary = if session.is_rest() {
        "rest".to_string()
    } else {
        format!(
            "{}km\t{}min\t{}/km",
            show(metrics.distance),
            show(metrics.duration),
            show(metrics.pace)
        )
    };
    println!(
        "{}\t{}\t{}\t{}\t{}",
        format_day(&session.date.with_timezone(&Local)),
        colour.paint(session.feeling.label(language)),
        summary,
        session.description,
        session.id
    );
}

fn show(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}
