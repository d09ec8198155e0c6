pub mod backup;
pub mod runs;
pub mod trackers;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use backup::{process_backup_command, BackupCommand};
use chrono::{DateTime, Local, Utc};
use chrono_english::{parse_date_string, Dialect};
use clap::{CommandFactory, Parser, Subcommand};
use runs::{process_runs_command, RunsCommand};
use tracing::{info, level_filters::LevelFilter};
use trackers::{
    process_settings_command, process_todo_command, process_water_command, SettingsCommand,
    TodoCommand, WaterCommand,
};

use crate::{
    settings::AppSettings,
    storage::{backend::FileBackend, cache::CachedStore, retry::RetryPolicy, StoreConfig},
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "tracklog", version, long_about = None)]
#[command(about = "Track water intake, running sessions and todos", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long = "log-filter", global = true, help = "Log level, overrides RUST_LOG")]
    log: Option<LevelFilter>,
    #[arg(long = "log-console", global = true, help = "Print logs to the console as well")]
    log_console: bool,
    #[arg(
        long = "debounce-ms",
        global = true,
        default_value_t = 300,
        help = "Quiet period before queued writes are saved"
    )]
    debounce_ms: u64,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Running journal")]
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
    #[command(about = "Water intake")]
    Water {
        #[command(subcommand)]
        command: WaterCommand,
    },
    #[command(about = "Todo list")]
    Todo {
        #[command(subcommand)]
        command: TodoCommand,
    },
    #[command(about = "Show or change settings")]
    Settings {
        #[command(flatten)]
        command: SettingsCommand,
    },
    #[command(about = "Save or restore all data")]
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
}

/// What every command gets to work with.
pub struct AppContext {
    pub app_dir: PathBuf,
    pub store: CachedStore<FileBackend>,
    pub clock: Arc<dyn Clock>,
    pub settings: AppSettings,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(CLI_PREFIX, &app_dir, args.log, args.log_console)?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let store = CachedStore::new(
        FileBackend::new(app_dir.join("data"))?,
        StoreConfig {
            debounce: Duration::from_millis(args.debounce_ms),
            retry: RetryPolicy::default(),
        },
        clock.clone(),
    );
    let settings = AppSettings::load(&store).await;
    let context = AppContext {
        app_dir,
        store: store.clone(),
        clock,
        settings,
    };

    let result = match args.commands {
        Commands::Runs { command } => process_runs_command(&context, command).await,
        Commands::Water { command } => process_water_command(&context, command).await,
        Commands::Todo { command } => process_todo_command(&context, command).await,
        Commands::Settings { command } => process_settings_command(&context, command),
        Commands::Backup { command } => process_backup_command(&context, command).await,
    };

    // Commands only queue their writes.
    let flushed = store.shutdown().await;
    info!("Command finished");
    result.and(flushed)
}

/// Parses user supplied dates like "yesterday", "2 days ago" or "15/03/2025".
pub(crate) fn parse_date(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match parse_date_string(value, now.with_timezone(&Local), Dialect::Uk) {
        Ok(v) => Ok(v.with_timezone(&Utc)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date {value:?}: {e}"),
            )
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use clap::CommandFactory;

    use super::{parse_date, Args};

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_relative_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            parse_date("1 hour ago", now).unwrap(),
            now - Duration::hours(1)
        );
        assert!(parse_date("not a date", now).is_err());
    }
}
