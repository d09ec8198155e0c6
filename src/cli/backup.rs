use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use tracing::error;

use crate::{
    backup::{apply_backup, export_backup, parse_backup},
    fs::operations::write_atomically,
};

use super::AppContext;

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    #[command(about = "Write every stored value into a JSON file")]
    Export { file: PathBuf },
    #[command(about = "Overwrite stored values with the content of a backup")]
    Import {
        file: PathBuf,
        #[arg(long, help = "Apply the backup. Without it only a summary is printed")]
        yes: bool,
    },
}

pub async fn process_backup_command(context: &AppContext, command: BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Export { file } => {
            let backup = export_backup(&context.store, context.clock.time()).await?;
            write_atomically(&file, serde_json::to_string_pretty(&backup)?.as_bytes()).await?;
            println!("Saved {} keys to {}", backup.data.len(), file.display());
        }
        BackupCommand::Import { file, yes } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let backup = parse_backup(&text)
                .inspect_err(|e| error!("Rejected backup {file:?}: {e}"))?;
            println!(
                "Backup from {} (version {}) contains {} keys:",
                backup.export_date,
                backup.app_version,
                backup.data.len()
            );
            for key in backup.data.keys() {
                println!("  {key}");
            }
            if !yes {
                println!("Nothing changed. Run again with --yes to overwrite the stored values");
                return Ok(());
            }
            let restored = apply_backup(&context.store, backup).await?;
            println!("Restored {restored} keys");
        }
    }
    Ok(())
}
