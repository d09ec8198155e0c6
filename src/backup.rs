//! Whole-store backups: every key with its value, plus when and by which version the backup was
//! made. Restoring overwrites the stored keys in one go.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::storage::{backend::KeyValueBackend, cache::CachedStore};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    /// ISO-8601 moment of the export.
    pub export_date: String,
    pub app_version: String,
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Backup isn't valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Backup is missing `{0}`")]
    MissingField(&'static str),

    #[error("Backup field `{0}` has the wrong type")]
    WrongType(&'static str),

    #[error("Failed to write backup into storage: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Collects every stored key into a backup document.
pub async fn export_backup<B: KeyValueBackend>(
    store: &CachedStore<B>,
    at: DateTime<Utc>,
) -> anyhow::Result<BackupDocument> {
    let mut data = BTreeMap::new();
    for key in store.keys().await? {
        match store.get_item(&key).await {
            Some(value) => {
                data.insert(key, value);
            }
            None => warn!("Key {key} disappeared during export"),
        }
    }
    info!("Exported {} keys", data.len());
    Ok(BackupDocument {
        export_date: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        app_version: APP_VERSION.to_string(),
        data,
    })
}

/// Checks the backup metadata before anything gets touched.
pub fn parse_backup(text: &str) -> Result<BackupDocument, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(mut object) = value else {
        return Err(ImportError::WrongType("root"));
    };

    let export_date = match object.remove("exportDate") {
        Some(Value::String(v)) => v,
        Some(_) => return Err(ImportError::WrongType("exportDate")),
        None => return Err(ImportError::MissingField("exportDate")),
    };
    let app_version = match object.remove("appVersion") {
        Some(Value::String(v)) => v,
        Some(_) => return Err(ImportError::WrongType("appVersion")),
        None => return Err(ImportError::MissingField("appVersion")),
    };
    let data = match object.remove("data") {
        Some(Value::Object(v)) => v.into_iter().collect(),
        Some(_) => return Err(ImportError::WrongType("data")),
        None => return Err(ImportError::MissingField("data")),
    };

    Ok(BackupDocument {
        export_date,
        app_version,
        data,
    })
}

/// Overwrites every key of the backup. Keys the backup doesn't mention are left alone.
pub async fn apply_backup<B: KeyValueBackend>(
    store: &CachedStore<B>,
    backup: BackupDocument,
) -> Result<usize, ImportError> {
    info!(
        "Restoring {} keys from backup made on {} by version {}",
        backup.data.len(),
        backup.export_date,
        backup.app_version
    );
    let count = backup.data.len();
    store
        .replace_all(backup.data.into_iter().collect())
        .await
        .map_err(ImportError::Storage)?;
    Ok(count)
}
