use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, sync::RwLock};
use tracing::{debug, warn};

use crate::fs::operations::{
    decode_file_name, encode_file_name, read_to_string_opt, write_atomically,
};

/// Interface for the persistent store sitting behind the cache. Values are opaque strings, the
/// cache decides how they are serialized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueBackend: Send + Sync + 'static {
    /// Returns the raw value stored under `key`, `None` if nothing is stored.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes every entry in one operation.
    async fn multi_set(&self, entries: Vec<(String, String)>) -> Result<()>;

    /// Lists all keys that currently hold a value.
    async fn keys(&self) -> Result<Vec<String>>;
}

const VALUE_EXTENSION: &str = "json";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// The main realization of [KeyValueBackend]. Every key lives in its own file inside `data_dir`.
///
/// Callers inside this process are ordered by `access`. The file lock on `.lock` only keeps
/// other processes out and is waited for on the blocking pool, never on the runtime thread.
pub struct FileBackend {
    data_dir: PathBuf,
    access: RwLock<()>,
}

impl FileBackend {
    pub fn new(data_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            access: RwLock::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{VALUE_EXTENSION}", encode_file_name(key)))
    }

    async fn lock_file(&self, mode: LockMode) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.data_dir.join(LOCK_FILE))
            .await?;
        let file = tokio::task::spawn_blocking(move || {
            let locked = match mode {
                LockMode::Shared => file.lock_shared(),
                LockMode::Exclusive => file.lock_exclusive(),
            };
            locked.map(|_| file)
        })
        .await??;
        Ok(file)
    }
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _access = self.access.read().await;
        let lock = self.lock_file(LockMode::Shared).await?;
        let value = read_to_string_opt(&self.path_for(key)).await;
        lock.unlock_async().await?;
        Ok(value?)
    }

    async fn multi_set(&self, entries: Vec<(String, String)>) -> Result<()> {
        debug!("Writing {} entries into {:?}", entries.len(), self.data_dir);
        let _access = self.access.write().await;
        let lock = self.lock_file(LockMode::Exclusive).await?;
        let mut result = Ok(());
        for (key, value) in &entries {
            if let Err(e) = write_atomically(&self.path_for(key), value.as_bytes()).await {
                result = Err(e);
                break;
            }
        }
        lock.unlock_async().await?;
        Ok(result?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let _access = self.access.read().await;
        let mut keys = vec![];
        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("Skipping non utf-8 file {:?}", entry.path());
                continue;
            };
            let Some(stem) = name.strip_suffix(&format!(".{VALUE_EXTENSION}")) else {
                continue;
            };
            match decode_file_name(stem) {
                Some(key) => keys.push(key),
                None => warn!("Skipping file with unexpected name {name}"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
