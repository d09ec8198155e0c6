use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{backend::KeyValueBackend, cache::CachedStore, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fr,
}

pub const DEFAULT_WATER_GOAL_ML: u32 = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub daily_water_goal_ml: u32,
    pub language: Language,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            daily_water_goal_ml: DEFAULT_WATER_GOAL_ML,
            language: Language::default(),
        }
    }
}

impl AppSettings {
    /// Stored settings, or the defaults when nothing usable is stored. Unreadable settings are
    /// logged so every other command keeps working.
    pub async fn load<B: KeyValueBackend>(store: &CachedStore<B>) -> Self {
        store
            .get(keys::SETTINGS)
            .await
            .inspect_err(|e| warn!("Using default settings, {e}"))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn save<B: KeyValueBackend>(&self, store: &CachedStore<B>) -> anyhow::Result<()> {
        store.set(keys::SETTINGS, self)
    }
}
