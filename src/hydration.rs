//! Water intake log. Entries are stored as one JSON array, progress is measured against the goal
//! from [AppSettings](crate::settings::AppSettings).

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use now::DateTimeNow;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    storage::{backend::KeyValueBackend, cache::CachedStore, keys, list::StoredList},
    utils::{clock::Clock, time::next_day_start},
};

/// Largest amount accepted for a single drink.
pub const MAX_INTAKE_ML: u32 = 5_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterIntake {
    pub id: String,
    pub amount_ml: u32,
    pub at: DateTime<Utc>,
}

pub struct HydrationLog<B> {
    store: CachedStore<B>,
    clock: Arc<dyn Clock>,
    entries: StoredList<WaterIntake>,
}

impl<B: KeyValueBackend> HydrationLog<B> {
    pub async fn load(store: CachedStore<B>, clock: Arc<dyn Clock>) -> Result<Self> {
        let entries = StoredList::load(&store, keys::WATER_INTAKE).await?;
        info!("Loaded {} water intake entries", entries.items.len());
        Ok(Self {
            store,
            clock,
            entries,
        })
    }

    pub fn entries(&self) -> &[WaterIntake] {
        &self.entries.items
    }

    pub fn add(&mut self, amount_ml: u32) -> Result<WaterIntake> {
        if amount_ml == 0 || amount_ml > MAX_INTAKE_ML {
            return Err(anyhow!(
                "Intake amount must be between 1 and {MAX_INTAKE_ML}ml, got {amount_ml}"
            ));
        }
        let entry = WaterIntake {
            id: uuid::Uuid::new_v4().to_string(),
            amount_ml,
            at: self.clock.time(),
        };
        debug!("Adding intake {entry:?}");
        self.entries.items.push(entry.clone());
        self.persist()?;
        Ok(entry)
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.entries.items.len();
        self.entries.items.retain(|e| e.id != id);
        if self.entries.items.len() == before {
            return Err(anyhow!("No intake with id {id}"));
        }
        self.persist()
    }

    /// Amount drunk since the start of the local day.
    pub fn today_total_ml(&self) -> u64 {
        let now = self.clock.time().with_timezone(&Local);
        let start = now.beginning_of_day().with_timezone(&Utc);
        let end = next_day_start(now)
            .map(|v| v.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries
            .items
            .iter()
            .filter(|e| e.at >= start && e.at < end)
            .map(|e| u64::from(e.amount_ml))
            .sum()
    }

    /// Share of `goal_ml` reached today, `1.0` meaning the goal is met.
    pub fn today_progress(&self, goal_ml: u32) -> f64 {
        if goal_ml == 0 {
            return 1.;
        }
        self.today_total_ml() as f64 / goal_ml as f64
    }

    fn persist(&self) -> Result<()> {
        self.entries.save(&self.store, keys::WATER_INTAKE)
    }
}
