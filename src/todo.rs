//! Todo list persisted as one JSON array.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    storage::{backend::KeyValueBackend, cache::CachedStore, keys, list::StoredList},
    utils::clock::Clock,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

pub struct TodoList<B> {
    store: CachedStore<B>,
    clock: Arc<dyn Clock>,
    items: StoredList<TodoItem>,
}

impl<B: KeyValueBackend> TodoList<B> {
    pub async fn load(store: CachedStore<B>, clock: Arc<dyn Clock>) -> Result<Self> {
        let items = StoredList::load(&store, keys::TODOS).await?;
        info!("Loaded {} todos", items.items.len());
        Ok(Self {
            store,
            clock,
            items,
        })
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items.items
    }

    pub fn add(&mut self, title: impl Into<String>) -> Result<TodoItem> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(anyhow!("Todo title can't be empty"));
        }
        let item = TodoItem {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            done: false,
            created_at: self.clock.time(),
        };
        self.items.items.push(item.clone());
        self.persist()?;
        Ok(item)
    }

    /// Flips the done state and returns the new one.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        let item = self
            .items
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("No todo with id {id}"))?;
        item.done = !item.done;
        let done = item.done;
        self.persist()?;
        Ok(done)
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.items.items.len();
        self.items.items.retain(|i| i.id != id);
        if self.items.items.len() == before {
            return Err(anyhow!("No todo with id {id}"));
        }
        self.persist()
    }

    /// Removes finished items, returns how many were removed.
    pub fn clear_completed(&mut self) -> Result<usize> {
        let before = self.items.items.len();
        self.items.items.retain(|i| !i.done);
        let removed = before - self.items.items.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        self.items.save(&self.store, keys::TODOS)
    }
}
