use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::utils::clock::Clock;

use super::{
    backend::KeyValueBackend,
    debounce::{DebounceTimer, TimerState},
    StoreConfig,
};

#[derive(Debug, Clone)]
struct PendingWrite {
    value: String,
    failed_attempts: u32,
}

/// Writes handed to the backend together.
struct Batch {
    id: u64,
    entries: Vec<(String, PendingWrite)>,
}

#[derive(Default)]
struct StoreState {
    /// `None` caches a key that is known to be absent.
    cache: HashMap<String, Option<Value>>,
    pending: HashMap<String, PendingWrite>,
    /// Values of batches the backend hasn't confirmed yet, tagged with their batch id.
    in_flight: HashMap<String, (u64, String)>,
    last_batch: u64,
    timer: DebounceTimer,
}

impl StoreState {
    /// Newest value of `key` the backend may not hold yet.
    fn unflushed(&self, key: &str) -> Option<&str> {
        self.pending
            .get(key)
            .map(|write| write.value.as_str())
            .or_else(|| self.in_flight.get(key).map(|(_, value)| value.as_str()))
    }

    fn take_pending(&mut self) -> Batch {
        let entries = self.pending.drain().collect();
        self.start_batch(entries)
    }

    fn start_batch(&mut self, entries: Vec<(String, PendingWrite)>) -> Batch {
        self.last_batch += 1;
        let id = self.last_batch;
        for (key, write) in &entries {
            self.in_flight.insert(key.clone(), (id, write.value.clone()));
        }
        Batch { id, entries }
    }

    fn finish_batch(&mut self, id: u64) {
        self.in_flight.retain(|_, (batch, _)| *batch != id);
    }
}

struct Shared<B> {
    backend: B,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    state: Mutex<StoreState>,
}

/// Read cache and write batcher in front of a [KeyValueBackend].
///
/// Reads are answered from memory once a key has been seen. Writes update memory right away and
/// reach the backend in one batch after the store has been quiet for [StoreConfig::debounce].
/// Persistence is best effort until [CachedStore::flush_now] or [CachedStore::shutdown]
/// returns.
///
/// Cloning is cheap and every clone shares the same cache. Writing requires a running tokio
/// runtime since the flush timer is a spawned task.
pub struct CachedStore<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for CachedStore<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: KeyValueBackend> CachedStore<B> {
    pub fn new(backend: B, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                clock,
                config,
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    /// Returns the value for `key`. Values that aren't valid JSON come back as
    /// [Value::String]. Backend failures are logged and reported as absent.
    ///
    /// Two concurrent misses on the same key both read the backend. Whichever finishes first
    /// fills the cache, and a value written in the meantime always wins.
    pub async fn get_item(&self, key: &str) -> Option<Value> {
        self.read(key)
            .await
            .inspect_err(|e| error!("Failed to read {key} from storage {e:?}"))
            .ok()
            .flatten()
    }

    /// Updates the cache and queues the value for the next flush. Strings are stored as is,
    /// everything else as JSON.
    pub fn set_item(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let serialized = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        debug!("Queueing write for {key}");

        let mut state = self.shared.lock();
        state.cache.insert(key.clone(), Some(value));
        state.pending.insert(
            key,
            PendingWrite {
                value: serialized,
                failed_attempts: 0,
            },
        );
        self.shared.arm(&mut state, self.shared.config.debounce);
    }

    /// Typed variant of [Self::get_item]. Unlike it, a backend failure or a stored value of the
    /// wrong shape is an error, so callers never mistake unreadable data for missing data.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.read(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| anyhow!("Stored value for {key} has unexpected shape: {e}"))
    }

    /// Typed variant of [Self::set_item].
    pub fn set<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        self.set_item(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Forgets every cached value. Pending writes are kept.
    pub fn clear_cache(&self) {
        self.shared.lock().cache.clear();
    }

    /// All keys that hold a value, including writes that haven't been flushed yet.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = self.shared.backend.keys().await?;
        keys.extend(self.shared.lock().pending.keys().cloned());
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Overwrites many keys at once and waits for the backend. Pending writes for those keys
    /// are superseded.
    pub async fn replace_all(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let batch = {
            let mut state = self.shared.lock();
            let entries = entries
                .into_iter()
                .map(|(key, value)| {
                    let serialized = match &value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    state.pending.remove(&key);
                    state.cache.insert(key.clone(), Some(value));
                    (
                        key,
                        PendingWrite {
                            value: serialized,
                            failed_attempts: 0,
                        },
                    )
                })
                .collect::<Vec<_>>();
            state.start_batch(entries)
        };
        info!("Replacing {} keys", batch.entries.len());
        self.shared.write_batch(batch, None).await
    }

    /// Writes everything pending right now, skipping the debounce delay.
    pub async fn flush_now(&self) -> Result<()> {
        let batch = {
            let mut state = self.shared.lock();
            state.timer.disarm();
            state.take_pending()
        };
        if batch.entries.is_empty() {
            return Ok(());
        }
        self.shared.write_batch(batch, None).await
    }

    /// Persists pending writes before the process goes away.
    pub async fn shutdown(self) -> Result<()> {
        let pending = self.pending_writes();
        info!("Shutting down store with {pending} pending writes");
        self.flush_now()
            .await
            .inspect_err(|e| error!("Failed to persist pending writes on shutdown {e:?}"))
    }

    async fn read(&self, key: &str) -> Result<Option<Value>> {
        {
            let state = self.shared.lock();
            if let Some(cached) = state.cache.get(key) {
                return Ok(cached.clone());
            }
            // The cache was cleared while a write is still waiting for, or going through, its
            // flush.
            if let Some(raw) = state.unflushed(key) {
                return Ok(Some(parse_stored(raw.to_string())));
            }
        }

        let value = self.shared.backend.get(key).await?.map(parse_stored);

        let mut state = self.shared.lock();
        let cached = state.cache.entry(key.to_string()).or_insert(value);
        Ok(cached.clone())
    }

    pub fn pending_writes(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn timer_state(&self) -> TimerState {
        self.shared.lock().timer.state()
    }
}

impl<B: KeyValueBackend> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (Re)starts the quiet period. A fresh task is spawned every time, so arming never waits
    /// for a flush that is still talking to the backend.
    fn arm(self: &Arc<Self>, state: &mut StoreState, delay: Duration) {
        let ticket = state.timer.arm();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = ticket.token.cancelled() => return,
                _ = shared.clock.sleep(delay) => (),
            }
            shared.fire(ticket.generation).await;
        });
    }

    async fn fire(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut state = self.lock();
            if !state.timer.fire(generation) {
                return;
            }
            state.take_pending()
        };
        if !batch.entries.is_empty() {
            // Failures are already logged and re-queued.
            let _ = self.write_batch(batch, Some(generation)).await;
        } else {
            self.lock().timer.finish(generation);
        }
    }

    async fn write_batch(
        self: &Arc<Self>,
        batch: Batch,
        generation: Option<u64>,
    ) -> Result<()> {
        let entries = batch
            .entries
            .iter()
            .map(|(key, write)| (key.clone(), write.value.clone()))
            .collect::<Vec<_>>();
        let result = self.backend.multi_set(entries).await;

        let mut state = self.lock();
        if let Some(generation) = generation {
            state.timer.finish(generation);
        }
        state.finish_batch(batch.id);
        match result {
            Ok(()) => {
                debug!("Flushed {} writes", batch.entries.len());
                Ok(())
            }
            Err(e) => {
                error!("Failed to flush {} writes {e:?}", batch.entries.len());
                self.requeue(&mut state, batch.entries);
                Err(e)
            }
        }
    }

    fn requeue(self: &Arc<Self>, state: &mut StoreState, batch: Vec<(String, PendingWrite)>) {
        let policy = &self.config.retry;
        let mut worst_attempt = 0;
        for (key, mut write) in batch {
            write.failed_attempts += 1;
            if !policy.allows(write.failed_attempts) {
                error!(
                    "Giving up on writing {key} after {} attempts",
                    write.failed_attempts
                );
                continue;
            }
            worst_attempt = worst_attempt.max(write.failed_attempts);
            // A newer value queued during the flush replaces the failed one.
            state.pending.entry(key).or_insert(write);
        }

        if worst_attempt > 0 && state.timer.state() != TimerState::Armed {
            let delay = policy.delay_for(worst_attempt);
            warn!("Retrying flush in {delay:?}");
            self.arm(state, delay);
        }
    }
}

impl<B> Drop for Shared<B> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.pending.is_empty() {
            warn!(
                "Store dropped with {} unflushed writes, they are lost",
                state.pending.len()
            );
        }
    }
}

fn parse_stored(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}
