use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    storage::{backend::KeyValueBackend, cache::CachedStore, keys, list::StoredList},
    utils::clock::Clock,
};

use super::{
    csv_export::export_csv,
    filter::{apply_filters, FilterOptions},
    session::{RunningSession, SessionError},
};

/// The running journal as the rest of the application sees it: the stored sessions plus the
/// filter currently applied to them.
///
/// The whole collection is rewritten on every change. The store takes care of batching.
pub struct RunningJournal<B> {
    store: CachedStore<B>,
    clock: Arc<dyn Clock>,
    sessions: StoredList<RunningSession>,
    filters: FilterOptions,
}

impl<B: KeyValueBackend> RunningJournal<B> {
    /// Reads every session from the store. Nothing stored starts an empty journal. Sessions
    /// that can't be read are carried along untouched, and data that isn't a list at all is an
    /// error so it never gets overwritten.
    pub async fn load(store: CachedStore<B>, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut sessions = StoredList::load(&store, keys::RUNNING_SESSIONS).await?;
        set_aside_duplicates(&mut sessions)?;
        info!("Loaded {} running sessions", sessions.items.len());
        if !sessions.unreadable.is_empty() {
            warn!(
                "{} stored sessions couldn't be read and are kept as is",
                sessions.unreadable.len()
            );
        }
        let filters = FilterOptions::default_at(clock.time());
        Ok(Self {
            store,
            clock,
            sessions,
            filters,
        })
    }

    pub fn sessions(&self) -> &[RunningSession] {
        &self.sessions.items
    }

    /// Stored entries that couldn't be read as sessions.
    pub fn unreadable_count(&self) -> usize {
        self.sessions.unreadable.len()
    }

    pub fn get(&self, id: &str) -> Option<&RunningSession> {
        self.sessions.items.iter().find(|s| s.id == id)
    }

    pub fn add(&mut self, session: RunningSession) -> Result<()> {
        session.validate()?;
        if self.get(&session.id).is_some() {
            return Err(SessionError::DuplicateId(session.id).into());
        }
        debug!("Adding session {}", session.id);
        self.sessions.items.push(session);
        self.persist()
    }

    /// Replaces the session that has the same id.
    pub fn update(&mut self, session: RunningSession) -> Result<()> {
        session.validate()?;
        let Some(existing) = self.sessions.items.iter_mut().find(|s| s.id == session.id) else {
            return Err(SessionError::NotFound(session.id).into());
        };
        *existing = session;
        self.persist()
    }

    pub fn delete(&mut self, id: &str) -> Result<RunningSession> {
        let Some(index) = self.sessions.items.iter().position(|s| s.id == id) else {
            return Err(SessionError::NotFound(id.to_string()).into());
        };
        let removed = self.sessions.items.remove(index);
        self.persist()?;
        Ok(removed)
    }

    pub fn filters(&self) -> &FilterOptions {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: FilterOptions) {
        self.filters = filters;
    }

    /// Back to the default filters, with the date range recomputed from the current time.
    pub fn reset_filters(&mut self) {
        self.filters = FilterOptions::default_at(self.clock.time());
    }

    pub fn filtered_sessions(&self) -> Vec<RunningSession> {
        apply_filters(&self.sessions.items, &self.filters)
    }

    /// CSV of the filtered view, `None` when no session passes the filters.
    pub fn export_csv(&self) -> Result<Option<String>> {
        export_csv(&self.filtered_sessions())
    }

    fn persist(&self) -> Result<()> {
        self.sessions.save(&self.store, keys::RUNNING_SESSIONS)
    }
}

/// Later sessions reusing an id, which imported data can contain, are kept out of the journal
/// like unreadable ones so ids stay unique.
fn set_aside_duplicates(sessions: &mut StoredList<RunningSession>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(sessions.items.len());
    for session in sessions.items.drain(..) {
        if seen.insert(session.id.clone()) {
            unique.push(session);
        } else {
            warn!("Setting aside session with repeated id {}", session.id);
            sessions.unreadable.push(serde_json::to_value(&session)?);
        }
    }
    sessions.items = unique;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use crate::{
        running::{
            filter::RangeFilter,
            session::{Feeling, RunningSession, SessionError, SessionMetrics},
        },
        storage::{backend::FileBackend, cache::CachedStore, keys, StoreConfig},
        utils::{
            clock::{Clock, FixedClock},
            time::months_before,
        },
    };

    use super::RunningJournal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(now()))
    }

    /// Clock the test moves by hand.
    struct ManualClock(Mutex<DateTime<Utc>>);

    #[async_trait]
    impl Clock for ManualClock {
        fn time(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }

        async fn sleep(&self, duration: std::time::Duration) {
            tokio::time::sleep(duration).await;
        }
    }

    fn file_store(dir: &std::path::Path) -> Result<CachedStore<FileBackend>> {
        Ok(CachedStore::new(
            FileBackend::new(dir.to_owned())?,
            StoreConfig::default(),
            clock(),
        ))
    }

    fn run(days_ago: i64, distance: f64) -> RunningSession {
        RunningSession::new_run(
            now() - Duration::days(days_ago),
            Feeling::Good,
            format!("{distance}km"),
            SessionMetrics {
                distance: Some(distance),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_journal_persists_and_reloads() -> Result<()> {
        let dir = tempdir()?;
        let store = CachedStore::new(
            FileBackend::new(dir.path().to_owned())?,
            StoreConfig::default(),
            clock(),
        );

        let mut journal = RunningJournal::load(store.clone(), clock()).await?;
        assert!(journal.sessions().is_empty());

        journal.add(run(3, 5.))?;
        journal.add(run(1, 10.))?;
        let removed = journal.sessions()[0].id.clone();
        journal.delete(&removed)?;
        store.shutdown().await?;

        let store = CachedStore::new(
            FileBackend::new(dir.path().to_owned())?,
            StoreConfig::default(),
            clock(),
        );
        let journal = RunningJournal::load(store, clock()).await?;
        assert_eq!(journal.sessions().len(), 1);
        assert_eq!(journal.sessions()[0].metrics.distance, Some(10.));
        Ok(())
    }

    #[tokio::test]
    async fn test_journal_reads_stored_json() -> Result<()> {
        let dir = tempdir()?;
        let store = CachedStore::new(
            FileBackend::new(dir.path().to_owned())?,
            StoreConfig::default(),
            clock(),
        );
        store
            .replace_all(vec![(
                keys::RUNNING_SESSIONS.to_string(),
                json!([{
                    "id": "a",
                    "date": "2024-01-20T07:00:00Z",
                    "feeling": "Bien",
                    "description": "legacy",
                    "distance": 7.5
                }]),
            )])
            .await?;
        store.clear_cache();

        let journal = RunningJournal::load(store, clock()).await?;
        let session = journal.get("a").unwrap();
        assert_eq!(session.feeling, Feeling::Good);
        assert_eq!(session.date, Utc.with_ymd_and_hms(2024, 1, 20, 7, 0, 0).unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_errors() -> Result<()> {
        let dir = tempdir()?;
        let store = CachedStore::new(
            FileBackend::new(dir.path().to_owned())?,
            StoreConfig::default(),
            clock(),
        );
        let mut journal = RunningJournal::load(store.clone(), clock()).await?;

        let mut session = run(2, 6.);
        journal.add(session.clone())?;
        session.feeling = Feeling::Excellent;
        journal.update(session.clone())?;
        assert_eq!(journal.get(&session.id).unwrap().feeling, Feeling::Excellent);

        let err = journal.delete("unknown").unwrap_err();
        assert_eq!(
            err.downcast_ref::<SessionError>(),
            Some(&SessionError::NotFound("unknown".into()))
        );

        let mut rest = RunningSession::new_rest(now(), Feeling::Good, "");
        rest.metrics.pace = Some(5.);
        assert!(journal.add(rest).is_err());
        assert_eq!(journal.sessions().len(), 1);

        store.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_filtering_export_and_reset() -> Result<()> {
        let dir = tempdir()?;
        let store = CachedStore::new(
            FileBackend::new(dir.path().to_owned())?,
            StoreConfig::default(),
            clock(),
        );
        let mut journal = RunningJournal::load(store.clone(), clock()).await?;
        journal.add(run(10, 5.))?;
        journal.add(run(5, 12.))?;

        let mut filters = journal.filters().clone();
        filters.distance = RangeFilter::between(Some(20.), None);
        journal.set_filters(filters);
        assert!(journal.filtered_sessions().is_empty());
        assert_eq!(journal.export_csv()?, None);

        journal.reset_filters();
        assert_eq!(journal.filters().date_range.end_date, now());
        let csv = journal.export_csv()?.unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().nth(1).unwrap().contains("\"12km\""));

        store.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_sessions_are_not_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let store = file_store(dir.path())?;
        let broken = json!({
            "id": "b",
            "date": "2024-01-21T07:00:00Z",
            "feeling": "Super",
            "distance": 3.0
        });
        store
            .replace_all(vec![(
                keys::RUNNING_SESSIONS.to_string(),
                json!([
                    {"id": "a", "date": "2024-01-20T07:00:00Z", "feeling": "Excellent"},
                    broken.clone()
                ]),
            )])
            .await?;
        store.clear_cache();

        let mut journal = RunningJournal::load(store.clone(), clock()).await?;
        assert_eq!(journal.sessions().len(), 1);
        assert_eq!(journal.unreadable_count(), 1);
        journal.add(run(1, 4.))?;
        store.shutdown().await?;

        let store = file_store(dir.path())?;
        let stored = store.get_item(keys::RUNNING_SESSIONS).await.unwrap();
        let stored = stored.as_array().unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0]["id"], json!("a"));
        assert!(stored.contains(&broken));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_refuses_data_that_is_not_a_list() -> Result<()> {
        let dir = tempdir()?;
        let store = file_store(dir.path())?;
        store
            .replace_all(vec![(
                keys::RUNNING_SESSIONS.to_string(),
                json!({"id": "a"}),
            )])
            .await?;

        assert!(RunningJournal::load(store, clock()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let store = file_store(dir.path())?;
        let mut journal = RunningJournal::load(store.clone(), clock()).await?;

        let session = run(1, 5.);
        journal.add(session.clone())?;
        let err = journal.add(session.clone()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<SessionError>(),
            Some(&SessionError::DuplicateId(session.id))
        );
        assert_eq!(journal.sessions().len(), 1);
        store.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_stored_ids_are_set_aside() -> Result<()> {
        let dir = tempdir()?;
        let store = file_store(dir.path())?;
        store
            .replace_all(vec![(
                keys::RUNNING_SESSIONS.to_string(),
                json!([
                    {"id": "a", "date": "2024-01-20T07:00:00Z", "feeling": "Good"},
                    {"id": "a", "date": "2024-01-22T07:00:00Z", "feeling": "Average"}
                ]),
            )])
            .await?;

        let journal = RunningJournal::load(store, clock()).await?;
        assert_eq!(journal.sessions().len(), 1);
        assert_eq!(journal.get("a").unwrap().feeling, Feeling::Good);
        assert_eq!(journal.unreadable_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_uses_time_of_reset() -> Result<()> {
        let dir = tempdir()?;
        let store = file_store(dir.path())?;
        let manual = Arc::new(ManualClock(Mutex::new(now())));
        let mut journal = RunningJournal::load(store, manual.clone()).await?;
        assert_eq!(journal.filters().date_range.end_date, now());

        let later = now() + Duration::days(45);
        *manual.0.lock().unwrap() = later;
        journal.reset_filters();

        assert_eq!(journal.filters().date_range.end_date, later);
        assert_eq!(
            journal.filters().date_range.start_date,
            months_before(later, 3)
        );
        Ok(())
    }
}
