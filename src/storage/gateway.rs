//! Deduplicating write path in front of an [`EventStore`].

use super::EventStore;
use crate::domain::Event;
use crate::error::Result;
use crate::observability::metrics;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Called after every store mutation so derived read caches drop stale entries.
pub trait InvalidationHook: Send + Sync {
    fn events_changed(&self);
}

/// Per-batch result of [`StoreGateway::save_many`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub saved_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    New,
    ExactDuplicate,
    LooseDuplicate,
}

pub struct StoreGateway {
    store: Arc<dyn EventStore>,
    hooks: Vec<Arc<dyn InvalidationHook>>,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store, hooks: Vec::new() }
    }

    pub fn with_hook(mut self, hook: Arc<dyn InvalidationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    fn notify(&self) {
        for hook in &self.hooks {
            hook.events_changed();
        }
    }

    pub async fn exists(&self, title: &str, date_start: DateTime<Utc>, location_name: &str) -> Result<bool> {
        self.store.exists_exact(title, date_start, location_name).await
    }

    async fn disposition(&self, event: &Event) -> Result<Disposition> {
        if self.exists(&event.title, event.date_start, &event.location_name).await? {
            return Ok(Disposition::ExactDuplicate);
        }
        // Synthesized listing times drift between runs, so the same listing
        // is also recognized by title and venue alone.
        if self.store.find_by_title_location(&event.title, &event.location_name).await?.is_some() {
            return Ok(Disposition::LooseDuplicate);
        }
        Ok(Disposition::New)
    }

    /// Inserts every event that matches nothing already stored.
    ///
    /// Duplicates are counted as skipped, never overwritten. A failure on
    /// one event is recorded and the batch carries on.
    pub async fn save_many(&self, events: Vec<Event>) -> SaveOutcome {
        let mut outcome = SaveOutcome::default();
        for event in events {
            let title = event.title.clone();
            let result = match self.disposition(&event).await {
                Ok(Disposition::New) => self.store.insert(event).await.map(|_| true),
                Ok(d) => {
                    debug!("Skipping duplicate '{}' ({:?})", title, d);
                    Ok(false)
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => outcome.saved_count += 1,
                Ok(false) => outcome.skipped_count += 1,
                Err(e) => {
                    error!("Failed to save event '{}': {}", title, e);
                    outcome.failed_count += 1;
                    outcome.errors.push(format!("{}: {}", title, e));
                }
            }
        }
        metrics::store::saved(outcome.saved_count);
        metrics::store::skipped(outcome.skipped_count);
        info!(
            "💾 Saved {} events, skipped {} duplicates, {} failed",
            outcome.saved_count, outcome.skipped_count, outcome.failed_count
        );
        self.notify();
        outcome
    }

    /// Removes events whose start is before `cutoff`.
    ///
    /// Cutoffs are truncated to whole seconds like stored instants.
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = cutoff.trunc_subsecs(0);
        let result = self.store.delete_start_before(cutoff).await;
        self.notify();
        let removed = result?;
        metrics::store::deleted("start_before", removed);
        info!("🧹 Deleted {} events starting before {}", removed, cutoff);
        Ok(removed)
    }

    /// Removes events that ended before `as_of`.
    pub async fn delete_expired(&self, as_of: DateTime<Utc>) -> Result<usize> {
        let as_of = as_of.trunc_subsecs(0);
        let result = self.store.delete_end_before(as_of).await;
        self.notify();
        let removed = result?;
        metrics::store::deleted("expired", removed);
        info!("🧹 Deleted {} events that ended before {}", removed, as_of);
        Ok(removed)
    }

    /// Administrative wipe; `false` when the store refused.
    pub async fn clear_all(&self) -> bool {
        let result = self.store.clear().await;
        self.notify();
        match result {
            Ok(removed) => {
                metrics::store::deleted("clear", removed);
                info!("Cleared {} events from the store", removed);
                true
            }
            Err(e) => {
                error!("Failed to clear event store: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeGroup, EventDraft, PriceType};
    use crate::storage::{EventFilter, InMemoryEventStore, SqliteEventStore};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    impl InvalidationHook for CountingHook {
        fn events_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(title: &str, start: DateTime<Utc>) -> Event {
        EventDraft {
            title: title.into(),
            description: "Pumpkins and hayrides".into(),
            date_start: start,
            date_end: start + Duration::hours(3),
            location_name: "Four Mile Historic Park".into(),
            address: "715 S Forest St, Denver, CO 80246".into(),
            city: "Denver".into(),
            latitude: 39.7036,
            longitude: -104.9318,
            age_group: AgeGroup::Kid,
            categories: vec!["festivals".into()],
            price_type: PriceType::Paid,
            source_url: "https://www.denver.org/events/harvest".into(),
            image_url: Some("https://img.example/harvest.jpg".into()),
        }
        .into_event()
        .unwrap()
    }

    #[tokio::test]
    async fn test_exact_and_loose_duplicates_are_skipped() {
        let store = Arc::new(InMemoryEventStore::new());
        let hook = Arc::new(CountingHook::default());
        let gateway = StoreGateway::new(store.clone()).with_hook(hook.clone());
        let t = Utc.with_ymd_and_hms(2026, 10, 24, 16, 0, 0).unwrap();

        let first = gateway.save_many(vec![event("Harvest Festival", t)]).await;
        assert_eq!(first.saved_count, 1);

        // same triple, then same title/venue with a drifted start
        let second = gateway
            .save_many(vec![event("Harvest Festival", t), event("Harvest Festival", t + Duration::hours(2))])
            .await;
        assert_eq!(second.saved_count, 0);
        assert_eq!(second.skipped_count, 2);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(hook.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch_saved_once() {
        let store = Arc::new(InMemoryEventStore::new());
        let gateway = StoreGateway::new(store.clone());
        let t = Utc.with_ymd_and_hms(2026, 10, 24, 16, 0, 0).unwrap();
        let outcome = gateway.save_many(vec![event("Corn Maze", t), event("Corn Maze", t)]).await;
        assert_eq!((outcome.saved_count, outcome.skipped_count), (1, 1));
    }

    /// Store whose inserts fail for one title
    struct FlakyStore {
        inner: InMemoryEventStore,
        poison: &'static str,
    }

    #[async_trait]
    impl EventStore for FlakyStore {
        async fn insert(&self, event: Event) -> Result<Event> {
            if event.title == self.poison {
                return Err(crate::error::ScraperError::Storage("disk full".into()));
            }
            self.inner.insert(event).await
        }
        async fn all(&self) -> Result<Vec<Event>> {
            self.inner.all().await
        }
        async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<Event>> {
            self.inner.by_filter(filter).await
        }
        async fn by_id(&self, id: i64) -> Result<Option<Event>> {
            self.inner.by_id(id).await
        }
        async fn exists_exact(&self, title: &str, date_start: DateTime<Utc>, location_name: &str) -> Result<bool> {
            self.inner.exists_exact(title, date_start, location_name).await
        }
        async fn find_by_title_location(&self, title: &str, location_name: &str) -> Result<Option<Event>> {
            self.inner.find_by_title_location(title, location_name).await
        }
        async fn delete_start_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
            self.inner.delete_start_before(cutoff).await
        }
        async fn delete_end_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
            self.inner.delete_end_before(cutoff).await
        }
        async fn clear(&self) -> Result<usize> {
            self.inner.clear().await
        }
        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let store = Arc::new(FlakyStore { inner: InMemoryEventStore::new(), poison: "Broken" });
        let gateway = StoreGateway::new(store.clone());
        let t = Utc.with_ymd_and_hms(2026, 10, 24, 16, 0, 0).unwrap();
        let outcome = gateway
            .save_many(vec![event("Before", t), event("Broken", t), event("After", t)])
            .await;
        assert_eq!(outcome.saved_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert!(outcome.errors[0].contains("disk full"));
    }

    #[tokio::test]
    async fn test_deletes_fire_hook() {
        let store = Arc::new(InMemoryEventStore::new());
        let hook = Arc::new(CountingHook::default());
        let gateway = StoreGateway::new(store.clone()).with_hook(hook.clone());
        let t = Utc.with_ymd_and_hms(2026, 10, 24, 16, 0, 0).unwrap();
        gateway.save_many(vec![event("Old", t - Duration::days(8))]).await;

        assert_eq!(gateway.delete_expired(t).await.unwrap(), 1);
        assert_eq!(gateway.delete_before(t).await.unwrap(), 0);
        assert!(gateway.clear_all().await);
        assert_eq!(hook.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_subsecond_cutoff_agrees_across_backends() {
        let start = Utc.with_ymd_and_hms(2026, 10, 24, 9, 0, 0).unwrap();
        // ends 12:00:00; cutoff half a second later
        let as_of = start + Duration::hours(3) + Duration::milliseconds(500);

        let stores: Vec<Arc<dyn EventStore>> =
            vec![Arc::new(InMemoryEventStore::new()), Arc::new(SqliteEventStore::open_in_memory().unwrap())];
        for store in stores {
            let gateway = StoreGateway::new(store.clone());
            gateway.save_many(vec![event("Hayride", start)]).await;
            assert_eq!(gateway.delete_expired(as_of).await.unwrap(), 0);
            assert_eq!(gateway.delete_before(start + Duration::milliseconds(500)).await.unwrap(), 0);
            assert_eq!(store.count().await.unwrap(), 1);
        }
    }
}
