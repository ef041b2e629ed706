use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use family_events::cache::{CacheClass, CachedEventStore, CachedValue, TtlCache};
use family_events::domain::{AgeGroup, Event, EventDraft, PriceType};
use family_events::error::Result;
use family_events::pipeline::Orchestrator;
use family_events::storage::{EventFilter, EventStore, InMemoryEventStore, StoreGateway};
use family_events::types::{EventSource, ScrapeOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Notify;

fn event(n: usize) -> Event {
    let start = Utc.with_ymd_and_hms(2026, 12, 5, 16, 0, 0).unwrap() + Duration::days(n as i64);
    event_starting(&format!("Winter Lights Walk {}", n), start)
}

fn event_starting(title: &str, start: chrono::DateTime<Utc>) -> Event {
    EventDraft {
        title: title.to_string(),
        description: "Lantern walk through the gardens".into(),
        date_start: start,
        date_end: start + Duration::hours(2),
        location_name: "Denver Botanic Gardens".into(),
        address: "1007 York St, Denver, CO 80206".into(),
        city: "Denver".into(),
        latitude: 39.7320,
        longitude: -104.9595,
        age_group: AgeGroup::Kid,
        categories: vec!["outdoor".into()],
        price_type: PriceType::Paid,
        source_url: format!("https://example.org/lights/{}", title.replace(' ', "-")),
        image_url: Some("https://example.org/lights.jpg".into()),
    }
    .into_event()
    .unwrap()
}

/// One new event per call.
struct Trickle(AtomicUsize);

#[async_trait]
impl EventSource for Trickle {
    fn name(&self) -> &'static str {
        "trickle"
    }

    async fn scrape(&self) -> ScrapeOutcome {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        ScrapeOutcome::Ok(vec![event(n)])
    }
}

fn wire() -> (Orchestrator, CachedEventStore) {
    let store = Arc::new(InMemoryEventStore::new());
    let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::new(StdDuration::from_secs(300), 1000));
    let gateway = Arc::new(StoreGateway::new(store.clone()).with_hook(cache.clone()));
    let orchestrator = Orchestrator::new(vec![Arc::new(Trickle(AtomicUsize::new(0)))], gateway);
    (orchestrator, CachedEventStore::new(store, cache))
}

#[tokio::test]
async fn reads_reflect_each_cycle() {
    let (orchestrator, events) = wire();
    assert!(events.all_events().await.unwrap().is_empty());
    assert_eq!(events.events_summary().await.unwrap().total_events, 0);

    assert!(orchestrator.run_manual().await.success);
    assert_eq!(events.all_events().await.unwrap().len(), 1);
    assert_eq!(events.events_summary().await.unwrap().total_events, 1);

    assert!(orchestrator.run_manual().await.success);
    assert_eq!(events.all_events().await.unwrap().len(), 2);
}

#[tokio::test]
async fn cleanup_and_clear_invalidate_reads() {
    let (orchestrator, events) = wire();
    orchestrator.run_manual().await;
    assert_eq!(events.all_events().await.unwrap().len(), 1);

    let removed = orchestrator.run_daily_cleanup(Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()).await.unwrap();
    assert_eq!(removed, 1);
    assert!(events.all_events().await.unwrap().is_empty());

    orchestrator.run_manual().await;
    assert_eq!(events.all_events().await.unwrap().len(), 1);
    assert!(orchestrator.clear_database().await);
    assert!(events.all_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn weekly_cleanup_drops_only_events_past_retention() {
    let (orchestrator, events) = wire();
    let now = Utc::now();
    let outcome = orchestrator
        .gateway()
        .save_many(vec![
            event_starting("Eight Days Ago", now - Duration::days(8)),
            event_starting("Six Days Ago", now - Duration::days(6)),
        ])
        .await;
    assert_eq!(outcome.saved_count, 2);
    assert_eq!(events.all_events().await.unwrap().len(), 2);

    assert_eq!(orchestrator.run_weekly_cleanup(now).await.unwrap(), 1);

    let remaining = events.all_events().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].title, "Six Days Ago");
}

#[tokio::test]
async fn scheduler_entries_survive_event_writes() {
    let (orchestrator, events) = wire();
    let cache = events.cache();
    cache.set_in(CacheClass::Scheduler, "status", CachedValue::Json(serde_json::json!({ "running": true })));
    cache.set_in(CacheClass::Locations, "all", CachedValue::Json(serde_json::json!([])));
    cache.set_in(CacheClass::MapData, "denver", CachedValue::Json(serde_json::json!([])));

    orchestrator.run_manual().await;

    assert!(cache.get(&CacheClass::Scheduler.key("status")).is_some());
    assert!(cache.get(&CacheClass::Locations.key("all")).is_some());
    assert!(cache.get(&CacheClass::MapData.key("denver")).is_none());
}

/// In-memory store whose `all()` pauses after taking its snapshot.
struct PausingStore {
    inner: InMemoryEventStore,
    snapshot_taken: Arc<Notify>,
    resume: Arc<Notify>,
}

#[async_trait]
impl EventStore for PausingStore {
    async fn insert(&self, event: Event) -> Result<Event> {
        self.inner.insert(event).await
    }

    async fn all(&self) -> Result<Vec<Event>> {
        let snapshot = self.inner.all().await?;
        self.snapshot_taken.notify_one();
        self.resume.notified().await;
        Ok(snapshot)
    }

    async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        self.inner.by_filter(filter).await
    }

    async fn by_id(&self, id: i64) -> Result<Option<Event>> {
        self.inner.by_id(id).await
    }

    async fn exists_exact(&self, title: &str, date_start: chrono::DateTime<Utc>, location_name: &str) -> Result<bool> {
        self.inner.exists_exact(title, date_start, location_name).await
    }

    async fn find_by_title_location(&self, title: &str, location_name: &str) -> Result<Option<Event>> {
        self.inner.find_by_title_location(title, location_name).await
    }

    async fn delete_start_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize> {
        self.inner.delete_start_before(cutoff).await
    }

    async fn delete_end_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize> {
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
async fn read_overlapping_a_save_does_not_cache_the_old_snapshot() {
    let snapshot_taken = Arc::new(Notify::new());
    let resume = Arc::new(Notify::new());
    let store = Arc::new(PausingStore {
        inner: InMemoryEventStore::new(),
        snapshot_taken: snapshot_taken.clone(),
        resume: resume.clone(),
    });
    let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::new(StdDuration::from_secs(300), 1000));
    let gateway = StoreGateway::new(store.clone()).with_hook(cache.clone());
    let events = CachedEventStore::new(store.clone(), cache.clone());

    let reader = {
        let events = events.clone();
        tokio::spawn(async move { events.all_events().await })
    };
    snapshot_taken.notified().await;

    let outcome = gateway.save_many(vec![event(1)]).await;
    assert_eq!(outcome.saved_count, 1);

    resume.notify_one();
    let stale = reader.await.unwrap().unwrap();
    assert!(stale.is_empty());

    assert!(cache.get(&CacheClass::Events.key("all")).is_none());
    assert_eq!(store.count().await.unwrap(), 1);
}
