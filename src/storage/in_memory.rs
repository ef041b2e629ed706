use super::{EventFilter, EventStore};
use crate::domain::Event;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct Inner {
    next_id: i64,
    events: HashMap<i64, Event>,
}

/// In-memory event store for development and tests
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| ScraperError::Storage(format!("event map lock poisoned: {}", e)))
    }

    fn sorted(mut events: Vec<Event>) -> Vec<Event> {
        events.sort_by(|a, b| a.date_start.cmp(&b.date_start).then(a.id.cmp(&b.id)));
        events
    }

    fn retain(&self, keep: impl Fn(&Event) -> bool) -> Result<usize> {
        let mut inner = self.lock()?;
        let before = inner.events.len();
        inner.events.retain(|_, e| keep(e));
        Ok(before - inner.events.len())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, mut event: Event) -> Result<Event> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;
        event.id = Some(id);
        inner.events.insert(id, event.clone());

        debug!("Created event: {} with id {}", event.title, id);
        Ok(event)
    }

    async fn all(&self) -> Result<Vec<Event>> {
        let inner = self.lock()?;
        Ok(Self::sorted(inner.events.values().cloned().collect()))
    }

    async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let inner = self.lock()?;
        Ok(Self::sorted(inner.events.values().filter(|e| filter.matches(e)).cloned().collect()))
    }

    async fn by_id(&self, id: i64) -> Result<Option<Event>> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn exists_exact(&self, title: &str, date_start: DateTime<Utc>, location_name: &str) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .values()
            .any(|e| e.title == title && e.date_start == date_start && e.location_name == location_name))
    }

    async fn find_by_title_location(&self, title: &str, location_name: &str) -> Result<Option<Event>> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .values()
            .find(|e| e.title == title && e.location_name == location_name)
            .cloned())
    }

    async fn delete_start_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.retain(|e| e.date_start >= cutoff)
    }

    async fn delete_end_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.retain(|e| e.date_end >= cutoff)
    }

    async fn clear(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        let removed = inner.events.len();
        inner.events.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgeGroup, EventDraft, PriceType};
    use chrono::{Duration, TimeZone};

    fn event(title: &str, start: DateTime<Utc>) -> Event {
        EventDraft {
            title: title.into(),
            description: "Stories and songs".into(),
            date_start: start,
            date_end: start + Duration::hours(1),
            location_name: "Central Library".into(),
            address: "10 W 14th Ave Pkwy, Denver, CO 80204".into(),
            city: "Denver".into(),
            latitude: 39.7365,
            longitude: -104.9891,
            age_group: AgeGroup::Baby,
            categories: vec!["Book Clubs & Storytime".into()],
            price_type: PriceType::Free,
            source_url: format!("https://example.org/{}", title),
            image_url: Some("https://img.example/x.jpg".into()),
        }
        .into_event()
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = InMemoryEventStore::new();
        let t = Utc.with_ymd_and_hms(2026, 11, 1, 16, 0, 0).unwrap();
        let a = store.insert(event("A", t)).await.unwrap();
        let b = store.insert(event("B", t)).await.unwrap();
        assert_eq!(a.id, Some(1));
        assert_eq!(b.id, Some(2));
        assert_eq!(store.by_id(2).await.unwrap().unwrap().title, "B");
    }

    #[tokio::test]
    async fn test_exact_and_loose_lookup() {
        let store = InMemoryEventStore::new();
        let t = Utc.with_ymd_and_hms(2026, 11, 1, 16, 0, 0).unwrap();
        store.insert(event("Storytime", t)).await.unwrap();

        assert!(store.exists_exact("Storytime", t, "Central Library").await.unwrap());
        assert!(!store.exists_exact("Storytime", t + Duration::days(1), "Central Library").await.unwrap());
        assert!(store.find_by_title_location("Storytime", "Central Library").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_predicates() {
        let store = InMemoryEventStore::new();
        let t = Utc.with_ymd_and_hms(2026, 11, 1, 16, 0, 0).unwrap();
        store.insert(event("Past", t - Duration::days(10))).await.unwrap();
        store.insert(event("Ending", t - Duration::minutes(30))).await.unwrap();
        store.insert(event("Future", t + Duration::days(3))).await.unwrap();

        // "Ending" runs 15:30-16:30 so it has not ended at t
        assert_eq!(store.delete_end_before(t).await.unwrap(), 1);
        assert_eq!(store.delete_start_before(t).await.unwrap(), 1);
        let left: Vec<String> = store.all().await.unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(left, vec!["Future".to_string()]);
    }
}
