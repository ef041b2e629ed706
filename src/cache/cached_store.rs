use super::{CacheClass, CachedValue, TtlCache};
use crate::domain::Event;
use crate::error::Result;
use crate::storage::{EventFilter, EventStore};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Aggregate counts over the stored events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventsSummary {
    pub total_events: usize,
    pub upcoming_events: usize,
    pub by_age_group: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub by_city: BTreeMap<String, usize>,
    pub by_price_type: BTreeMap<String, usize>,
}

impl EventsSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let now = Utc::now();
        let mut summary = EventsSummary { total_events: events.len(), ..Default::default() };
        for e in events {
            if e.date_start >= now {
                summary.upcoming_events += 1;
            }
            *summary.by_age_group.entry(e.age_group.to_string()).or_default() += 1;
            *summary.by_city.entry(e.city.clone()).or_default() += 1;
            *summary.by_price_type.entry(e.price_type.to_string()).or_default() += 1;
            for c in &e.categories {
                *summary.by_category.entry(c.clone()).or_default() += 1;
            }
        }
        summary
    }
}

/// Read-through cache over an [`EventStore`].
///
/// Every key lives under an event-derived class, so the orchestrator's
/// invalidation after each write covers all of them. A load that overlaps
/// an invalidation is returned but not cached.
#[derive(Clone)]
pub struct CachedEventStore {
    store: Arc<dyn EventStore>,
    cache: Arc<TtlCache<CachedValue>>,
}

impl CachedEventStore {
    pub fn new(store: Arc<dyn EventStore>, cache: Arc<TtlCache<CachedValue>>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        &self.cache
    }

    pub async fn all_events(&self) -> Result<Vec<Event>> {
        let key = CacheClass::Events.key("all");
        if let Some(CachedValue::Events(events)) = self.cache.get(&key) {
            return Ok(events);
        }
        debug!("Fetching all events from store (cache miss)");
        let generation = self.cache.generation();
        let events = self.store.all().await?;
        self.cache.set_in_if_generation(CacheClass::Events, "all", CachedValue::Events(events.clone()), generation);
        Ok(events)
    }

    pub async fn event_by_id(&self, id: i64) -> Result<Option<Event>> {
        let suffix = format!("id:{}", id);
        if let Some(CachedValue::Event(event)) = self.cache.get(&CacheClass::Events.key(&suffix)) {
            return Ok(event);
        }
        let generation = self.cache.generation();
        let event = self.store.by_id(id).await?;
        self.cache.set_in_if_generation(CacheClass::Events, &suffix, CachedValue::Event(event.clone()), generation);
        Ok(event)
    }

    pub async fn events_by_filters(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        if filter.is_empty() {
            return self.all_events().await;
        }
        let suffix = format!("filter:{}", filter.cache_key());
        if let Some(CachedValue::Events(events)) = self.cache.get(&CacheClass::Events.key(&suffix)) {
            return Ok(events);
        }
        let generation = self.cache.generation();
        let events = self.store.by_filter(filter).await?;
        self.cache.set_in_if_generation(CacheClass::Events, &suffix, CachedValue::Events(events.clone()), generation);
        Ok(events)
    }

    pub async fn events_summary(&self) -> Result<EventsSummary> {
        if let Some(CachedValue::Summary(summary)) = self.cache.get(&CacheClass::Stats.key("summary")) {
            return Ok(summary);
        }
        let generation = self.cache.generation();
        let summary = EventsSummary::from_events(&self.all_events().await?);
        self.cache.set_in_if_generation(CacheClass::Stats, "summary", CachedValue::Summary(summary.clone()), generation);
        Ok(summary)
    }
}
