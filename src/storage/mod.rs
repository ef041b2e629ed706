//! Record store interface and its backends.

pub mod gateway;
pub mod in_memory;
pub mod sqlite;

use crate::domain::{AgeGroup, Event};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use gateway::{InvalidationHook, SaveOutcome, StoreGateway};
pub use in_memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

/// Read filter; every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct EventFilter {
    pub city: Option<String>,
    pub age_group: Option<AgeGroup>,
    /// Matches when the event's category list contains this tag
    pub category: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(city) = &self.city {
            if !event.city.eq_ignore_ascii_case(city.trim()) {
                return false;
            }
        }
        if let Some(age) = self.age_group {
            if event.age_group != age {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !event.categories.iter().any(|c| c.eq_ignore_ascii_case(category.trim())) {
                return false;
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.age_group.is_none() && self.category.is_none()
    }

    /// Stable cache-key fragment
    pub fn cache_key(&self) -> String {
        format!(
            "city={}|age={}|category={}",
            self.city.as_deref().unwrap_or("").to_lowercase(),
            self.age_group.map(|a| a.as_str()).unwrap_or(""),
            self.category.as_deref().unwrap_or("").to_lowercase()
        )
    }
}

/// Storage trait for persisted events. Only the store assigns ids.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists `event` and returns it with its new id.
    async fn insert(&self, event: Event) -> Result<Event>;

    /// Every stored event ordered by start time.
    async fn all(&self) -> Result<Vec<Event>>;

    async fn by_filter(&self, filter: &EventFilter) -> Result<Vec<Event>>;

    async fn by_id(&self, id: i64) -> Result<Option<Event>>;

    /// Exact dedup-triple match.
    async fn exists_exact(&self, title: &str, date_start: DateTime<Utc>, location_name: &str) -> Result<bool>;

    /// Loose match ignoring the start time.
    async fn find_by_title_location(&self, title: &str, location_name: &str) -> Result<Option<Event>>;

    /// Removes events whose `date_start` is before `cutoff`.
    async fn delete_start_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Removes events whose `date_end` is before `cutoff`.
    async fn delete_end_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn clear(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize>;
}
