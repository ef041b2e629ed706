//! Canonical event schema shared by every source adapter, the store and the cache.

use crate::error::{Result, ScraperError};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Baby,
    Toddler,
    Kid,
    Youth,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Baby => "baby",
            AgeGroup::Toddler => "toddler",
            AgeGroup::Kid => "kid",
            AgeGroup::Youth => "youth",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeGroup {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baby" => Ok(AgeGroup::Baby),
            "toddler" => Ok(AgeGroup::Toddler),
            "kid" => Ok(AgeGroup::Kid),
            "youth" => Ok(AgeGroup::Youth),
            other => Err(ScraperError::Schema(format!("unknown age group '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    Free,
    Paid,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Free => "free",
            PriceType::Paid => "paid",
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceType {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PriceType::Free),
            "paid" => Ok(PriceType::Paid),
            other => Err(ScraperError::Schema(format!("unknown price type '{}'", other))),
        }
    }
}

/// One family-event listing in canonical form.
///
/// `image_url` is optional here; the pipeline's validator is what makes it
/// mandatory for anything that reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub location_name: String,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub age_group: AgeGroup,
    pub categories: Vec<String>,
    pub price_type: PriceType,
    pub source_url: String,
    pub image_url: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

/// Everything an adapter knows about a listing before it becomes an [`Event`].
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub location_name: String,
    pub address: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub age_group: AgeGroup,
    pub categories: Vec<String>,
    pub price_type: PriceType,
    pub source_url: String,
    pub image_url: Option<String>,
}

impl EventDraft {
    /// Checks the schema and stamps `last_updated_at`.
    ///
    /// Instants are truncated to whole seconds so exact dedup matching does
    /// not depend on how a backend stores sub-second precision.
    pub fn into_event(self) -> Result<Event> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ScraperError::Schema("title must not be empty".into()));
        }
        let date_start = self.date_start.trunc_subsecs(0);
        let date_end = self.date_end.trunc_subsecs(0);
        if date_end < date_start {
            return Err(ScraperError::Schema(format!(
                "date_end {} precedes date_start {} for '{}'",
                date_end, date_start, title
            )));
        }
        for (field, value) in [
            ("location_name", &self.location_name),
            ("address", &self.address),
            ("city", &self.city),
            ("source_url", &self.source_url),
        ] {
            if value.trim().is_empty() {
                return Err(ScraperError::Schema(format!("{} must not be empty for '{}'", field, title)));
            }
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ScraperError::Schema(format!(
                "coordinates ({}, {}) out of range for '{}'",
                self.latitude, self.longitude, title
            )));
        }
        let categories: Vec<String> = self
            .categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if categories.is_empty() {
            return Err(ScraperError::Schema(format!("categories must not be empty for '{}'", title)));
        }
        let image_url = self.image_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());

        Ok(Event {
            id: None,
            title,
            description: self.description.trim().to_string(),
            date_start,
            date_end,
            location_name: self.location_name.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            age_group: self.age_group,
            categories,
            price_type: self.price_type,
            source_url: self.source_url.trim().to_string(),
            image_url,
            last_updated_at: Utc::now().trunc_subsecs(0),
        })
    }
}
