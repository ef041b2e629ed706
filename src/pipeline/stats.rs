//! Per-cycle reports and the running statistics they are merged into.

use super::validator::RejectionReason;
use crate::domain::Event;
use crate::storage::SaveOutcome;
use crate::types::OutcomeKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything one ingestion cycle observed.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub error: Option<String>,
    pub scraped: usize,
    pub valid: usize,
    pub rejected: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub events_by_source: BTreeMap<String, usize>,
    pub events_by_age_group: BTreeMap<String, usize>,
    pub events_by_category: BTreeMap<String, usize>,
    pub events_without_images: usize,
    pub degraded_sources: Vec<String>,
    pub failed_sources: Vec<String>,
    /// How each source that answered classified its yield
    pub source_outcomes: BTreeMap<String, OutcomeKind>,
    pub errors: Vec<String>,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            success: false,
            error: None,
            scraped: 0,
            valid: 0,
            rejected: 0,
            saved: 0,
            skipped: 0,
            failed: 0,
            events_by_source: BTreeMap::new(),
            events_by_age_group: BTreeMap::new(),
            events_by_category: BTreeMap::new(),
            events_without_images: 0,
            degraded_sources: Vec::new(),
            failed_sources: Vec::new(),
            source_outcomes: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn record_valid(&mut self, source: &str, event: &Event) {
        self.valid += 1;
        *self.events_by_source.entry(source.to_string()).or_default() += 1;
        *self.events_by_age_group.entry(event.age_group.to_string()).or_default() += 1;
        for category in &event.categories {
            *self.events_by_category.entry(category.clone()).or_default() += 1;
        }
    }

    pub fn record_outcome(&mut self, source: &str, kind: OutcomeKind) {
        if kind == OutcomeKind::Degraded {
            self.degraded_sources.push(source.to_string());
        }
        self.source_outcomes.insert(source.to_string(), kind);
    }

    pub fn record_rejection(&mut self, reason: RejectionReason) {
        self.rejected += 1;
        if reason == RejectionReason::MissingImage {
            self.events_without_images += 1;
        }
    }

    pub fn record_source_failure(&mut self, source: &str, reason: String) {
        self.failed_sources.push(source.to_string());
        self.errors.push(reason);
    }

    pub fn apply_save(&mut self, outcome: SaveOutcome) {
        self.saved = outcome.saved_count;
        self.skipped = outcome.skipped_count;
        self.failed = outcome.failed_count;
        self.errors.extend(outcome.errors);
    }

    pub fn finish(&mut self, success: bool, error: Option<String>) {
        self.success = success;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Counts from the most recent cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LastCycle {
    pub scraped: usize,
    pub valid: usize,
    pub rejected: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Running totals across all cycles since startup.
#[derive(Debug, Clone, Default)]
pub struct ScrapingStats {
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    total_events_scraped: u64,
    last_run_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
    events_by_source: BTreeMap<String, u64>,
    events_by_age_group: BTreeMap<String, u64>,
    events_by_category: BTreeMap<String, u64>,
    events_without_images: u64,
    degraded_runs_by_source: BTreeMap<String, u64>,
    failed_sources: Vec<String>,
    last_source_outcomes: BTreeMap<String, OutcomeKind>,
    last_cycle: Option<LastCycle>,
}

/// Serializable view returned by the read side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub total_events_scraped: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub events_by_source: BTreeMap<String, u64>,
    pub events_by_age_group: BTreeMap<String, u64>,
    pub events_by_category: BTreeMap<String, u64>,
    pub events_without_images: u64,
    pub degraded_runs_by_source: BTreeMap<String, u64>,
    pub failed_sources: Vec<String>,
    pub last_source_outcomes: BTreeMap<String, OutcomeKind>,
    pub last_cycle: Option<LastCycle>,
    pub success_rate: f64,
}

fn add_counts(into: &mut BTreeMap<String, u64>, from: &BTreeMap<String, usize>) {
    for (key, count) in from {
        *into.entry(key.clone()).or_default() += *count as u64;
    }
}

impl ScrapingStats {
    /// Folds one finished cycle into the totals.
    ///
    /// Event breakdowns only grow on successful cycles; `last_error` is
    /// only ever replaced by a newer failure.
    pub fn record(&mut self, report: &CycleReport) {
        let at = report.finished_at.unwrap_or_else(Utc::now);
        self.total_runs += 1;
        self.last_run_time = Some(at);
        self.events_without_images += report.events_without_images as u64;
        for source in &report.degraded_sources {
            *self.degraded_runs_by_source.entry(source.clone()).or_default() += 1;
        }
        self.failed_sources = report.failed_sources.clone();
        self.last_source_outcomes = report.source_outcomes.clone();
        self.last_cycle = Some(LastCycle {
            scraped: report.scraped,
            valid: report.valid,
            rejected: report.rejected,
            saved: report.saved,
            skipped: report.skipped,
            failed: report.failed,
        });

        if report.success {
            self.successful_runs += 1;
            self.total_events_scraped += report.valid as u64;
            self.last_success_time = Some(at);
            add_counts(&mut self.events_by_source, &report.events_by_source);
            add_counts(&mut self.events_by_age_group, &report.events_by_age_group);
            add_counts(&mut self.events_by_category, &report.events_by_category);
        } else {
            self.failed_runs += 1;
            if let Some(error) = &report.error {
                self.last_error = Some(error.clone());
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let success_rate = if self.total_runs > 0 {
            self.successful_runs as f64 / self.total_runs as f64 * 100.0
        } else {
            0.0
        };
        StatsSnapshot {
            total_runs: self.total_runs,
            successful_runs: self.successful_runs,
            failed_runs: self.failed_runs,
            total_events_scraped: self.total_events_scraped,
            last_run_time: self.last_run_time,
            last_success_time: self.last_success_time,
            last_error: self.last_error.clone(),
            events_by_source: self.events_by_source.clone(),
            events_by_age_group: self.events_by_age_group.clone(),
            events_by_category: self.events_by_category.clone(),
            events_without_images: self.events_without_images,
            degraded_runs_by_source: self.degraded_runs_by_source.clone(),
            failed_sources: self.failed_sources.clone(),
            last_source_outcomes: self.last_source_outcomes.clone(),
            last_cycle: self.last_cycle.clone(),
            success_rate,
        }
    }
}
