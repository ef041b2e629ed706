//! Prometheus metrics for the ingestion pipeline.
//!
//! Recording functions are grouped by phase; the names live in one enum so
//! nothing records under a misspelled metric.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::fmt;
use tracing::info;

use crate::error::{Result, ScraperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Cycle
    IngestRuns,

    // Sources
    SourceEvents,
    SourceFailures,
    SourceDuration,

    // Validation and persistence
    EventsRejected,
    EventsSaved,
    EventsSkipped,
    EventsDeleted,

    // Cache
    CacheHits,
    CacheMisses,
    CacheInvalidations,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestRuns => "fe_ingest_runs_total",
            MetricName::SourceEvents => "fe_source_events_total",
            MetricName::SourceFailures => "fe_source_failures_total",
            MetricName::SourceDuration => "fe_source_duration_seconds",
            MetricName::EventsRejected => "fe_events_rejected_total",
            MetricName::EventsSaved => "fe_events_saved_total",
            MetricName::EventsSkipped => "fe_events_skipped_total",
            MetricName::EventsDeleted => "fe_events_deleted_total",
            MetricName::CacheHits => "fe_cache_hits_total",
            MetricName::CacheMisses => "fe_cache_misses_total",
            MetricName::CacheInvalidations => "fe_cache_invalidations_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder once and returns the render handle.
pub fn init() -> Result<PrometheusHandle> {
    HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
                ScraperError::Config(format!("Failed to install Prometheus recorder: {}", e))
            })?;
            info!("Metrics system initialized");
            Ok(handle)
        })
        .cloned()
}

/// Text exposition of everything recorded so far, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub mod ingest {
    use super::MetricName;

    pub fn run_finished(success: bool) {
        let outcome = if success { "success" } else { "failure" };
        ::metrics::counter!(MetricName::IngestRuns.as_str(), "outcome" => outcome).increment(1);
    }
}

pub mod sources {
    use super::MetricName;

    pub fn events_returned(source: &str, count: usize) {
        ::metrics::counter!(MetricName::SourceEvents.as_str(), "source" => source.to_string())
            .increment(count as u64);
    }

    pub fn failure(source: &str) {
        ::metrics::counter!(MetricName::SourceFailures.as_str(), "source" => source.to_string()).increment(1);
    }

    pub fn duration(source: &str, secs: f64) {
        ::metrics::histogram!(MetricName::SourceDuration.as_str(), "source" => source.to_string()).record(secs);
    }
}

pub mod store {
    use super::MetricName;

    pub fn rejected(reason: &'static str) {
        ::metrics::counter!(MetricName::EventsRejected.as_str(), "reason" => reason).increment(1);
    }

    pub fn saved(count: usize) {
        ::metrics::counter!(MetricName::EventsSaved.as_str()).increment(count as u64);
    }

    pub fn skipped(count: usize) {
        ::metrics::counter!(MetricName::EventsSkipped.as_str()).increment(count as u64);
    }

    pub fn deleted(job: &'static str, count: usize) {
        ::metrics::counter!(MetricName::EventsDeleted.as_str(), "job" => job).increment(count as u64);
    }
}

pub mod cache {
    use super::MetricName;

    pub fn hit() {
        ::metrics::counter!(MetricName::CacheHits.as_str()).increment(1);
    }

    pub fn miss() {
        ::metrics::counter!(MetricName::CacheMisses.as_str()).increment(1);
    }

    pub fn invalidated(keys: usize) {
        ::metrics::counter!(MetricName::CacheInvalidations.as_str()).increment(keys as u64);
    }
}
