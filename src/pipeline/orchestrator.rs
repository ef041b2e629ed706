use super::stats::{CycleReport, ScrapingStats, StatsSnapshot};
use super::validator::Validator;
use crate::constants::NO_EVENTS_FOUND;
use crate::domain::Event;
use crate::error::Result;
use crate::observability::metrics;
use crate::storage::StoreGateway;
use crate::types::{EventSource, ScrapeOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

pub const ALREADY_RUNNING: &str = "Scraping already in progress";

#[derive(Debug, Clone)]
pub enum CycleResult {
    Completed(CycleReport),
    /// Another cycle held the run guard
    AlreadyRunning,
}

/// Answer to an on-demand run; produced even when the cycle failed.
#[derive(Debug, Clone, Serialize)]
pub struct ManualRunResult {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub statistics: StatsSnapshot,
}

/// Owns the registered sources and runs ingestion and retention against the store.
pub struct Orchestrator {
    sources: Vec<Arc<dyn EventSource>>,
    validator: Validator,
    gateway: Arc<StoreGateway>,
    stats: Mutex<ScrapingStats>,
    run_guard: tokio::sync::Mutex<()>,
    adapter_timeout: Duration,
    retention: chrono::Duration,
}

impl Orchestrator {
    pub fn new(sources: Vec<Arc<dyn EventSource>>, gateway: Arc<StoreGateway>) -> Self {
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        info!("🗓️ Orchestrator initialized with {} sources: {}", names.len(), names.join(", "));
        Self {
            sources,
            validator: Validator,
            gateway,
            stats: Mutex::new(ScrapingStats::default()),
            run_guard: tokio::sync::Mutex::new(()),
            adapter_timeout: Duration::from_secs(300),
            retention: chrono::Duration::days(7),
        }
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention = chrono::Duration::days(days);
        self
    }

    pub fn gateway(&self) -> &Arc<StoreGateway> {
        &self.gateway
    }

    pub fn sources_available(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    fn stats_lock(&self) -> MutexGuard<'_, ScrapingStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats_lock().snapshot()
    }

    /// One adapter call on its own task, bounded by the adapter budget.
    ///
    /// A panic inside the adapter surfaces as a join error; on timeout the
    /// task is aborted.
    async fn invoke(&self, source: &Arc<dyn EventSource>) -> std::result::Result<ScrapeOutcome, String> {
        let name = source.name();
        let task_source = Arc::clone(source);
        let mut handle = tokio::spawn(async move { task_source.scrape().await });
        match tokio::time::timeout(self.adapter_timeout, &mut handle).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(join_err)) => Err(format!("{} crashed: {}", name, join_err)),
            Err(_) => {
                handle.abort();
                Err(format!("{} timed out after {}s", name, self.adapter_timeout.as_secs()))
            }
        }
    }

    /// Scrape every source in order, validate, dedup-save, update statistics.
    ///
    /// Overlapping calls are rejected rather than queued.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleResult {
        let Ok(_guard) = self.run_guard.try_lock() else {
            warn!("{}; request rejected", ALREADY_RUNNING);
            return CycleResult::AlreadyRunning;
        };
        info!("🚀 Starting ingestion cycle...");
        let mut report = CycleReport::new(Utc::now());
        let mut valid_events: Vec<Event> = Vec::new();

        for source in &self.sources {
            let name = source.name();
            info!("🕷️ Scraping {}...", name);
            let t_source = Instant::now();
            match self.invoke(source).await {
                Ok(outcome) => {
                    report.record_outcome(name, outcome.kind());
                    match &outcome {
                        ScrapeOutcome::Degraded { reason, .. } => warn!("⚠️ {} degraded: {}", name, reason),
                        ScrapeOutcome::Empty { reason } => warn!("⚠️ {} returned nothing: {}", name, reason),
                        ScrapeOutcome::Ok(_) => {}
                    }
                    let events = outcome.into_events();
                    report.scraped += events.len();
                    metrics::sources::events_returned(name, events.len());
                    let before = report.valid;
                    for event in events {
                        match self.validator.rejection_reason(&event) {
                            None => {
                                report.record_valid(name, &event);
                                valid_events.push(event);
                            }
                            Some(reason) => {
                                warn!("⚠️ Skipping invalid event '{}' from {}: {}", event.title, name, reason.as_str());
                                metrics::store::rejected(reason.as_str());
                                report.record_rejection(reason);
                            }
                        }
                    }
                    info!("✅ Scraped {} valid events from {}", report.valid - before, name);
                }
                Err(reason) => {
                    error!("❌ Error scraping {}: {}", name, reason);
                    metrics::sources::failure(name);
                    report.record_source_failure(name, reason);
                }
            }
            metrics::sources::duration(name, t_source.elapsed().as_secs_f64());
        }

        info!("📊 Total valid events from all sources: {}", valid_events.len());
        if valid_events.is_empty() {
            warn!("⚠️ {}", NO_EVENTS_FOUND);
            report.finish(false, Some(NO_EVENTS_FOUND.to_string()));
        } else {
            let attempted = valid_events.len();
            let outcome = self.gateway.save_many(valid_events).await;
            let all_failed = outcome.failed_count == attempted;
            let first_error = outcome.errors.first().cloned();
            report.apply_save(outcome);
            if all_failed {
                let reason = format!("Failed to save any events: {}", first_error.unwrap_or_default());
                error!("❌ {}", reason);
                report.finish(false, Some(reason));
            } else {
                if report.saved == 0 {
                    info!("ℹ️ No new events to save (all events already exist)");
                }
                report.finish(true, None);
            }
        }

        self.stats_lock().record(&report);
        metrics::ingest::run_finished(report.success);
        info!(
            "Ingestion cycle finished: success={} saved={} skipped={} rejected={}",
            report.success, report.saved, report.skipped, report.rejected
        );
        CycleResult::Completed(report)
    }

    /// Same path as the timer, answered synchronously.
    pub async fn run_manual(&self) -> ManualRunResult {
        info!("🔧 Running manual scraping...");
        let (success, message) = match self.run_cycle().await {
            CycleResult::Completed(report) if report.success => {
                (true, "Manual scraping completed successfully".to_string())
            }
            CycleResult::Completed(report) => (
                false,
                format!("Manual scraping failed: {}", report.error.unwrap_or_else(|| "unknown error".into())),
            ),
            CycleResult::AlreadyRunning => (false, ALREADY_RUNNING.to_string()),
        };
        ManualRunResult { success, message, timestamp: Utc::now(), statistics: self.stats_snapshot() }
    }

    /// Removes events that ended before `as_of`.
    pub async fn run_daily_cleanup(&self, as_of: DateTime<Utc>) -> Result<usize> {
        info!("🧹 Starting daily cleanup process...");
        self.gateway.delete_expired(as_of).await
    }

    /// Removes events that started more than the retention window before `now`.
    pub async fn run_weekly_cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        info!("🧹 Starting weekly cleanup process...");
        self.gateway.delete_before(now - self.retention).await
    }

    pub async fn clear_database(&self) -> bool {
        self.gateway.clear_all().await
    }
}
