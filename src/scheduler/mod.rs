//! Recurring ingestion and retention jobs on one timezone-anchored calendar.

pub mod cron;
pub mod jobs;

use crate::config::SchedulerConfig;
use crate::constants::{
    DAILY_CLEANUP_JOB, DAILY_CLEANUP_NAME, DAILY_SCRAPING_JOB, DAILY_SCRAPING_NAME, WEEKLY_CLEANUP_JOB,
    WEEKLY_CLEANUP_NAME,
};
use crate::error::Result;
use crate::pipeline::{CycleResult, ManualRunResult, Orchestrator, StatsSnapshot};
use chrono::{DateTime, Utc};
use self::cron::CronSchedule;
use self::jobs::{Job, JobAction, JobFuture, JobInfo, JobTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobInfo>,
    pub statistics: StatsSnapshot,
    pub scrapers_available: Vec<String>,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    table: JobTable,
}

impl Scheduler {
    /// Builds the three standard jobs; nothing runs until [`Scheduler::start`].
    pub fn new(orchestrator: Arc<Orchestrator>, config: &SchedulerConfig) -> Result<Self> {
        let mut table = JobTable::new(config.tz()?, config.shutdown_timeout());

        let o = Arc::clone(&orchestrator);
        let scraping: JobAction = Arc::new(move || {
            let o = Arc::clone(&o);
            Box::pin(async move {
                if let CycleResult::AlreadyRunning = o.run_cycle().await {
                    info!("Scheduled scraping skipped; a cycle is already running");
                }
            }) as JobFuture
        });

        let o = Arc::clone(&orchestrator);
        let daily_cleanup: JobAction = Arc::new(move || {
            let o = Arc::clone(&o);
            Box::pin(async move {
                match o.run_daily_cleanup(Utc::now()).await {
                    Ok(n) => info!("🗑️ Deleted {} expired events from database", n),
                    Err(e) => error!("❌ Error in daily cleanup: {}", e),
                }
            }) as JobFuture
        });

        let o = Arc::clone(&orchestrator);
        let weekly_cleanup: JobAction = Arc::new(move || {
            let o = Arc::clone(&o);
            Box::pin(async move {
                match o.run_weekly_cleanup(Utc::now()).await {
                    Ok(n) => info!("🗑️ Deleted {} old events from database", n),
                    Err(e) => error!("❌ Error in weekly cleanup: {}", e),
                }
            }) as JobFuture
        });

        table.add_job(Job {
            id: DAILY_SCRAPING_JOB,
            name: DAILY_SCRAPING_NAME,
            schedule: CronSchedule::parse(&config.daily_scraping)?,
            action: scraping,
        });
        table.add_job(Job {
            id: DAILY_CLEANUP_JOB,
            name: DAILY_CLEANUP_NAME,
            schedule: CronSchedule::parse(&config.daily_cleanup)?,
            action: daily_cleanup,
        });
        table.add_job(Job {
            id: WEEKLY_CLEANUP_JOB,
            name: WEEKLY_CLEANUP_NAME,
            schedule: CronSchedule::parse(&config.weekly_cleanup)?,
            action: weekly_cleanup,
        });

        Ok(Self { orchestrator, table })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn start(&self) -> Result<()> {
        self.table.start()
    }

    pub async fn stop(&self) {
        self.table.stop().await
    }

    pub fn get_scheduler_status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.table.is_running(),
            jobs: self.table.jobs(),
            statistics: self.orchestrator.stats_snapshot(),
            scrapers_available: self.orchestrator.sources_available().into_iter().map(String::from).collect(),
        }
    }

    /// Job id to next fire instant; `None` while stopped.
    pub fn get_next_run_time(&self) -> BTreeMap<String, Option<DateTime<Utc>>> {
        [DAILY_SCRAPING_JOB, DAILY_CLEANUP_JOB, WEEKLY_CLEANUP_JOB]
            .into_iter()
            .map(|id| (id.to_string(), self.table.next_run_time(id)))
            .collect()
    }

    pub async fn run_manual_scraping(&self) -> ManualRunResult {
        self.orchestrator.run_manual().await
    }

    pub fn get_scraping_stats(&self) -> StatsSnapshot {
        self.orchestrator.stats_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryEventStore, StoreGateway};

    fn scheduler() -> Scheduler {
        let gateway = Arc::new(StoreGateway::new(Arc::new(InMemoryEventStore::new())));
        let orchestrator = Arc::new(Orchestrator::new(Vec::new(), gateway));
        Scheduler::new(orchestrator, &SchedulerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_next_run_times_follow_lifecycle() {
        let s = scheduler();
        assert!(s.get_next_run_time().values().all(Option::is_none));

        s.start().unwrap();
        let next = s.get_next_run_time();
        assert_eq!(next.len(), 3);
        let cleanup = next["daily_cleanup"].unwrap();
        let scraping = next["daily_scraping"].unwrap();
        assert!(cleanup > Utc::now() && scraping > Utc::now());

        let status = s.get_scheduler_status();
        assert!(status.running);
        assert_eq!(status.jobs.len(), 3);
        assert_eq!(status.jobs[0].name, "Daily Event Scraping");

        s.stop().await;
        assert!(!s.get_scheduler_status().running);
    }

    #[tokio::test]
    async fn test_manual_run_with_no_sources_is_failed_run() {
        let s = scheduler();
        let result = s.run_manual_scraping().await;
        assert!(!result.success);
        assert!(result.message.contains("No events found from any source"));
        assert_eq!(s.get_scraping_stats().failed_runs, 1);
    }
}
