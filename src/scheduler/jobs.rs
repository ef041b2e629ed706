//! In-process job table: one tokio task per named cron job.

use super::cron::CronSchedule;
use crate::error::{Result, ScraperError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type JobAction = Arc<dyn Fn() -> JobFuture + Send + Sync>;

pub struct Job {
    pub id: &'static str,
    pub name: &'static str,
    pub schedule: CronSchedule,
    pub action: JobAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub next_run_time: Option<DateTime<Utc>>,
    pub trigger: String,
}

type NextRuns = Arc<Mutex<HashMap<&'static str, DateTime<Utc>>>>;

#[derive(Default)]
struct Running {
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

/// `stopped -> started -> stopped`; a job that is mid-run when `stop` is
/// called gets up to the shutdown timeout to finish.
pub struct JobTable {
    tz: Tz,
    jobs: Vec<Job>,
    next_runs: NextRuns,
    running: Mutex<Running>,
    shutdown_timeout: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobTable {
    pub fn new(tz: Tz, shutdown_timeout: Duration) -> Self {
        Self {
            tz,
            jobs: Vec::new(),
            next_runs: Arc::new(Mutex::new(HashMap::new())),
            running: Mutex::new(Running::default()),
            shutdown_timeout,
        }
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.retain(|j| j.id != job.id);
        self.jobs.push(job);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).shutdown.is_some()
    }

    /// Spawns one timer task per job. Fails outside a tokio runtime or when
    /// already started.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ScraperError::Scheduler(format!("no async runtime to start jobs on: {}", e)))?;
        let mut running = lock(&self.running);
        if running.shutdown.is_some() {
            return Err(ScraperError::Scheduler("job table already started".into()));
        }
        let now = Utc::now();
        let mut firsts = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            let first = job.schedule.next_after(now, self.tz).ok_or_else(|| {
                ScraperError::Scheduler(format!("job '{}' has no upcoming fire time", job.id))
            })?;
            firsts.push(first);
        }

        let (tx, rx) = watch::channel(false);
        for (job, first) in self.jobs.iter().zip(firsts) {
            lock(&self.next_runs).insert(job.id, first);
            info!("⏰ Next run for '{}': {}", job.name, first.with_timezone(&self.tz));

            let handle = runtime.spawn(run_job_loop(
                job.id,
                job.name,
                job.schedule.clone(),
                self.tz,
                Arc::clone(&job.action),
                Arc::clone(&self.next_runs),
                rx.clone(),
            ));
            running.handles.push(handle);
        }
        running.shutdown = Some(tx);
        info!("✅ Scheduler started with {} jobs", self.jobs.len());
        Ok(())
    }

    /// Signals every job loop, then waits for in-flight runs up to the timeout.
    pub async fn stop(&self) {
        let (shutdown, mut handles) = {
            let mut running = lock(&self.running);
            (running.shutdown.take(), std::mem::take(&mut running.handles))
        };
        let Some(shutdown) = shutdown else {
            return;
        };
        let _ = shutdown.send(true);

        let wait_all = async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, wait_all).await.is_err() {
            warn!(
                "🛑 Jobs still running after {}s; forcing scheduler stop",
                self.shutdown_timeout.as_secs()
            );
            for handle in &handles {
                handle.abort();
            }
        }
        lock(&self.next_runs).clear();
        info!("🛑 Event scheduler stopped");
    }

    pub fn next_run_time(&self, id: &str) -> Option<DateTime<Utc>> {
        lock(&self.next_runs).get(id).copied()
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        let next_runs = lock(&self.next_runs);
        self.jobs
            .iter()
            .map(|job| JobInfo {
                id: job.id.to_string(),
                name: job.name.to_string(),
                next_run_time: next_runs.get(job.id).copied(),
                trigger: format!("{} {}", job.schedule, self.tz),
            })
            .collect()
    }
}

async fn run_job_loop(
    id: &'static str,
    name: &'static str,
    schedule: CronSchedule,
    tz: Tz,
    action: JobAction,
    next_runs: NextRuns,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(next) = schedule.next_after(Utc::now(), tz) else {
            error!("Job '{}' has no upcoming fire time; stopping it", id);
            break;
        };
        lock(&next_runs).insert(id, next);

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => break,
        }
        info!("⏰ Running job '{}'", name);
        // A run in progress is never cancelled by shutdown
        (action)().await;
    }
}
