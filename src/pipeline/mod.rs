// Ingestion pipeline: validation, orchestration and run statistics

pub mod orchestrator;
pub mod stats;
pub mod validator;

pub use orchestrator::{CycleResult, ManualRunResult, Orchestrator};
pub use stats::{CycleReport, ScrapingStats, StatsSnapshot};
pub use validator::{RejectionReason, Validator};
