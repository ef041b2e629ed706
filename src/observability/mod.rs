// Observability: Prometheus metrics for the pipeline and cache

pub mod metrics;

pub use metrics::{init, render};
