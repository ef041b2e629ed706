pub mod apis;
pub mod cache;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod types;
