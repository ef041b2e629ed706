use crate::config::LoggingConfig;
use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "ingest.log";

/// `RUST_LOG` when set, otherwise the configured directives.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Installs console and rotating JSON file output under `config.dir`.
///
/// A second call leaves the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let dir: &Path = &config.dir;
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("could not create log directory {}: {}", dir.display(), e);
    }

    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let installed = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .try_init()
        .is_ok();

    // Flushes on drop; the subscriber lives for the whole process.
    if installed {
        std::mem::forget(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_creates_configured_directory() {
        let dir = TempDir::new().unwrap();
        let config = LoggingConfig { dir: dir.path().join("nested").join("logs"), ..Default::default() };
        init_logging(&config);
        assert!(config.dir.is_dir());
    }

    #[test]
    fn test_configured_filter_applies_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig { filter: "family_events=debug".into(), ..Default::default() };
        assert_eq!(env_filter(&config).max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
