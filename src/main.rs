use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use family_events::apis::registered_sources;
use family_events::cache::{CachedEventStore, CachedValue, TtlCache};
use family_events::config::{Config, StorageBackend};
use family_events::infra::SourceClient;
use family_events::logging;
use family_events::observability;
use family_events::pipeline::Orchestrator;
use family_events::scheduler::Scheduler;
use family_events::server::{self, AppState};
use family_events::storage::{EventStore, InMemoryEventStore, SqliteEventStore, StoreGateway};

#[derive(Parser)]
#[command(name = "family_events")]
#[command(about = "Denver-area family event aggregator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the admin HTTP server
    Serve {
        /// Port override (defaults to [server].port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one ingestion cycle and exit
    Run,
    /// Run a retention pass and exit
    Cleanup {
        /// Delete events that have already ended
        #[arg(long, conflicts_with = "old")]
        expired: bool,
        /// Delete events older than the retention window
        #[arg(long)]
        old: bool,
    },
    /// Remove every stored event
    ClearDatabase,
    /// List the registered sources in run order
    Sources,
}

struct App {
    orchestrator: Arc<Orchestrator>,
    events: CachedEventStore,
}

fn open_store(config: &Config) -> Result<Arc<dyn EventStore>> {
    Ok(match config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryEventStore::new()),
        StorageBackend::Sqlite => {
            let store = SqliteEventStore::open(&config.storage.sqlite_path)
                .with_context(|| format!("opening {}", config.storage.sqlite_path.display()))?;
            Arc::new(store)
        }
    })
}

fn build_app(config: &Config) -> Result<App> {
    let store = open_store(config)?;
    let cache: Arc<TtlCache<CachedValue>> = Arc::new(TtlCache::new(
        Duration::from_secs(config.cache.default_ttl_secs),
        config.cache.max_items_warning,
    ));
    let gateway = Arc::new(StoreGateway::new(Arc::clone(&store)).with_hook(cache.clone()));

    let client = SourceClient::new(&config.http).context("building HTTP client")?;
    let orchestrator = Orchestrator::new(registered_sources(&client), gateway)
        .with_adapter_timeout(config.scheduler.adapter_timeout())
        .with_retention_days(config.scheduler.retention_days);

    Ok(App { orchestrator: Arc::new(orchestrator), events: CachedEventStore::new(store, cache) })
}

/// One-shot commands need a store that outlives the process.
fn require_persistent(config: &Config, command: &str) -> Result<()> {
    if !config.storage.is_persistent() {
        anyhow::bail!(
            "`{}` needs a persistent store; set [storage].backend = \"sqlite\" or FAMILY_EVENTS_DB",
            command
        );
    }
    Ok(())
}

async fn serve(app: App, config: &Config, port: Option<u16>) -> Result<()> {
    let scheduler = Arc::new(Scheduler::new(app.orchestrator, &config.scheduler)?);
    scheduler.start()?;
    info!("⏰ Scheduler started");

    let cache = Arc::clone(app.events.cache());
    let sweeper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            cache.sweep();
        }
    });

    let state = AppState { scheduler: Arc::clone(&scheduler), events: app.events };
    let result = server::start_server(state, port.unwrap_or(config.server.port)).await;

    sweeper.abort();
    scheduler.stop().await;
    info!("👋 Scheduler stopped");
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    logging::init_logging(&config.logging);
    observability::init()?;

    match cli.command {
        Commands::Serve { port } => {
            let app = build_app(&config)?;
            serve(app, &config, port).await?;
        }
        Commands::Run => {
            require_persistent(&config, "run")?;
            println!("🚀 Running ingestion cycle...");
            let app = build_app(&config)?;
            let result = app.orchestrator.run_manual().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                error!("Ingestion failed: {}", result.message);
                std::process::exit(1);
            }
        }
        Commands::Cleanup { expired, old } => {
            require_persistent(&config, "cleanup")?;
            let app = build_app(&config)?;
            let now = chrono::Utc::now();
            if old {
                let n = app.orchestrator.run_weekly_cleanup(now).await?;
                println!("🗑️ Deleted {} old events", n);
            }
            if expired || !old {
                let n = app.orchestrator.run_daily_cleanup(now).await?;
                println!("🗑️ Deleted {} expired events", n);
            }
        }
        Commands::ClearDatabase => {
            require_persistent(&config, "clear-database")?;
            let app = build_app(&config)?;
            if app.orchestrator.clear_database().await {
                println!("✅ Database cleared");
            } else {
                anyhow::bail!("failed to clear database");
            }
        }
        Commands::Sources => {
            let client = SourceClient::new(&config.http)?;
            for source in registered_sources(&client) {
                println!("{}", source.name());
            }
        }
    }
    Ok(())
}
