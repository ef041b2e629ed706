use crate::cache::{CacheClass, CachedEventStore, CachedValue, TtlCache};
use crate::observability;
use crate::scheduler::Scheduler;
use crate::storage::EventFilter;
use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared handles every route reads from.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub events: CachedEventStore,
}

impl AppState {
    fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        self.events.cache()
    }
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    error!("❌ Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "detail": e.to_string() }))).into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "family-events",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_events(Extension(state): Extension<AppState>, Query(filter): Query<EventFilter>) -> Response {
    match state.events.events_by_filters(&filter).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn events_stats(Extension(state): Extension<AppState>) -> Response {
    match state.events.events_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn event_by_id(Extension(state): Extension<AppState>, Path(id): Path<i64>) -> Response {
    match state.events.event_by_id(id).await {
        Ok(Some(event)) => Json(event).into_response(),
        Ok(None) => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "detail": "Event not found" }))).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn scheduler_status(Extension(state): Extension<AppState>) -> Response {
    let key = CacheClass::Scheduler.key("status");
    if let Some(CachedValue::Json(status)) = state.cache().get(&key) {
        return Json(status).into_response();
    }
    match serde_json::to_value(state.scheduler.get_scheduler_status()) {
        Ok(status) => {
            state.cache().set_in(CacheClass::Scheduler, "status", CachedValue::Json(status.clone()));
            Json(status).into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn next_run(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let next: BTreeMap<String, Option<String>> = state
        .scheduler
        .get_next_run_time()
        .into_iter()
        .map(|(job, at)| (job, at.map(|t| t.to_rfc3339())))
        .collect();
    Json(next)
}

async fn scraping_stats(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.scheduler.get_scraping_stats())
}

/// Always 200; the body carries the success flag.
async fn run_manual(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let result = state.scheduler.run_manual_scraping().await;
    state.cache().invalidate_prefixes(&[CacheClass::Scheduler.prefix()]);
    Json(result)
}

async fn cache_stats(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.cache().health())
}

async fn cache_clear(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let cleared = state.cache().clear();
    Json(serde_json::json!({ "success": true, "cleared_items": cleared }))
}

async fn database_clear(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let success = state.scheduler.orchestrator().clear_database().await;
    state.cache().clear();
    let message = if success { "Database cleared successfully" } else { "Failed to clear database" };
    Json(serde_json::json!({ "success": success, "message": message }))
}

async fn metrics_text() -> Response {
    match observability::render() {
        Some(body) => body.into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Builds the admin router over the shared state.
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/events/stats", get(events_stats))
        .route("/api/v1/events/:id", get(event_by_id))
        .route("/api/v1/scheduler/status", get(scheduler_status))
        .route("/api/v1/scheduler/next-run", get(next_run))
        .route("/api/v1/scheduler/stats", get(scraping_stats))
        .route("/api/v1/scheduler/run-manual", post(run_manual))
        .route("/api/v1/cache/stats", get(cache_stats))
        .route("/api/v1/cache/clear", post(cache_clear))
        .route("/api/v1/database/clear", post(database_clear))
        .route("/metrics", get(metrics_text))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serves until the process receives Ctrl-C.
pub async fn start_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("🚀 HTTP server running on http://localhost:{}", port);
    info!("💚 Health check: http://localhost:{}/health", port);

    Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::pipeline::Orchestrator;
    use crate::storage::{InMemoryEventStore, StoreGateway};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300), 1000));
        let gateway = Arc::new(StoreGateway::new(store.clone()).with_hook(cache.clone()));
        let orchestrator = Arc::new(Orchestrator::new(Vec::new(), gateway));
        let scheduler = Arc::new(Scheduler::new(orchestrator, &SchedulerConfig::default()).unwrap());
        AppState { scheduler, events: CachedEventStore::new(store, cache) }
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_health_and_empty_listing() {
        let app = create_server(state());
        let (status, body) = call(app.clone(), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = call(app.clone(), "GET", "/api/v1/events?city=Denver").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (status, _) = call(app, "GET", "/api/v1/events/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_manual_run_still_answers_ok() {
        let app = create_server(state());
        let (status, body) = call(app.clone(), "POST", "/api/v1/scheduler/run-manual").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["statistics"]["failed_runs"], 1);

        let (_, stats) = call(app, "GET", "/api/v1/scheduler/stats").await;
        assert_eq!(stats["last_error"], "No events found from any source");
    }

    #[tokio::test]
    async fn test_scheduler_endpoints() {
        let app = create_server(state());
        let (status, body) = call(app.clone(), "GET", "/api/v1/scheduler/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["running"], false);
        assert_eq!(body["jobs"].as_array().map(Vec::len), Some(3));

        let (_, next) = call(app, "GET", "/api/v1/scheduler/next-run").await;
        assert!(next["daily_scraping"].is_null());
    }

    #[tokio::test]
    async fn test_database_clear_also_clears_cache() {
        let s = state();
        s.cache().set("events:all", CachedValue::Events(Vec::new()), None);
        let app = create_server(s.clone());
        let (status, body) = call(app.clone(), "POST", "/api/v1/database/clear").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, health) = call(app, "GET", "/api/v1/cache/stats").await;
        assert_eq!(health["statistics"]["total_items"], 0);
        assert_eq!(health["cache_type"], "memory");
    }
}
