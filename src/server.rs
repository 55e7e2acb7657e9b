//! HTTP host - health, snapshot and notification ingestion routes

use crate::activity::ActivityTracker;
use crate::config::{ActivityConfig, ServerConfig};
use crate::notification::{HookContext, NotificationAdapter, NotificationKind};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SNAPSHOT_PATH: &str = "/api/lobster-room";
pub const EVENTS_PATH: &str = "/api/lobster-room/events";

/// Shared state behind every route
#[derive(Clone)]
pub struct AppState {
    tracker: ActivityTracker,
    adapter: Arc<NotificationAdapter>,
}

impl AppState {
    pub fn new(tracker: ActivityTracker, adapter: NotificationAdapter) -> Self {
        Self {
            tracker,
            adapter: Arc::new(adapter),
        }
    }

    /// Tracker plus an adapter that feeds it
    pub fn from_config(config: &ActivityConfig) -> Self {
        Self::from_tracker(ActivityTracker::new(config), config)
    }

    pub fn from_tracker(tracker: ActivityTracker, config: &ActivityConfig) -> Self {
        let adapter = NotificationAdapter::for_engine(tracker.engine().clone(), config.default_agent_id.clone());
        Self::new(tracker, adapter)
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }
}

/// Body of a notification pushed over HTTP
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub kind: String,
    #[serde(default)]
    pub event: Value,
    #[serde(default)]
    pub context: HookContext,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/healthz/", get(healthz))
        .route(SNAPSHOT_PATH, get(snapshot))
        .route(EVENTS_PATH, post(ingest))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        "ok",
    )
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Json(state.tracker.snapshot_response()),
    )
}

/// Producers always get 202 for a well-formed body; handler failures are
/// reported in the body, not as transport errors.
async fn ingest(State(state): State<AppState>, Json(request): Json<IngestRequest>) -> impl IntoResponse {
    let kind = match request.kind.parse::<NotificationKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(kind = %request.kind, "Ignoring unknown notification kind");
            return (StatusCode::ACCEPTED, Json(json!({ "ok": false, "errors": [e.to_string()] })));
        }
    };

    let report = state.adapter.dispatch(kind, &request.event, &request.context);
    debug!(kind = %kind, handled = report.handled, failed = report.failed, "Notification ingested");
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "ok": report.is_ok(),
            "handled": report.handled,
            "errors": report.errors,
        })),
    )
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ActivityConfig, server: ServerConfig) -> Result<()> {
    let app = router(AppState::from_config(&config));
    let addr = format!("{}:{}", server.bind, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        addr = %addr,
        agents = ?config.allowed_agents(),
        cooldown_ms = config.timings.cooldown_ms,
        stale_ms = config.timings.stale_ms,
        tool_max_ms = config.timings.tool_max_ms,
        "Serving on http://{}/",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
