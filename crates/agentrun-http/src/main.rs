//! Thin HTTP adapter: `POST /v1/run/` → `AgentRun::execute`. Owns only
//! process-level concerns (config loading, tracing, the listener, graceful
//! shutdown) — the pipeline itself lives entirely in `agentrun-core`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agentrun_core::adapter::live::BollardAdapter;
use agentrun_core::{AgentRun, ContainerAdapter, RunnerConfig};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use serde_json::json;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    agent: Arc<AgentRun>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = RunnerConfig::load().context("failed to load RunnerConfig")?;
    info!(container = %config.container_name, "starting AgentRun HTTP adapter");

    let adapter: Arc<dyn ContainerAdapter> = Arc::new(
        BollardAdapter::new(&config.container_name).context("failed to connect to container runtime")?,
    );

    let agent = AgentRun::new(config, adapter)
        .await
        .context("failed to construct AgentRun")?;

    let state = AppState { agent: Arc::new(agent) };

    let request_timeout = Duration::from_secs(
        std::env::var("AGENTRUN_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60),
    );

    let app = Router::new()
        .route("/v1/run/", post(run_handler))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .with_state(state);

    let addr: SocketAddr = std::env::var("AGENTRUN_BIND_ADDRESS")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid AGENTRUN_BIND_ADDRESS")?;

    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind listener")?;
    info!(%addr, "AgentRun HTTP adapter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("AgentRun HTTP adapter shut down gracefully");
    Ok(())
}

/// `POST /v1/run/` — `{"code": "<source>"}` → `{"output": "<outcome>"}`.
/// A body missing `code`, or with a non-string `code`, is the only
/// malformed-request case this handler itself reports as 400; syntactically
/// invalid JSON is rejected earlier by axum's `Json` extractor. A dead
/// container surfaces as 503 rather than a 200 with the error folded into
/// `output` (spec.md §7).
async fn run_handler(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    let code = match body.get("code").and_then(|v| v.as_str()) {
        Some(code) => code,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "request body must be a JSON object with a string \"code\" field" })),
            )
                .into_response();
        }
    };

    match state.agent.execute(code).await {
        Ok(output) => (StatusCode::OK, Json(json!({ "output": output }))).into_response(),
        Err(e) => {
            warn!(error = %e, "container unreachable while executing snippet");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": format!("container unreachable: {e}") })),
            )
                .into_response()
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,agentrun=debug"));
    fmt().with_env_filter(filter).with_target(true).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => warn!("received SIGTERM, initiating graceful shutdown"),
    }
}
