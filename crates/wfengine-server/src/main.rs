//! Workflow execution engine HTTP API.
//!
//! ## Endpoints
//!
//! - `GET/POST/PATCH/DELETE /api/workflows[/:id]` - workflow CRUD
//! - `POST /api/workflows/:id/execute` - start a manual run synchronously
//! - `GET /api/executions/:id` - run state
//! - `POST /api/webhooks/:webhookId` - webhook trigger
//! - `POST /api/events` - app-event fanout
//! - `POST /api/workflows/:id/chain` - workflow-chain trigger
//! - `GET/POST/DELETE /api/credentials[/:id]` - credential CRUD
//! - `GET /healthz` - health check

mod config;
mod error;
mod execution_sink;
mod handlers;
mod trigger_gateway;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wfengine=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let bind_addr = config.bind_addr();

    info!("starting workflow execution engine");
    info!(database = config.database_url.is_some(), "store backend selected");

    let state = AppState::new(config).await?;

    let app = Router::new()
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/:id", get(get_workflow).patch(update_workflow).delete(delete_workflow))
        .route("/api/workflows/:id/execute", post(execute_workflow))
        .route("/api/workflows/:id/chain", post(chain_trigger))
        .route("/api/executions/:id", get(get_execution))
        .route("/api/webhooks/:webhookId", post(webhook_trigger))
        .route("/api/events", post(event_trigger))
        .route("/api/credentials", get(list_credentials).post(create_credential))
        .route("/api/credentials/:id", delete(delete_credential))
        .route("/healthz", get(health_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {}", bind_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
