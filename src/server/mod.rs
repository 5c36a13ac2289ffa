//! HTTP adapter: Axum router over the interaction gateway.
//!
//! A thin JSON surface for clients that are not a chat bot (and for poking
//! at the service by hand). CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::{ApiError, AppState};

/// Bind `port` and serve in the background until `shutdown` flips to
/// `true` or its sender is dropped.
pub async fn spawn_server(
    state: AppState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<Result<()>>> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP port {port}"))?;
    info!(port, "HTTP server listening on http://localhost:{port}");

    let app = build_router(state);
    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await
            .context("HTTP server error")?;
        info!("HTTP server stopped");
        Ok(())
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/rules", get(routes::get_rules))
        .route("/api/bets", post(routes::create_bet))
        .route("/api/users/:user_id/parlays", get(routes::list_parlays))
        .route("/api/users/:user_id/summary", get(routes::get_summary))
        .route("/api/parlays/:id/legs", get(routes::get_open_legs))
        .route("/api/parlays/:id/legs/:index", post(routes::mark_leg))
        .route("/api/parlays/:id/pick", post(routes::pick_leg))
        .route("/api/parlays/:id/apply", post(routes::apply_outcome))
        .route("/api/parlays/:id/resolve", post(routes::resolve_now))
        .route("/api/parlays/:id/display", post(routes::attach_display))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
