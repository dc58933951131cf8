//! HTTP surface for envios.
//!
//! Routes mirror the back-office REST API under `/api`. Callers are
//! authenticated upstream; the gateway forwards the resolved user as
//! `x-user-id`, `x-user-name` and `x-user-role` headers. Operations that
//! act on behalf of a user reject requests without them (401).
//!
//! Tracking, the catalog and the policy table are public.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use envios_core::LifecycleManager;
use tokio::net::TcpListener;

mod error;
mod handlers;
mod identity;
mod logging;

pub use error::{ApiError, ErrorBody};
pub use handlers::{BANNER, ListQuery, StatusUpdate};
pub use identity::{Identity, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLE_HEADER};

/// Upload body headroom over the evidence size limit, so oversized images
/// reach validation instead of failing at the transport.
const UPLOAD_LIMIT_FACTOR: usize = 2;

/// Body limit for the JSON endpoints.
pub const JSON_BODY_LIMIT: usize = 256 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
}

pub fn router(manager: Arc<LifecycleManager>) -> Router {
    let upload_limit = manager.policy().max_evidence_bytes.saturating_mul(UPLOAD_LIMIT_FACTOR);
    let state = AppState { manager };
    Router::new()
        .route("/api/", get(handlers::banner))
        .route("/api/departamentos", get(handlers::departments))
        .route("/api/motivos", get(handlers::reasons))
        .route("/api/envios", post(handlers::create).get(handlers::list))
        .route("/api/envios/count", get(handlers::count))
        .route("/api/envios/{id}", get(handlers::get_one).delete(handlers::delete_one))
        .route("/api/envios/{id}/estado", patch(handlers::transition))
        .route(
            "/api/envios/{id}/upload-image",
            post(handlers::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/tracking/{ticket}", get(handlers::tracking))
        .route("/api/messages", get(handlers::messages))
        .route("/api/policy", get(handlers::policy))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(axum::middleware::from_fn(logging::logging_middleware))
        .with_state(state)
}

/// Serve on `addr` until Ctrl-C.
pub async fn serve(manager: Arc<LifecycleManager>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve_on(listener, manager, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves, then wait
/// for outstanding notifications.
pub async fn serve_on(
    listener: TcpListener,
    manager: Arc<LifecycleManager>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    tracing::info!(%addr, "envios api listening");
    axum::serve(listener, router(manager.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server terminated unexpectedly")?;
    tracing::info!("draining notifications");
    manager.drain_notifications().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
