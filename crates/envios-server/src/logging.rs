use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::identity::USER_ID_HEADER;

/// One log line per request; level follows the response class.
pub async fn logging_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let user = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::error!(target: "http", %method, %path, %user, status, duration_ms, "request failed");
    } else if response.status().is_client_error() {
        tracing::warn!(target: "http", %method, %path, %user, status, duration_ms, "request rejected");
    } else {
        tracing::info!(target: "http", %method, %path, %user, status, duration_ms, "request");
    }
    response
}
