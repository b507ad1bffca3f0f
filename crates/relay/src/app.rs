use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info};

use crate::{
    api, cors,
    error::{
        attach_request_id_header, current_request_id, request_id_from_headers_or_generate,
        with_request_id_scope, ErrorCode, RelayError,
    },
    presence::SweepHandle,
    state::RelayState,
    ws,
};

pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
pub const SHUTDOWN_NOTICE: &str = "backend service shutting down...";

pub fn build_router(state: RelayState) -> Router {
    let cors = cors::cors_layer(state.config.cors_origins.as_deref());
    apply_middleware(
        Router::new()
            .route("/healthz", get(healthz))
            .merge(ws::router(state.hub.clone()))
            .merge(api::router(state)),
    )
    .layer(cors)
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(panic_handler))
        .layer(middleware::from_fn(request_context_middleware))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Tell connected clients the relay is going away, then stop every
/// forwarding loop and the presence sweep.
pub async fn shutdown_relay(state: &RelayState, sweep: SweepHandle) {
    let notified = state.hub.broadcast(Value::String(SHUTDOWN_NOTICE.to_string())).await;
    let closed = state.hub.close_all().await;
    sweep.shutdown().await;
    info!(notified, closed, "relay connections closed");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());
    match tokio::spawn(with_request_id_scope(request_id, next.run(request))).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            RelayError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
