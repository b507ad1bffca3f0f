// Websocket push channel: `GET /ws/msg`.
//
// The upgrade registers the connection with the hub; `handler` then owns
// the socket until the client leaves or the hub cancels it.

mod handler;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{request_id_from_headers_or_generate, with_request_id_scope},
    hub::BroadcastHub,
};

pub const CONNECTION_ID_HEADER: &str = "id";
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

pub fn router(hub: BroadcastHub) -> Router {
    Router::new().route("/ws/msg", get(ws_upgrade)).with_state(hub)
}

pub async fn ws_upgrade(
    State(hub): State<BroadcastHub>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let conn_id = connection_id_from_headers(&headers);
    let request_id = request_id_from_headers_or_generate(&headers);
    debug!(conn_id = %conn_id, "websocket upgrade requested");

    ws.max_frame_size(MAX_FRAME_BYTES).on_upgrade(move |socket| async move {
        let handle = hub.connect(&conn_id).await;
        with_request_id_scope(request_id, handler::forward_messages(hub, handle, socket)).await;
    })
}

/// Connection id from the `id` header, or a fresh UUID when absent or blank.
pub fn connection_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn connection_id_comes_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION_ID_HEADER, HeaderValue::from_static("dashboard-1"));
        assert_eq!(connection_id_from_headers(&headers), "dashboard-1");
    }

    #[test]
    fn blank_or_missing_header_generates_uuid() {
        let mut headers = HeaderMap::new();
        let generated = connection_id_from_headers(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());

        headers.insert(CONNECTION_ID_HEADER, HeaderValue::from_static("   "));
        let generated = connection_id_from_headers(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        let headers = HeaderMap::new();
        assert_ne!(connection_id_from_headers(&headers), connection_id_from_headers(&headers));
    }
}
