use axum::extract::{Json, Query, State};
use beacon_common::protocol::admin::{
    BroadcastRequest, BroadcastResponse, OnlineUsersQuery, SendRequest, SendResponse,
};
use regex::Regex;
use tracing::info;

use crate::{
    error::{ErrorCode, RelayError},
    state::RelayState,
};

pub(super) async fn list_online_users(
    State(state): State<RelayState>,
    Query(query): Query<OnlineUsersQuery>,
) -> Result<Json<Vec<String>>, RelayError> {
    let users = state.presence.online_users().await;

    let Some(pattern) = query.uname.as_deref().filter(|pattern| !pattern.is_empty()) else {
        return Ok(Json(users));
    };
    let matcher = wildcard_regex(pattern).map_err(|error| {
        RelayError::new(ErrorCode::ValidationFailed, format!("invalid uname filter: {error}"))
    })?;

    Ok(Json(users.into_iter().filter(|user| matcher.is_match(user)).collect()))
}

pub(super) async fn broadcast(
    State(state): State<RelayState>,
    Json(payload): Json<BroadcastRequest>,
) -> Json<BroadcastResponse> {
    let delivered = state.hub.broadcast(payload.message).await;
    info!(delivered, "admin broadcast");
    Json(BroadcastResponse { delivered })
}

pub(super) async fn send_to_connection(
    State(state): State<RelayState>,
    Json(payload): Json<SendRequest>,
) -> Result<Json<SendResponse>, RelayError> {
    if !state.hub.send(&payload.conn_id, payload.message).await {
        return Err(RelayError::new(
            ErrorCode::NotFound,
            format!("connection {} is not accepting messages", payload.conn_id),
        ));
    }
    Ok(Json(SendResponse { delivered: true }))
}

/// `*` matches any run of characters; everything else is literal and the
/// whole id must match.
fn wildcard_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$"))
}
