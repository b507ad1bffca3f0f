use axum::extract::{Extension, Json, State};
use tracing::{info, warn};

use crate::{
    auth::{middleware::AuthenticatedUser, AuthAuthority},
    state::RelayState,
};

/// Presence was already refreshed by the bearer middleware.
pub(super) async fn heartbeats(Extension(user): Extension<AuthenticatedUser>) -> String {
    format!("[{}] heartbeats", user.user_id)
}

pub(super) async fn sign_out(
    State(state): State<RelayState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<String> {
    let had_session = state.sessions.evict(&user.user_id).await;
    state.presence.remove(&user.user_id).await;

    // The presented token may differ from the one stored with the session.
    if let Err(error) = state.revocations().revoke(&user.claims).await {
        warn!(user_id = %user.user_id, ?error, "failed to revoke presented token");
    }

    info!(user_id = %user.user_id, had_session, "user signed out");
    Json(format!("[{}] sign-out successfully", user.user_id))
}
