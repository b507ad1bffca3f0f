// Bearer-authenticated REST routes.
//
// User routes only need a valid token; admin routes additionally require
// the `admin` claim.

mod admin;
mod user;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{
    auth::middleware::{require_admin, require_bearer_auth},
    state::RelayState,
};

pub fn router(state: RelayState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/onlines", get(admin::list_online_users))
        .route("/api/admin/broadcast", post(admin::broadcast))
        .route("/api/admin/send", post(admin::send_to_connection))
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/api/user/heartbeats", patch(user::heartbeats))
        .route("/api/sign-out", get(user::sign_out))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.auth_gate(), require_bearer_auth))
        .with_state(state)
}
