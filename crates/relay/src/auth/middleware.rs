use crate::{
    auth::{jwt::JwtAccessTokenService, jwt::UserClaims, revocation::TokenRevocationList},
    error::{ErrorCode, RelayError},
    presence::PresenceTracker,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

/// Caller identity injected by [`require_bearer_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub admin: bool,
    pub claims: Arc<UserClaims>,
}

/// Everything the bearer middleware needs to admit a request.
#[derive(Clone)]
pub struct AuthGate {
    pub jwt_service: Arc<JwtAccessTokenService>,
    pub revocations: TokenRevocationList,
    pub presence: PresenceTracker,
}

pub async fn require_bearer_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing bearer token"),
    };

    let claims = match gate.jwt_service.validate_user_token(token) {
        Ok(claims) => claims,
        Err(_) => return unauthorized_response("invalid bearer token"),
    };

    if gate.revocations.is_revoked(claims.jti).await {
        debug!(user_id = %claims.sub, token_id = %claims.jti, "rejected revoked token");
        return RelayError::from_code(ErrorCode::AuthTokenRevoked).into_response();
    }

    gate.presence.touch(claims.user_id()).await;

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: claims.sub.clone(),
        admin: claims.admin,
        claims: Arc::new(claims),
    });

    next.run(request).await
}

/// Must run after [`require_bearer_auth`].
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthenticatedUser>() {
        Some(user) if user.admin => next.run(request).await,
        Some(_) => RelayError::new(ErrorCode::AuthForbidden, "admin privileges required")
            .into_response(),
        None => unauthorized_response("missing bearer token"),
    }
}

fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

fn unauthorized_response(message: &'static str) -> Response {
    RelayError::new(ErrorCode::AuthInvalidToken, message).into_response()
}
