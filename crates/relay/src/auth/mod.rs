pub mod jwt;
pub mod middleware;
pub mod revocation;

use std::future::Future;

use self::jwt::UserClaims;

/// The external authority that owns issued credentials.
///
/// The session registry calls it to invalidate a user's claims when the
/// session is evicted. All methods return `Send` futures so eviction can
/// run on a multi-threaded tokio runtime.
pub trait AuthAuthority: Send + Sync + 'static {
    /// Revoke the token described by `claims`. Revoking an already
    /// revoked token must succeed.
    fn revoke(&self, claims: &UserClaims) -> impl Future<Output = anyhow::Result<()>> + Send;
}
