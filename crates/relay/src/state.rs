use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    auth::{jwt::JwtAccessTokenService, middleware::AuthGate, revocation::TokenRevocationList},
    config::RelayConfig,
    hub::BroadcastHub,
    presence::{PresenceTracker, SweepConfig},
    session::{SessionRegistry, UserSpace},
};

/// Shared handles the router, the sweep and the shutdown path work on.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub jwt_service: Arc<JwtAccessTokenService>,
    pub presence: PresenceTracker,
    pub sessions: Arc<SessionRegistry>,
    pub hub: BroadcastHub,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let jwt_service = Arc::new(
            JwtAccessTokenService::new(&config.jwt_secret).context("invalid relay JWT secret")?,
        );
        let hub = BroadcastHub::new(config.outbox_capacity);

        Ok(Self {
            config: Arc::new(config),
            jwt_service,
            presence: PresenceTracker::default(),
            sessions: Arc::new(SessionRegistry::default()),
            hub,
        })
    }

    /// Revocation list shared by the session registry and the bearer middleware.
    pub fn revocations(&self) -> &TokenRevocationList {
        self.sessions.authority()
    }

    pub fn auth_gate(&self) -> AuthGate {
        AuthGate {
            jwt_service: Arc::clone(&self.jwt_service),
            revocations: self.revocations().clone(),
            presence: self.presence.clone(),
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::new(self.config.sweep_interval, self.config.offline_timeout)
            .with_queue_capacity(self.config.idle_queue_capacity)
    }

    /// Sign `user_id` in after the caller has verified their credentials.
    /// Returns the bearer token for subsequent requests.
    pub async fn open_session(&self, user_id: &str, admin: bool) -> anyhow::Result<String> {
        let (token, claims) = self
            .jwt_service
            .issue_user_token(user_id, admin)
            .with_context(|| format!("failed to issue token for {user_id}"))?;
        let space = UserSpace::open(&self.config.data_dir, user_id).await?;

        // Presence goes first so a pending idle eviction sees the user online.
        self.presence.touch(user_id).await;
        self.sessions.register(user_id, Arc::new(claims), Arc::new(space)).await;

        info!(user_id = %user_id, admin, "session opened");
        Ok(token)
    }
}
