// Blacklist of revoked access-token ids.
//
// Entries remember the token's expiry so they can be pruned once the
// token would be rejected on expiry alone.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    jwt::{current_unix_timestamp, UserClaims},
    AuthAuthority,
};

pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct TokenRevocationList {
    revoked: Arc<RwLock<HashMap<Uuid, i64>>>,
}

impl TokenRevocationList {
    pub async fn revoke_claims(&self, claims: &UserClaims) {
        self.revoked.write().await.insert(claims.jti, claims.exp);
    }

    pub async fn is_revoked(&self, token_id: Uuid) -> bool {
        self.revoked.read().await.contains_key(&token_id)
    }

    /// Drop entries whose token expired before `now` (unix seconds).
    pub async fn prune_expired(&self, now: i64) -> usize {
        let mut guard = self.revoked.write().await;
        let before = guard.len();
        guard.retain(|_, expires_at| *expires_at >= now);
        before - guard.len()
    }

    pub async fn len(&self) -> usize {
        self.revoked.read().await.len()
    }

    /// Prune expired entries every `every` until the task is aborted.
    pub fn start_pruning(&self, every: Duration) -> JoinHandle<()> {
        let list = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = match current_unix_timestamp() {
                    Ok(now) => now,
                    Err(error) => {
                        warn!(?error, "skipping revocation prune, clock unavailable");
                        continue;
                    }
                };
                let pruned = list.prune_expired(now).await;
                if pruned > 0 {
                    let remaining = list.len().await;
                    debug!(pruned, remaining, "pruned expired revocations");
                }
            }
        })
    }
}

impl AuthAuthority for TokenRevocationList {
    async fn revoke(&self, claims: &UserClaims) -> anyhow::Result<()> {
        self.revoke_claims(claims).await;
        Ok(())
    }
}
