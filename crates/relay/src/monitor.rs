// Consumer side of the presence sweep: tears down sessions of idle users.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    auth::AuthAuthority,
    presence::PresenceTracker,
    session::{IdleEviction, SessionRegistry},
};

/// Drain `idle_rx`, evicting each user's session. Users who signed in or
/// sent a heartbeat after the sweep reported them keep their session. The
/// task ends when the sweep drops its sender.
pub fn spawn_eviction_worker<A: AuthAuthority>(
    mut idle_rx: mpsc::Receiver<String>,
    registry: Arc<SessionRegistry<A>>,
    presence: PresenceTracker,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(user_id) = idle_rx.recv().await {
            match registry.evict_if_idle(&user_id, &presence).await {
                IdleEviction::BackOnline => {
                    debug!(user_id = %user_id, "user back online, keeping session");
                }
                outcome => {
                    let had_session = outcome == IdleEviction::Evicted;
                    info!(user_id = %user_id, had_session, "user went offline");
                }
            }
        }
        debug!("idle queue closed, eviction worker exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::UserClaims,
        presence::SweepConfig,
        session::UserSpace,
        state::{tests::test_config, RelayState},
    };
    use std::time::Duration;
    use tokio::time::{advance, timeout};
    use uuid::Uuid;

    fn claims_for(user_id: &str) -> Arc<UserClaims> {
        Arc::new(UserClaims {
            sub: user_id.to_owned(),
            jti: Uuid::new_v4(),
            admin: false,
            iat: 0,
            exp: i64::MAX,
        })
    }

    #[tokio::test]
    async fn worker_evicts_each_reported_user() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = Arc::new(SessionRegistry::default());
        for user in ["alice", "bob"] {
            let space = UserSpace::open(root.path(), user).await.expect("space should open");
            registry.register(user, claims_for(user), Arc::new(space)).await;
        }

        let (idle_tx, idle_rx) = mpsc::channel(4);
        let worker =
            spawn_eviction_worker(idle_rx, Arc::clone(&registry), PresenceTracker::default());

        idle_tx.send("alice".to_string()).await.expect("worker should be listening");
        idle_tx.send("ghost".to_string()).await.expect("worker should be listening");
        drop(idle_tx);

        timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker should exit once the queue closes")
            .expect("worker should not panic");

        assert_eq!(registry.users().await, vec!["bob".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_user_loses_session_after_sweep() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let registry = Arc::new(SessionRegistry::default());
        let claims = claims_for("alice");
        let space = UserSpace::open(root.path(), "alice").await.expect("space should open");
        registry.register("alice", Arc::clone(&claims), Arc::new(space)).await;

        let tracker = PresenceTracker::default();
        tracker.touch("alice").await;
        let (idle_rx, sweep) = tracker
            .start_sweep(SweepConfig::new(Duration::from_secs(1), Duration::from_secs(60)));
        let _worker = spawn_eviction_worker(idle_rx, Arc::clone(&registry), tracker.clone());

        advance(Duration::from_secs(62)).await;
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        assert!(!tracker.is_online("alice").await);
        assert!(registry.lookup("alice").await.is_none());
        assert!(registry.authority().is_revoked(claims.jti).await);

        sweep.shutdown().await;
    }

    #[tokio::test]
    async fn sign_in_between_sweep_and_eviction_keeps_the_new_session() {
        let root = tempfile::tempdir().expect("temp dir should be created");
        let state = RelayState::new(test_config(root.path())).expect("state should build");
        state.open_session("alice", false).await.expect("session should open");
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(state.presence.sweep_once(Duration::ZERO).await, vec!["alice".to_string()]);
        let token = state.open_session("alice", false).await.expect("session should reopen");

        let (idle_tx, idle_rx) = mpsc::channel(4);
        let worker = spawn_eviction_worker(
            idle_rx,
            Arc::clone(&state.sessions),
            state.presence.clone(),
        );
        idle_tx.send("alice".to_string()).await.expect("worker should be listening");
        drop(idle_tx);
        timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker should exit once the queue closes")
            .expect("worker should not panic");

        let fresh = state.jwt_service.validate_user_token(&token).expect("token should validate");
        assert!(state.presence.is_online("alice").await);
        let entry = state.sessions.lookup("alice").await.expect("session should survive");
        assert_eq!(entry.claims.jti, fresh.jti);
        assert!(!state.revocations().is_revoked(fresh.jti).await);
    }
}
