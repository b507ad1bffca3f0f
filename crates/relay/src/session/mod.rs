// Registry of signed-in users' live session artifacts.
//
// An entry holds the claims of the user's current token and the handle on
// their working space. Replacing or evicting an entry takes it out of the
// map first and only then talks to the auth authority, so no lock is held
// across that call.

pub mod space;

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    auth::{jwt::UserClaims, revocation::TokenRevocationList, AuthAuthority},
    presence::PresenceTracker,
};

pub use self::space::UserSpace;

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub user_id: String,
    pub claims: Arc<UserClaims>,
    pub space: Arc<UserSpace>,
    pub registered_at: DateTime<Utc>,
}

/// What [`SessionRegistry::evict_if_idle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEviction {
    Evicted,
    NoSession,
    BackOnline,
}

pub struct SessionRegistry<A: AuthAuthority = TokenRevocationList> {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    authority: A,
}

impl<A: AuthAuthority> SessionRegistry<A> {
    pub fn new(authority: A) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), authority }
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Insert or replace the session of `user_id`. Replaced claims are
    /// revoked, so only the newest token of a user stays usable.
    pub async fn register(&self, user_id: &str, claims: Arc<UserClaims>, space: Arc<UserSpace>) {
        let entry = SessionEntry {
            user_id: user_id.to_owned(),
            claims,
            space,
            registered_at: Utc::now(),
        };
        let replaced = self.sessions.write().await.insert(user_id.to_owned(), entry);
        if let Some(previous) = replaced {
            self.revoke_entry(&previous, "failed to revoke replaced claims").await;
            info!(
                user_id = %user_id,
                token_id = %previous.claims.jti,
                "session replaced by a newer sign-in"
            );
        }
    }

    pub async fn lookup(&self, user_id: &str) -> Option<SessionEntry> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Tear down the session of `user_id`: revoke its claims and release
    /// the space handle. Returns `false` when there was nothing to evict.
    ///
    /// A failed revocation is logged; the entry stays removed.
    pub async fn evict(&self, user_id: &str) -> bool {
        let Some(entry) = self.sessions.write().await.remove(user_id) else {
            return false;
        };
        self.release(entry).await;
        true
    }

    /// Evict `user_id` unless `presence` reports them online again.
    ///
    /// The presence check runs while the session map is locked, so a sign-in
    /// that refreshed presence before registering cannot lose its new session.
    pub async fn evict_if_idle(&self, user_id: &str, presence: &PresenceTracker) -> IdleEviction {
        let entry = {
            let mut sessions = self.sessions.write().await;
            if presence.is_online(user_id).await {
                return IdleEviction::BackOnline;
            }
            sessions.remove(user_id)
        };
        match entry {
            Some(entry) => {
                self.release(entry).await;
                IdleEviction::Evicted
            }
            None => IdleEviction::NoSession,
        }
    }

    async fn release(&self, entry: SessionEntry) {
        self.revoke_entry(&entry, "failed to revoke claims during session eviction").await;
        info!(
            user_id = %entry.user_id,
            space = %entry.space.dir().display(),
            "session evicted"
        );
    }

    async fn revoke_entry(&self, entry: &SessionEntry, failure: &'static str) {
        if let Err(error) = self.authority.revoke(&entry.claims).await {
            warn!(
                user_id = %entry.user_id,
                token_id = %entry.claims.jti,
                error = ?error,
                "{failure}"
            );
        }
    }

    /// Signed-in user ids, sorted.
    pub async fn users(&self) -> Vec<String> {
        let mut users = self.sessions.read().await.keys().cloned().collect::<Vec<_>>();
        users.sort();
        users
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry<TokenRevocationList> {
    fn default() -> Self {
        Self::new(TokenRevocationList::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Authority that records calls and can be told to fail.
    #[derive(Clone, Default)]
    struct RecordingAuthority {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AuthAuthority for RecordingAuthority {
        async fn revoke(&self, _claims: &UserClaims) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("auth store unavailable");
            }
            Ok(())
        }
    }

    fn claims_for(user_id: &str) -> Arc<UserClaims> {
        Arc::new(UserClaims {
            sub: user_id.to_owned(),
            jti: Uuid::new_v4(),
            admin: false,
            iat: 0,
            exp: i64::MAX,
        })
    }

    async fn space_for(root: &std::path::Path, user_id: &str) -> Arc<UserSpace> {
        Arc::new(UserSpace::open(root, user_id).await.expect("space should open"))
    }

    fn temp_root() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().to_path_buf();
        (dir, path)
    }

    #[tokio::test]
    async fn register_makes_session_visible_to_lookup() {
        let (_guard, root) = temp_root();
        let registry = SessionRegistry::new(RecordingAuthority::default());
        let claims = claims_for("alice");

        registry.register("alice", claims.clone(), space_for(&root, "alice").await).await;

        let entry = registry.lookup("alice").await.expect("alice should be registered");
        assert_eq!(entry.user_id, "alice");
        assert_eq!(entry.claims.jti, claims.jti);
        assert!(registry.lookup("bob").await.is_none());
    }

    #[tokio::test]
    async fn register_overwrites_previous_session() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority::default();
        let registry = SessionRegistry::new(authority.clone());
        let space = space_for(&root, "alice").await;
        registry.register("alice", claims_for("alice"), space.clone()).await;
        assert_eq!(authority.calls.load(Ordering::SeqCst), 0);

        let newer = claims_for("alice");
        registry.register("alice", newer.clone(), space).await;

        assert_eq!(registry.len().await, 1);
        let entry = registry.lookup("alice").await.expect("alice should be registered");
        assert_eq!(entry.claims.jti, newer.jti);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replaced_claims_are_blacklisted_but_newest_stays_valid() {
        let (_guard, root) = temp_root();
        let registry = SessionRegistry::default();
        let older = claims_for("alice");
        let newer = claims_for("alice");
        registry.register("alice", older.clone(), space_for(&root, "alice").await).await;
        registry.register("alice", newer.clone(), space_for(&root, "alice").await).await;

        assert!(registry.authority().is_revoked(older.jti).await);
        assert!(!registry.authority().is_revoked(newer.jti).await);
    }

    #[tokio::test]
    async fn failed_revocation_on_replace_still_installs_new_session() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority { fail: true, ..Default::default() };
        let registry = SessionRegistry::new(authority.clone());
        registry.register("alice", claims_for("alice"), space_for(&root, "alice").await).await;
        let newer = claims_for("alice");
        registry.register("alice", newer.clone(), space_for(&root, "alice").await).await;

        let entry = registry.lookup("alice").await.expect("alice should be registered");
        assert_eq!(entry.claims.jti, newer.jti);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_eviction_spares_users_back_online() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority::default();
        let registry = SessionRegistry::new(authority.clone());
        let presence = PresenceTracker::default();
        registry.register("alice", claims_for("alice"), space_for(&root, "alice").await).await;
        registry.register("bob", claims_for("bob"), space_for(&root, "bob").await).await;
        presence.touch("alice").await;

        assert_eq!(registry.evict_if_idle("alice", &presence).await, IdleEviction::BackOnline);
        assert_eq!(registry.evict_if_idle("bob", &presence).await, IdleEviction::Evicted);
        assert_eq!(registry.evict_if_idle("bob", &presence).await, IdleEviction::NoSession);

        assert_eq!(registry.users().await, vec!["alice".to_string()]);
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn evict_revokes_claims_and_releases_space() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority::default();
        let registry = SessionRegistry::new(authority.clone());
        let space = space_for(&root, "alice").await;
        registry.register("alice", claims_for("alice"), space.clone()).await;
        assert_eq!(Arc::strong_count(&space), 2);

        assert!(registry.evict("alice").await);

        assert!(registry.lookup("alice").await.is_none());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
        assert_eq!(Arc::strong_count(&space), 1);
    }

    #[tokio::test]
    async fn evict_is_idempotent() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority::default();
        let registry = SessionRegistry::new(authority.clone());
        registry.register("alice", claims_for("alice"), space_for(&root, "alice").await).await;

        assert!(registry.evict("alice").await);
        assert!(!registry.evict("alice").await);
        assert!(!registry.evict("never-signed-in").await);

        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_revocation_still_clears_local_state() {
        let (_guard, root) = temp_root();
        let authority = RecordingAuthority { fail: true, ..Default::default() };
        let registry = SessionRegistry::new(authority.clone());
        registry.register("alice", claims_for("alice"), space_for(&root, "alice").await).await;

        assert!(registry.evict("alice").await);

        assert!(registry.lookup("alice").await.is_none());
        assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_registry_blacklists_evicted_tokens() {
        let (_guard, root) = temp_root();
        let registry = SessionRegistry::default();
        let claims = claims_for("alice");
        registry.register("alice", claims.clone(), space_for(&root, "alice").await).await;

        registry.evict("alice").await;

        assert!(registry.authority().is_revoked(claims.jti).await);
    }

    #[tokio::test]
    async fn users_lists_sorted_ids() {
        let (_guard, root) = temp_root();
        let registry = SessionRegistry::default();
        for user in ["carol", "alice", "bob"] {
            registry.register(user, claims_for(user), space_for(&root, user).await).await;
        }
        assert_eq!(registry.users().await, vec!["alice", "bob", "carol"]);
    }
}
