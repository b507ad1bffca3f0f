// Online-user presence: last-activity tracking and idle eviction.
//
// Every authenticated request touches the caller. A background sweep
// removes users idle past the offline timeout and hands their ids to the
// eviction worker through a bounded queue.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch, RwLock},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Last-activity timestamps keyed by user id.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    last_seen: Arc<RwLock<HashMap<String, Instant>>>,
}

impl PresenceTracker {
    /// Record activity for `user_id`. A touch never moves `last_seen` back.
    pub async fn touch(&self, user_id: &str) {
        let now = Instant::now();
        let mut guard = self.last_seen.write().await;
        match guard.get_mut(user_id) {
            Some(seen) => *seen = (*seen).max(now),
            None => {
                guard.insert(user_id.to_owned(), now);
            }
        }
    }

    /// Forget `user_id` immediately (explicit sign-out).
    pub async fn remove(&self, user_id: &str) -> bool {
        self.last_seen.write().await.remove(user_id).is_some()
    }

    pub async fn last_seen(&self, user_id: &str) -> Option<Instant> {
        self.last_seen.read().await.get(user_id).copied()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.last_seen.read().await.contains_key(user_id)
    }

    /// Online user ids, sorted.
    pub async fn online_users(&self) -> Vec<String> {
        let mut users = self.last_seen.read().await.keys().cloned().collect::<Vec<_>>();
        users.sort();
        users
    }

    pub async fn len(&self) -> usize {
        self.last_seen.read().await.len()
    }

    /// Remove and return every user idle for longer than `timeout`.
    pub async fn sweep_once(&self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut idle = Vec::new();
        {
            let mut guard = self.last_seen.write().await;
            guard.retain(|user_id, seen| {
                if now.saturating_duration_since(*seen) > timeout {
                    idle.push(user_id.clone());
                    false
                } else {
                    true
                }
            });
        }
        idle.sort();
        idle
    }

    /// Start the periodic sweep. Evicted user ids arrive on the returned
    /// receiver, each exactly once.
    pub fn start_sweep(&self, config: SweepConfig) -> (mpsc::Receiver<String>, SweepHandle) {
        let (idle_tx, idle_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tracker = self.clone();
        let task = tokio::spawn(async move {
            sweep_loop(tracker, config, idle_tx, shutdown_rx).await;
        });

        (idle_rx, SweepHandle { task, shutdown_tx })
    }
}

/// Timing of the presence sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// How often the sweep runs.
    pub interval: Duration,
    /// Idle time after which a user is evicted.
    pub timeout: Duration,
    /// Capacity of the idle-user queue.
    pub queue_capacity: usize,
}

impl SweepConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout, queue_capacity: 4096 }
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }
}

/// Handle for the sweep task. Dropping the handle aborts the task.
pub struct SweepHandle {
    task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl SweepHandle {
    /// Stop the sweep and wait for the loop to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(error) = (&mut self.task).await {
            if !error.is_cancelled() {
                warn!(?error, "presence sweep task failed");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn sweep_loop(
    tracker: PresenceTracker,
    config: SweepConfig,
    idle_tx: mpsc::Sender<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset(); // skip immediate first tick

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for user_id in tracker.sweep_once(config.timeout).await {
                    info!(user_id = %user_id, "user idle past offline timeout");
                    deliver_idle(&idle_tx, user_id);
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("presence sweep shutting down");
                break;
            }
        }
    }
}

/// Hand an evicted id to the eviction worker without stalling the sweep.
fn deliver_idle(idle_tx: &mpsc::Sender<String>, user_id: String) {
    match idle_tx.try_send(user_id) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(user_id)) => {
            warn!(user_id = %user_id, "idle queue full, delivering asynchronously");
            let idle_tx = idle_tx.clone();
            tokio::spawn(async move {
                if let Err(error) = idle_tx.send(user_id).await {
                    warn!(user_id = %error.0, "eviction worker gone, dropping idle user");
                }
            });
        }
        Err(mpsc::error::TrySendError::Closed(user_id)) => {
            warn!(user_id = %user_id, "eviction worker gone, dropping idle user");
        }
    }
}
