// Fan-out of server-initiated messages to live websocket connections.
//
// Each connection owns a bounded outbox drained by exactly one forwarding
// loop, and a cancellation signal that stops that loop. Delivery never
// blocks the caller: a full outbox drops the new message.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use beacon_common::protocol::push::PushMessage;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, warn};

pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct ConnectionSlot {
    generation: u64,
    outbox: mpsc::Sender<PushMessage>,
    cancel: watch::Sender<bool>,
}

/// Receiving half of a registered connection, owned by its forwarding loop.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub conn_id: String,
    pub generation: u64,
    pub outbox: mpsc::Receiver<PushMessage>,
    pub cancel: watch::Receiver<bool>,
}

#[derive(Debug, Clone)]
pub struct BroadcastHub {
    connections: Arc<RwLock<HashMap<String, ConnectionSlot>>>,
    next_generation: Arc<AtomicU64>,
    outbox_capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Register `conn_id`. An existing registration under the same id is
    /// replaced and its forwarding loop cancelled.
    pub async fn connect(&self, conn_id: &str) -> ConnectionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (outbox_tx, outbox_rx) = mpsc::channel(self.outbox_capacity);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let replaced = self.connections.write().await.insert(
            conn_id.to_owned(),
            ConnectionSlot { generation, outbox: outbox_tx, cancel: cancel_tx },
        );
        if let Some(previous) = replaced {
            warn!(
                conn_id = %conn_id,
                previous_generation = previous.generation,
                "connection id already registered, replacing it"
            );
            let _ = previous.cancel.send(true);
        }

        ConnectionHandle {
            conn_id: conn_id.to_owned(),
            generation,
            outbox: outbox_rx,
            cancel: cancel_rx,
        }
    }

    /// Queue `message` for `conn_id`. Returns `false` when the id is unknown
    /// or the outbox cannot take the message.
    pub async fn send(&self, conn_id: &str, message: PushMessage) -> bool {
        let outbox = match self.connections.read().await.get(conn_id) {
            Some(slot) => slot.outbox.clone(),
            None => return false,
        };
        enqueue(conn_id, &outbox, message)
    }

    /// Queue `message` for every registered connection. Returns the number
    /// of outboxes that accepted it.
    pub async fn broadcast(&self, message: PushMessage) -> usize {
        let recipients = {
            let guard = self.connections.read().await;
            guard
                .iter()
                .map(|(conn_id, slot)| (conn_id.clone(), slot.outbox.clone()))
                .collect::<Vec<_>>()
        };

        let mut delivered = 0;
        for (conn_id, outbox) in recipients {
            if enqueue(&conn_id, &outbox, message.clone()) {
                delivered += 1;
            }
        }
        debug!(delivered, "broadcast queued");
        delivered
    }

    /// Take `conn_id` out of the hub and signal its forwarding loop to stop.
    /// Messages queued before the call are still flushed by the loop; later
    /// sends and broadcasts no longer reach it.
    pub async fn close(&self, conn_id: &str) -> bool {
        let Some(slot) = self.connections.write().await.remove(conn_id) else {
            return false;
        };
        let _ = slot.cancel.send(true);
        true
    }

    /// Take every connection out of the hub and signal each forwarding loop
    /// to stop. Returns the number signalled.
    pub async fn close_all(&self) -> usize {
        let slots = {
            let mut guard = self.connections.write().await;
            guard.drain().map(|(_, slot)| slot).collect::<Vec<_>>()
        };
        for slot in &slots {
            let _ = slot.cancel.send(true);
        }
        slots.len()
    }

    /// Remove `conn_id` if it still belongs to `generation`.
    pub async fn unregister(&self, conn_id: &str, generation: u64) -> bool {
        let mut guard = self.connections.write().await;
        match guard.get(conn_id) {
            Some(slot) if slot.generation == generation => {
                guard.remove(conn_id);
                true
            }
            _ => false,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Registered connection ids, sorted.
    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids = self.connections.read().await.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

fn enqueue(conn_id: &str, outbox: &mpsc::Sender<PushMessage>, message: PushMessage) -> bool {
    match outbox.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(conn_id = %conn_id, "outbox full, dropping message");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(conn_id = %conn_id, "outbox closed, dropping message");
            false
        }
    }
}
