use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use codestream_core::types::Timestamp;

/// Channel sender half for pushing frames to one WebSocket connection.
///
/// Per-subscriber FIFO: frames pushed here reach the socket in order,
/// and the hub never holds its lock across a network send.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One subscriber socket and its binding.
pub struct Subscriber {
    /// The execution identifier this socket is currently bound to.
    pub execution_id: String,
    /// Channel sender for outbound frames to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// The hub's two maps. Kept in one struct behind one lock so every
/// mutation (bind, unbind, remove-on-failure) appears atomic to readers.
#[derive(Default)]
struct HubMaps {
    /// Connection id → subscriber (reverse map, O(1) unbind).
    subscribers: HashMap<String, Subscriber>,
    /// Execution identifier → connection ids bound to it.
    executions: HashMap<String, HashSet<String>>,
}

/// Registry mapping each execution identifier to its active subscriber
/// sockets.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc`
/// and shared between the dispatcher, subscriber accept tasks, and
/// socket-handler tasks. Every handle is in at most one identifier set
/// at any time; a set whose last handle leaves is removed.
pub struct SubscriptionHub {
    inner: RwLock<HubMaps>,
}

impl SubscriptionHub {
    /// Create a new, empty hub.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HubMaps::default()),
        }
    }

    /// Bind a connection to an execution identifier, generating a fresh
    /// identifier when none is given.
    ///
    /// Returns the effective identifier and the receiver half of the
    /// connection's frame channel for the socket's sender task.
    pub async fn bind(
        &self,
        conn_id: String,
        execution_id: Option<String>,
    ) -> (String, mpsc::UnboundedReceiver<Message>) {
        let execution_id = execution_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut maps = self.inner.write().await;
        // Re-binding an existing connection id replaces the old entry.
        remove_connection(&mut maps, &conn_id);
        maps.subscribers.insert(
            conn_id.clone(),
            Subscriber {
                execution_id: execution_id.clone(),
                sender: tx,
                connected_at: chrono::Utc::now(),
            },
        );
        maps.executions
            .entry(execution_id.clone())
            .or_default()
            .insert(conn_id);

        (execution_id, rx)
    }

    /// Remove a connection from its identifier set. Idempotent.
    pub async fn unbind(&self, conn_id: &str) {
        let mut maps = self.inner.write().await;
        remove_connection(&mut maps, conn_id);
    }

    /// Move a connection to a different execution identifier, keeping
    /// its frame channel. Returns `false` for an unknown connection.
    pub async fn rebind(&self, conn_id: &str, execution_id: String) -> bool {
        let mut maps = self.inner.write().await;
        let Some(subscriber) = maps.subscribers.get_mut(conn_id) else {
            return false;
        };
        let old = std::mem::replace(&mut subscriber.execution_id, execution_id.clone());

        if let Some(set) = maps.executions.get_mut(&old) {
            set.remove(conn_id);
            if set.is_empty() {
                maps.executions.remove(&old);
            }
        }
        maps.executions
            .entry(execution_id)
            .or_default()
            .insert(conn_id.to_string());
        true
    }

    /// The execution identifier a connection is currently bound to.
    pub async fn execution_of(&self, conn_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .subscribers
            .get(conn_id)
            .map(|s| s.execution_id.clone())
    }

    /// Serialize `payload` and send it to every handle bound to
    /// `execution_id`.
    ///
    /// A send failure unbinds that handle; other handles are
    /// unaffected. With no handles bound the call is a no-op.
    pub async fn send_to<T: Serialize>(&self, execution_id: &str, payload: &T) {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "Frame serialization failed");
                return;
            }
        };

        // Snapshot the senders so no lock is held across a send.
        let targets: Vec<(String, WsSender)> = {
            let maps = self.inner.read().await;
            match maps.executions.get(execution_id) {
                Some(conn_ids) => conn_ids
                    .iter()
                    .filter_map(|id| {
                        maps.subscribers
                            .get(id)
                            .map(|s| (id.clone(), s.sender.clone()))
                    })
                    .collect(),
                None => return,
            }
        };

        let mut failed = Vec::new();
        for (conn_id, sender) in targets {
            if sender
                .send(Message::Text(text.clone().into()))
                .is_err()
            {
                failed.push(conn_id);
            }
        }

        for conn_id in failed {
            tracing::debug!(conn_id = %conn_id, "Send failed; unbinding subscriber");
            self.unbind(&conn_id).await;
        }
    }

    /// Send `payload` to every currently populated identifier.
    pub async fn broadcast<T: Serialize>(&self, payload: &T) {
        let execution_ids: Vec<String> = {
            let maps = self.inner.read().await;
            maps.executions.keys().cloned().collect()
        };
        for execution_id in execution_ids {
            self.send_to(&execution_id, payload).await;
        }
    }

    /// Serialize `payload` and send it to one connection only.
    ///
    /// Used for per-socket control frames (pong, error replies).
    pub async fn send_to_connection<T: Serialize>(&self, conn_id: &str, payload: &T) {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(conn_id = %conn_id, error = %e, "Frame serialization failed");
                return;
            }
        };

        let sender = {
            let maps = self.inner.read().await;
            maps.subscribers.get(conn_id).map(|s| s.sender.clone())
        };

        if let Some(sender) = sender {
            if sender.send(Message::Text(text.into())).is_err() {
                self.unbind(conn_id).await;
            }
        }
    }

    /// Handles bound to `execution_id`, or the total over all
    /// identifiers when omitted.
    pub async fn count(&self, execution_id: Option<&str>) -> usize {
        let maps = self.inner.read().await;
        match execution_id {
            Some(id) => maps.executions.get(id).map_or(0, HashSet::len),
            None => maps.subscribers.len(),
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let maps = self.inner.read().await;
        for subscriber in maps.subscribers.values() {
            let _ = subscriber.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear both maps.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut maps = self.inner.write().await;
        let count = maps.subscribers.len();
        for subscriber in maps.subscribers.values() {
            let _ = subscriber.sender.send(Message::Close(None));
        }
        maps.subscribers.clear();
        maps.executions.clear();
        tracing::info!(count, "Closed all subscriber connections");
    }
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop a connection from both maps, removing its identifier set when
/// it becomes empty. Caller holds the write lock.
fn remove_connection(maps: &mut HubMaps, conn_id: &str) {
    if let Some(subscriber) = maps.subscribers.remove(conn_id) {
        if let Some(set) = maps.executions.get_mut(&subscriber.execution_id) {
            set.remove(conn_id);
            if set.is_empty() {
                maps.executions.remove(&subscriber.execution_id);
            }
        }
    }
}
