//! In-memory registry of live agent sessions.
//!
//! Every id present here has an open, post-handshake connection; cached
//! identity fields mirror the durable inventory row but are kept in memory
//! so the dispatch scheduler and the HTTP control plane never need to hit
//! the store just to know who is online.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};

use botfleet_protocol::Message;

/// A single write request handed to a session's serialized writer task.
pub struct WriteRequest {
    pub message: Message,
    pub ack: oneshot::Sender<Result<(), WriteError>>,
}

#[derive(Debug)]
pub enum WriteError {
    Closed,
    Timeout,
    Io(String),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Closed => write!(f, "session closed"),
            WriteError::Timeout => write!(f, "write timed out"),
            WriteError::Io(s) => write!(f, "write failed: {s}"),
        }
    }
}

impl std::error::Error for WriteError {}

/// Cached identity plus the handle used to serialize writes onto a live
/// session's single writer half.
#[derive(Clone)]
pub struct LiveAgent {
    pub hostname: String,
    pub address: String,
    pub os: String,
    pub writer: mpsc::Sender<WriteRequest>,
}

/// Result of [`AgentRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    New,
    Refreshed,
}

#[derive(Clone, Default)]
pub struct AgentRegistry {
    live: Arc<RwLock<HashMap<String, LiveAgent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live session, replacing any prior live session for the
    /// same id (the old session's writer is simply dropped; its own reader
    /// loop will observe the closed socket on its next read).
    pub async fn upsert(
        &self,
        id: &str,
        hostname: &str,
        address: &str,
        os: &str,
        writer: mpsc::Sender<WriteRequest>,
    ) -> UpsertOutcome {
        let mut live = self.live.write().await;
        let outcome = if live.contains_key(id) {
            UpsertOutcome::Refreshed
        } else {
            UpsertOutcome::New
        };
        live.insert(
            id.to_owned(),
            LiveAgent {
                hostname: hostname.to_owned(),
                address: address.to_owned(),
                os: os.to_owned(),
                writer,
            },
        );
        outcome
    }

    /// Removes the live-session half for `id`. The durable inventory row is
    /// untouched.
    pub async fn drop_session(&self, id: &str) {
        self.live.write().await.remove(id);
    }

    pub async fn is_live(&self, id: &str) -> bool {
        self.live.read().await.contains_key(id)
    }

    pub async fn get(&self, id: &str) -> Option<LiveAgent> {
        self.live.read().await.get(id).cloned()
    }

    /// Materializes the target set for a dispatch: `"*"` (optionally
    /// filtered by os) or the exact id if it is currently live.
    pub async fn targets(&self, entity: &str, os: Option<&str>) -> Vec<String> {
        let live = self.live.read().await;
        if entity == "*" {
            live.iter()
                .filter(|(_, a)| os.is_none_or(|want| a.os == want))
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            match live.get(entity) {
                Some(a) if os.is_none_or(|want| a.os == want) => vec![entity.to_owned()],
                _ => Vec::new(),
            }
        }
    }

    pub async fn live_ids(&self) -> Vec<String> {
        self.live.read().await.keys().cloned().collect()
    }

    pub async fn live_count(&self, os: Option<&str>) -> usize {
        self.live
            .read()
            .await
            .values()
            .filter(|a| os.is_none_or(|want| a.os == want))
            .count()
    }
}

/// Sends `message` on `writer` and waits up to `timeout` for the write to
/// land on the wire. Used by the dispatch scheduler's per-target fan-out.
pub async fn write_with_timeout(
    writer: &mpsc::Sender<WriteRequest>,
    message: Message,
    timeout: Duration,
) -> Result<(), WriteError> {
    let (ack_tx, ack_rx) = oneshot::channel();
    writer
        .send(WriteRequest {
            message,
            ack: ack_tx,
        })
        .await
        .map_err(|_| WriteError::Closed)?;
    match tokio::time::timeout(timeout, ack_rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(WriteError::Closed),
        Err(_) => Err(WriteError::Timeout),
    }
}
