//! Deferred reply correlator.
//!
//! Agent sessions enqueue `(cmd_id, result, exit_code)` tuples as they
//! arrive; this module periodically batches them into one `UPDATE` against
//! `CommandHistory` rather than writing on every reply. The background tick
//! stops itself once no row is left with a null `response`, and is
//! restarted by whichever caller next has reason to believe one exists
//! (a fresh reply, or a fresh dispatch batch).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use botfleet_storage::{GatewayError, PendingReply, PersistenceGateway};

struct State {
    buffer: Vec<PendingReply>,
    running: bool,
}

#[derive(Clone)]
pub struct ReplyCorrelator {
    storage: Arc<dyn PersistenceGateway>,
    resp_wait_window: Duration,
    state: Arc<Mutex<State>>,
}

impl ReplyCorrelator {
    pub fn new(storage: Arc<dyn PersistenceGateway>, resp_wait_window: Duration) -> Self {
        ReplyCorrelator {
            storage,
            resp_wait_window,
            state: Arc::new(Mutex::new(State {
                buffer: Vec::new(),
                running: false,
            })),
        }
    }

    /// Enqueues a reply and ensures the tick task is running.
    pub async fn enqueue(&self, reply: PendingReply) {
        let mut state = self.state.lock().await;
        state.buffer.push(reply);
        self.ensure_running(&mut state);
    }

    /// Called after a dispatch batch appends fresh `CommandHistory` rows, so
    /// the tick task restarts even if no reply has arrived yet.
    pub async fn notify_new_batch(&self) {
        let mut state = self.state.lock().await;
        self.ensure_running(&mut state);
    }

    fn ensure_running(&self, state: &mut State) {
        if state.running {
            return;
        }
        state.running = true;
        let correlator = self.clone();
        tokio::spawn(async move { correlator.tick_loop().await });
    }

    async fn tick_loop(self) {
        loop {
            tokio::time::sleep(self.resp_wait_window).await;
            if let Err(e) = self.tick_once().await {
                tracing::error!(error = %e, "reply correlator flush failed");
            }
            let mut state = self.state.lock().await;
            let still_pending = self.storage.has_pending_responses().unwrap_or(true);
            if !still_pending {
                state.running = false;
                return;
            }
        }
    }

    async fn tick_once(&self) -> Result<(), GatewayError> {
        let pending = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.buffer)
        };
        if pending.is_empty() {
            return Ok(());
        }
        if !self.storage.has_pending_responses()? {
            return Ok(());
        }
        self.storage.add_event_responses(&pending)
    }
}
