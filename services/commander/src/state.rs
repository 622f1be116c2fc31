//! Shared application state handed to every HTTP handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use botfleet_storage::PersistenceGateway;

use crate::correlator::ReplyCorrelator;
use crate::registry::AgentRegistry;
use crate::scheduler::DispatchScheduler;

#[derive(Clone)]
pub struct AppState {
    pub registry: AgentRegistry,
    pub storage: Arc<dyn PersistenceGateway>,
    pub scheduler: DispatchScheduler,
    pub correlator: ReplyCorrelator,
    cmd_timeout_secs: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        registry: AgentRegistry,
        storage: Arc<dyn PersistenceGateway>,
        scheduler: DispatchScheduler,
        correlator: ReplyCorrelator,
        initial_cmd_timeout_secs: u64,
    ) -> Self {
        AppState {
            registry,
            storage,
            scheduler,
            correlator,
            cmd_timeout_secs: Arc::new(AtomicU64::new(initial_cmd_timeout_secs)),
        }
    }

    pub fn cmd_timeout_secs(&self) -> u64 {
        self.cmd_timeout_secs.load(Ordering::Relaxed)
    }

    pub fn set_cmd_timeout_secs(&self, value: u64) {
        self.cmd_timeout_secs.store(value, Ordering::Relaxed);
    }
}
