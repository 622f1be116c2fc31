//! Dispatch scheduler: target selection, correlation-id assignment, bulk
//! persistence, and fan-out writes.

use std::sync::Arc;
use std::time::Duration;

use botfleet_protocol::{Message, ScriptType};
use botfleet_storage::{GatewayError, PersistenceGateway};

use crate::correlator::ReplyCorrelator;
use crate::registry::{write_with_timeout, AgentRegistry};

/// Per-write deadline on the dispatch path; a write failure to one agent
/// does not abort the rest of the batch.
const DISPATCH_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResult {
    pub id: String,
    pub outcome: DispatchOutcome,
}

#[derive(Clone)]
pub struct DispatchScheduler {
    registry: AgentRegistry,
    storage: Arc<dyn PersistenceGateway>,
    correlator: ReplyCorrelator,
}

impl DispatchScheduler {
    pub fn new(
        registry: AgentRegistry,
        storage: Arc<dyn PersistenceGateway>,
        correlator: ReplyCorrelator,
    ) -> Self {
        DispatchScheduler {
            registry,
            storage,
            correlator,
        }
    }

    pub async fn exe_command(
        &self,
        entity: &str,
        os: Option<&str>,
        command: &str,
        timeout_secs: u64,
    ) -> Result<Vec<TargetResult>, GatewayError> {
        self.dispatch(entity, os, "exeCommand", command, timeout_secs, |cmd_id| {
            Message::ExeCommand {
                command: command.to_owned(),
                timeout: timeout_secs,
                cmd_id,
            }
        })
        .await
    }

    pub async fn exe_script(
        &self,
        entity: &str,
        os: Option<&str>,
        script_path: &str,
        script_type: ScriptType,
        script_source: &str,
        timeout_secs: u64,
    ) -> Result<Vec<TargetResult>, GatewayError> {
        self.dispatch(
            entity,
            os,
            "exeScript",
            script_path,
            timeout_secs,
            |cmd_id| Message::ExeScript {
                script: script_path.to_owned(),
                script_type,
                timeout: timeout_secs,
                cmd_id,
                command: script_source.to_owned(),
            },
        )
        .await
    }

    async fn dispatch(
        &self,
        entity: &str,
        os: Option<&str>,
        event: &str,
        event_detail: &str,
        _timeout_secs: u64,
        build_message: impl Fn(i64) -> Message,
    ) -> Result<Vec<TargetResult>, GatewayError> {
        let targets = self.registry.targets(entity, os).await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let last_row_id = self.storage.get_last_row_id()?;
        self.storage.add_agent_events(&targets, event, event_detail)?;
        self.correlator.notify_new_batch().await;

        let mut results = Vec::with_capacity(targets.len());
        for (offset, id) in targets.iter().enumerate() {
            let cmd_id = last_row_id + 1 + offset as i64;
            let message = build_message(cmd_id);
            let outcome = match self.registry.get(id).await {
                Some(agent) => {
                    match write_with_timeout(&agent.writer, message, DISPATCH_WRITE_TIMEOUT).await
                    {
                        Ok(()) => DispatchOutcome::Success,
                        Err(e) => DispatchOutcome::Failed(e.to_string()),
                    }
                }
                None => DispatchOutcome::Failed("agent is no longer connected".to_owned()),
            };
            results.push(TargetResult {
                id: id.clone(),
                outcome,
            });
        }
        Ok(results)
    }
}
