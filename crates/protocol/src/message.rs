//! Wire message types exchanged between an agent and the commander.
//!
//! All frames carry a top-level `message` field for discriminated
//! deserialization. The variant names here are Rust-cased; the wire
//! representation uses the fixed camelCase names from the external
//! protocol table, set explicitly per variant rather than derived.

use serde::{Deserialize, Serialize};

/// Script interpreter requested by an `ExeScript` dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Sh,
    Powershell,
    Python,
}

/// A single frame of the agent/commander protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message")]
pub enum Message {
    /// Agent -> Commander: initial registration, or re-registration after
    /// identity-relevant fields changed.
    #[serde(rename = "botHostInfo")]
    BotHostInfo {
        uuid: String,
        hostname: String,
        os: String,
    },

    /// Commander -> Agent: acknowledges `BotHostInfo`.
    #[serde(rename = "botHostInfoReply")]
    BotHostInfoReply {},

    /// Agent -> Commander: keepalive sent when otherwise idle.
    #[serde(rename = "botHello")]
    BotHello {},

    /// Commander -> Agent: acknowledges `BotHello`.
    #[serde(rename = "botHelloReply")]
    BotHelloReply {},

    /// Commander -> Agent: run a shell command.
    #[serde(rename = "exeCommand")]
    ExeCommand {
        command: String,
        timeout: u64,
        cmd_id: i64,
    },

    /// Agent -> Commander: result of an `ExeCommand`.
    #[serde(rename = "exeCommandReply")]
    ExeCommandReply {
        command: String,
        cmd_id: i64,
        result: String,
        exit_code: ExitCode,
    },

    /// Commander -> Agent: run an inline script via the named interpreter.
    #[serde(rename = "exeScript")]
    ExeScript {
        script: String,
        #[serde(rename = "type")]
        script_type: ScriptType,
        timeout: u64,
        cmd_id: i64,
        command: String,
    },

    /// Agent -> Commander: result of an `ExeScript`.
    #[serde(rename = "exeScriptReply")]
    ExeScriptReply {
        command: String,
        cmd_id: i64,
        result: String,
        exit_code: ExitCode,
    },
}

/// A process exit code, or `false` when the process never actually ran
/// (unknown executable) or was killed on timeout without a reportable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExitCode {
    Code(i32),
    None(bool),
}

impl ExitCode {
    pub fn code(value: i32) -> Self {
        ExitCode::Code(value)
    }

    pub fn none() -> Self {
        ExitCode::None(false)
    }
}
