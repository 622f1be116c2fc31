//! Record types returned by the persistence gateway.

/// A row of `BotAgents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub id: String,
    pub hostname: String,
    pub address: String,
    pub os: String,
}

/// A row of `CommandHistory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub count: i64,
    pub time: String,
    pub id: String,
    pub event: String,
    pub event_detail: String,
    pub response: Option<String>,
    pub exit_code: Option<i64>,
}

/// One reply waiting to be joined back onto its `CommandHistory` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub cmd_id: i64,
    pub result: String,
    pub exit_code: Option<i64>,
}

/// Error type for gateway operations.
#[derive(Debug)]
pub enum GatewayError {
    Sqlite(rusqlite::Error),
    NotFound(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            GatewayError::NotFound(s) => write!(f, "not found: {s}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Sqlite(e)
    }
}
