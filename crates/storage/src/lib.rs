//! Durable agent inventory and command history backing dispatch
//! correlation. See [`PersistenceGateway`] for the storage-agnostic
//! interface and [`SqliteGateway`] for the embedded SQLite implementation.

mod gateway;
mod time;
mod types;

pub use gateway::{PersistenceGateway, SqliteGateway};
pub use types::{AgentRecord, EventRecord, GatewayError, PendingReply};
