//! Agent library: configuration, local identity persistence, command/script
//! execution, and the commander connection state machine. `main.rs` wires
//! these together and runs the client forever.

pub mod client;
pub mod config;
pub mod exec;
pub mod identity;

pub use client::{AgentClient, ClientError};
pub use config::{AgentConfig, ConfigError};
