//! Shared glue used by the integration test suites under `tests/integration/`.
//!
//! The actual runtime logic lives in `botfleet-protocol`, `botfleet-storage`,
//! `botfleet-commander`, and `botfleet-agent`; this crate just re-exports the
//! pieces integration tests need so they don't have to depend on the service
//! binaries directly.

pub use botfleet_protocol as protocol;
pub use botfleet_storage as storage;
