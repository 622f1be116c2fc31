//! Commander library: configuration, live-agent registry, per-connection
//! session state machine, dispatch scheduling, reply correlation, PKI
//! bootstrap, and the HTTP control plane. `main.rs` wires these together
//! and owns the two listeners (agent-facing TLS, operator-facing HTTPS).

pub mod config;
pub mod correlator;
pub mod http;
pub mod pki;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod state;

pub use config::{CommanderConfig, ConfigError};
pub use correlator::ReplyCorrelator;
pub use pki::{CertificateSource, DevCertificateSource, PkiError};
pub use registry::AgentRegistry;
pub use scheduler::DispatchScheduler;
pub use state::AppState;
