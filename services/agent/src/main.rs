use std::path::Path;

use tracing::error;

use botfleet_agent::{client::AgentClient, config, identity};

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .init();

    let config_path = std::env::var("BOTFLEET_AGENT_CONFIG")
        .unwrap_or_else(|_| "/etc/botfleet/agent.ini".to_owned());
    let cfg = match config::load_config_from_path(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %config_path, "failed to load configuration");
            std::process::exit(5);
        }
    };

    let identity_path = identity::default_identity_path();
    let client = AgentClient::new(cfg, identity_path);

    // The client's own loop never returns; only an external signal or kill
    // stops the agent, so there is no graceful-shutdown path here.
    if let Err(e) = client.run().await {
        error!(error = %e, "agent client terminated unexpectedly");
        std::process::exit(1);
    }
}
