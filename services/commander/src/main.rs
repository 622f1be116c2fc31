use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use botfleet_commander::correlator::ReplyCorrelator;
use botfleet_commander::pki::DevCertificateSource;
use botfleet_commander::registry::AgentRegistry;
use botfleet_commander::scheduler::DispatchScheduler;
use botfleet_commander::session::run_session;
use botfleet_commander::state::AppState;
use botfleet_commander::{http, CertificateSource};
use botfleet_storage::{PersistenceGateway, SqliteGateway};

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .init();

    let config_path = std::env::var("BOTFLEET_COMMANDER_CONFIG")
        .unwrap_or_else(|_| "/etc/botfleet/commander.ini".to_owned());
    let config = match botfleet_commander::config::load_config_from_path(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %config_path, "failed to load configuration");
            std::process::exit(5);
        }
    };

    let base_path = Path::new(&config.core.base_path);
    let pki = match DevCertificateSource::bootstrap(base_path) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to bootstrap PKI material");
            std::process::exit(9);
        }
    };

    let db_path = base_path.join("db").join("commander.db");
    let storage: Arc<dyn PersistenceGateway> = Arc::new(SqliteGateway::open(db_path));
    if let Err(e) = storage.init() {
        error!(error = %e, "failed to initialize persistence gateway");
        std::process::exit(5);
    }

    let registry = AgentRegistry::new();
    let correlator = ReplyCorrelator::new(
        storage.clone(),
        Duration::from_secs(config.core.resp_wait_window_secs),
    );
    let scheduler = DispatchScheduler::new(registry.clone(), storage.clone(), correlator.clone());
    let state = AppState::new(
        registry.clone(),
        storage.clone(),
        scheduler,
        correlator.clone(),
        config.core.cmd_timeout_secs,
    );

    let offline_timeout = Duration::from_secs(config.core.offline_timeout_secs);
    let core_addr = format!("{}:{}", config.core.host, config.core.port);
    let server_tls_config = match pki.server_tls_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build TLS server configuration");
            std::process::exit(9);
        }
    };
    let acceptor = TlsAcceptor::from(Arc::new(server_tls_config));
    let core_listener = match tokio::net::TcpListener::bind(&core_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %core_addr, "failed to bind agent-facing listener");
            std::process::exit(5);
        }
    };
    info!(addr = %core_addr, "agent-facing listener bound");

    let api_tls_config = match pki.api_tls_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to build API TLS configuration");
            std::process::exit(9);
        }
    };
    let api_addr: SocketAddr = match format!("{}:{}", config.api.host, config.api.port).parse() {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "invalid API listener address");
            std::process::exit(5);
        }
    };
    let router = http::build_router(state);
    let api_handle = Handle::new();
    let api_server = axum_server::bind_rustls(
        api_addr,
        RustlsConfig::from_config(Arc::new(api_tls_config)),
    )
    .handle(api_handle.clone())
    .serve(router.into_make_service());
    info!(addr = %api_addr, "HTTPS control plane listening");
    tokio::pin!(api_server);

    let mut sessions: JoinSet<()> = JoinSet::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let shutdown_requested = loop {
        tokio::select! {
            biased;
            () = &mut shutdown => break true,
            accepted = core_listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed on agent-facing listener");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let registry = registry.clone();
                let storage = storage.clone();
                let correlator = correlator.clone();
                sessions.spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            run_session(tls_stream, peer_addr, registry, storage, correlator, offline_timeout)
                                .await;
                        }
                        Err(e) => warn!(error = %e, %peer_addr, "TLS handshake failed"),
                    }
                });
            }
            result = &mut api_server => {
                if let Err(e) = result {
                    error!(error = %e, "HTTPS control plane exited unexpectedly");
                }
                break false;
            }
        }
    };

    if shutdown_requested {
        info!("shutdown requested, draining in-flight work");
        api_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        let _ = (&mut api_server).await;
    }

    for id in registry.live_ids().await {
        registry.drop_session(&id).await;
    }
    sessions.shutdown().await;

    info!("commander shut down gracefully");
}

/// Waits for SIGINT, SIGTERM, or SIGHUP and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    #[cfg(unix)]
    let hangup = async {
        signal::unix::signal(signal::unix::SignalKind::hangup())
            .expect("failed to install SIGHUP handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
        _ = hangup => { info!("received SIGHUP, shutting down"); },
    }
}
