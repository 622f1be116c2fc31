//! Shared harness for the root integration tests: spins up a real commander
//! (TLS agent listener + HTTP control plane) on loopback with an in-memory
//! tempdir for PKI material and the SQLite store, and helpers to point an
//! agent client at it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use botfleet_agent::client::AgentClient;
use botfleet_agent::config::AgentConfig;
use botfleet_commander::pki::{CertificateSource, DevCertificateSource};
use botfleet_commander::registry::AgentRegistry;
use botfleet_commander::scheduler::DispatchScheduler;
use botfleet_commander::session::run_session;
use botfleet_commander::state::AppState;
use botfleet_commander::{http, ReplyCorrelator};
use botfleet_storage::{PersistenceGateway, SqliteGateway};

pub struct Commander {
    pub core_addr: SocketAddr,
    pub api_base: String,
    pub state: AppState,
    tempdir: tempfile::TempDir,
    accept_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
}

impl Commander {
    pub async fn start() -> Self {
        Self::start_with(Duration::from_secs(120), Duration::from_millis(50)).await
    }

    pub async fn start_with(offline_timeout: Duration, resp_wait_window: Duration) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let pki = DevCertificateSource::bootstrap(tempdir.path()).expect("pki bootstrap");

        let db_path = tempdir.path().join("commander.db");
        let storage: Arc<dyn PersistenceGateway> = Arc::new(SqliteGateway::open(db_path));
        storage.init().expect("db init");

        let registry = AgentRegistry::new();
        let correlator = ReplyCorrelator::new(storage.clone(), resp_wait_window);
        let scheduler = DispatchScheduler::new(registry.clone(), storage.clone(), correlator.clone());
        let state = AppState::new(registry.clone(), storage.clone(), scheduler, correlator.clone(), 15);

        let core_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind core");
        let core_addr = core_listener.local_addr().expect("core addr");
        let tls_config = pki.server_tls_config().expect("server tls config");
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let accept_registry = registry.clone();
        let accept_storage = storage.clone();
        let accept_correlator = correlator.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match core_listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let acceptor = acceptor.clone();
                let registry = accept_registry.clone();
                let storage = accept_storage.clone();
                let correlator = accept_correlator.clone();
                tokio::spawn(async move {
                    if let Ok(tls_stream) = acceptor.accept(stream).await {
                        run_session(tls_stream, peer_addr, registry, storage, correlator, offline_timeout)
                            .await;
                    }
                });
            }
        });

        let api_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind api");
        let api_addr = api_listener.local_addr().expect("api addr");
        let router = http::build_router(state.clone());
        let http_task = tokio::spawn(async move {
            let _ = axum::serve(api_listener, router).await;
        });

        Commander {
            core_addr,
            api_base: format!("http://{api_addr}"),
            state,
            tempdir,
            accept_task,
            http_task,
        }
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.tempdir.path().join("pki").join("ca.der")
    }

    pub fn agent_config(&self, max_reconn: u32) -> AgentConfig {
        AgentConfig {
            host: self.core_addr.ip().to_string(),
            port: self.core_addr.port(),
            max_reconn,
            conn_buff: 8192,
            idle_timeout_secs: 60,
            recv_timeout_secs: 5,
            hello_freq_secs: 1,
            ca_cert_path: self.ca_cert_path().to_string_lossy().into_owned(),
        }
    }
}

impl Drop for Commander {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.http_task.abort();
    }
}

/// Spawns an agent client against `commander` with a fresh identity
/// directory, returning the task handle and the assigned identity.
pub async fn spawn_agent(
    commander: &Commander,
    identity_dir: &std::path::Path,
    max_reconn: u32,
) -> (JoinHandle<()>, String) {
    let cfg = commander.agent_config(max_reconn);
    let identity_path = identity_dir.join("agent.id");
    let id = botfleet_agent::identity::load_or_create(&identity_path).expect("identity");
    let client = AgentClient::new(cfg, identity_path);
    let handle = tokio::spawn(async move {
        let _ = client.run().await;
    });
    (handle, id)
}

/// Polls an async `condition` until it returns `true` or `timeout` elapses.
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
