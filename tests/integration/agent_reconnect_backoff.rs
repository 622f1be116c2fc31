//! S5 — reconnect backoff doubles each attempt and caps at `MAX_RECONN`.
//!
//! Runs under paused tokio time: real wall-clock work (the TCP connect and
//! immediately-failing TLS handshake) still happens, but the `sleep`s
//! between attempts advance virtually, so the test observes the full
//! `2,4,8,8` second cadence in milliseconds of real time.

#[path = "../support/mod.rs"]
mod support;

use std::time::Duration;

use botfleet_agent::client::AgentClient;
use botfleet_agent::config::AgentConfig;
use botfleet_commander::pki::DevCertificateSource;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A bare TCP listener that accepts every connection and closes it without
/// ever starting a TLS handshake, so every agent connect attempt fails at
/// the handshake step -- fast, and distinguishable from a real reply.
async fn spawn_refusing_listener(tx: mpsc::UnboundedSender<Instant>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                let _ = tx.send(Instant::now());
                drop(stream);
            }
        }
    });
    addr
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_double_and_cap_at_max_reconn() {
    let tempdir = tempfile::tempdir().unwrap();
    // Only needed so the agent has a DER file to build a `RootCertStore`
    // from; the listener below never gets far enough to present a cert.
    DevCertificateSource::bootstrap(tempdir.path()).unwrap();
    let ca_cert_path = tempdir.path().join("pki").join("ca.der");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let addr = spawn_refusing_listener(tx).await;

    let cfg = AgentConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        max_reconn: 3,
        conn_buff: 8192,
        idle_timeout_secs: 60,
        recv_timeout_secs: 5,
        hello_freq_secs: 1,
        ca_cert_path: ca_cert_path.to_string_lossy().into_owned(),
    };
    let identity_path = tempdir.path().join("agent.id");
    let client = AgentClient::new(cfg, identity_path);
    let _task = tokio::spawn(async move {
        let _ = client.run().await;
    });

    // Each `sleep` between reconnect attempts auto-advances paused time, so
    // waiting on the channel resolves as soon as the next attempt lands.
    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(rx.recv().await.expect("listener task died"));
    }

    let deltas: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();

    assert_eq!(deltas.len(), 4);
    assert_eq!(deltas[0], Duration::from_secs(2));
    assert_eq!(deltas[1], Duration::from_secs(4));
    assert_eq!(deltas[2], Duration::from_secs(8));
    assert_eq!(deltas[3], Duration::from_secs(8));
}
