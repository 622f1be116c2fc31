//! Agent client state machine:
//! `START -> TCP_CONNECT -> TLS_HANDSHAKE -> IDENTIFY -> RUN -> RECONNECT -> ...`
//!
//! A single task owns the connection outright; unlike the commander side
//! there is no concurrent writer to serialize against, so `Framer` is used
//! unsplit here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tracing::{info, warn};

use botfleet_protocol::{Framer, FramerError, Message};

use crate::config::AgentConfig;
use crate::exec;
use crate::identity;

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Tls(rustls::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "I/O error: {e}"),
            ClientError::Tls(e) => write!(f, "TLS error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<rustls::Error> for ClientError {
    fn from(e: rustls::Error) -> Self {
        ClientError::Tls(e)
    }
}

fn build_client_tls_config(ca_cert_path: &str) -> Result<ClientConfig, ClientError> {
    let ca_der = CertificateDer::from(std::fs::read(ca_cert_path)?);
    let mut roots = RootCertStore::empty();
    roots.add(ca_der).map_err(ClientError::Tls)?;
    Ok(ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

pub struct AgentClient {
    config: AgentConfig,
    identity_path: PathBuf,
}

impl AgentClient {
    pub fn new(config: AgentConfig, identity_path: PathBuf) -> Self {
        AgentClient {
            config,
            identity_path,
        }
    }

    /// Runs the reconnect/handshake/keepalive/dispatch loop forever.
    pub async fn run(self) -> Result<(), ClientError> {
        let tls_config = build_client_tls_config(&self.config.ca_cert_path)?;
        let connector = TlsConnector::from(Arc::new(tls_config));
        let local_hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_owned());
        let os = os_tag();

        let mut reconnect_count: u32 = 0;
        loop {
            match self.connect_and_identify(&connector, &local_hostname, &os).await {
                Ok(framer) => {
                    reconnect_count = 0;
                    self.run_identified(framer).await;
                }
                Err(e) => warn!(error = %e, "failed to connect/identify with commander"),
            }

            reconnect_count = (reconnect_count + 1).min(self.config.max_reconn);
            let delay = 2u64.saturating_pow(reconnect_count);
            warn!(delay_secs = delay, "reconnecting to commander");
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn connect_and_identify(
        &self,
        connector: &TlsConnector,
        hostname: &str,
        os: &str,
    ) -> Result<Framer<TlsStream<TcpStream>>, ClientError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let tcp = TcpStream::connect(&addr).await?;

        let server_name = ServerName::try_from("localhost")
            .map_err(|e| ClientError::Tls(rustls::Error::General(e.to_string())))?;
        let tls = connector.connect(server_name, tcp).await?;
        let mut framer = Framer::with_capacity(tls, self.config.conn_buff);

        let uuid = identity::load_or_create(&self.identity_path)?;
        framer
            .write_frame(&Message::BotHostInfo {
                uuid: uuid.clone(),
                hostname: hostname.to_owned(),
                os: os.to_owned(),
            })
            .await
            .map_err(framer_to_client_error)?;

        let recv_timeout = Duration::from_secs(self.config.recv_timeout_secs);
        let frames = framer
            .read_frames(recv_timeout)
            .await
            .map_err(framer_to_client_error)?;
        if !frames.iter().any(|f| matches!(f, Message::BotHostInfoReply {})) {
            return Err(ClientError::Io(std::io::Error::other(
                "commander did not reply with botHostInfoReply",
            )));
        }

        info!(%uuid, %addr, "identified with commander");
        Ok(framer)
    }

    /// Reads and dispatches frames until the connection fails; returns on
    /// any framing error so the caller proceeds to `RECONNECT`.
    async fn run_identified(&self, mut framer: Framer<TlsStream<TcpStream>>) {
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let recv_timeout = Duration::from_secs(self.config.recv_timeout_secs);
        let hello_freq = Duration::from_secs(self.config.hello_freq_secs);
        let mut last_online = Instant::now();

        loop {
            if last_online.elapsed() > idle_timeout {
                if framer.write_frame(&Message::BotHello {}).await.is_err() {
                    warn!("failed to send keepalive, reconnecting");
                    return;
                }
                tokio::time::sleep(hello_freq).await;
                continue;
            }

            match framer.read_frames(recv_timeout).await {
                Ok(frames) => {
                    for frame in frames {
                        if !self.dispatch(&mut framer, frame, &mut last_online).await {
                            return;
                        }
                    }
                }
                Err(FramerError::Timeout) => continue,
                Err(e) => {
                    warn!(error = %e, "lost connection to commander, reconnecting");
                    return;
                }
            }
        }
    }

    /// Handles one inbound frame. Returns `false` if the session should be
    /// torn down (reply write failure).
    async fn dispatch(
        &self,
        framer: &mut Framer<TlsStream<TcpStream>>,
        frame: Message,
        last_online: &mut Instant,
    ) -> bool {
        match frame {
            Message::BotHostInfoReply {} | Message::BotHelloReply {} => {
                *last_online = Instant::now();
                true
            }
            Message::ExeCommand {
                command, timeout, cmd_id,
            } => {
                let (result, exit_code) = exec::execute_command(&command, timeout).await;
                *last_online = Instant::now();
                reply(
                    framer,
                    Message::ExeCommandReply {
                        command,
                        cmd_id,
                        result,
                        exit_code,
                    },
                )
                .await
            }
            Message::ExeScript {
                script,
                script_type,
                timeout,
                cmd_id,
                command,
            } => {
                let (result, exit_code) = exec::execute_script(script_type, &command, timeout).await;
                *last_online = Instant::now();
                reply(
                    framer,
                    Message::ExeScriptReply {
                        command: script,
                        cmd_id,
                        result,
                        exit_code,
                    },
                )
                .await
            }
            other => {
                warn!(?other, "received unexpected message from commander, ignoring");
                true
            }
        }
    }
}

async fn reply(framer: &mut Framer<TlsStream<TcpStream>>, message: Message) -> bool {
    if let Err(e) = framer.write_frame(&message).await {
        warn!(error = %e, "failed to send reply to commander");
        return false;
    }
    true
}

fn framer_to_client_error(e: FramerError) -> ClientError {
    ClientError::Io(std::io::Error::other(e.to_string()))
}

/// Operating-system tag reported to the commander, restricted to the three
/// values the registry/HTTP filters understand.
fn os_tag() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        other => other,
    }
}
