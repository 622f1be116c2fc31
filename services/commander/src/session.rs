//! Per-connection agent session: `AWAIT_HELLO -> IDENTIFIED -> CLOSED`.
//!
//! The reader loop and the writer run on separate tasks so a slow or
//! disconnected agent can never block a dispatch write meant for another
//! agent; all writes to this session are serialized through the mailbox
//! the writer task drains.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use botfleet_protocol::{ExitCode, Framer, Message};
use botfleet_storage::{PendingReply, PersistenceGateway};

use crate::correlator::ReplyCorrelator;
use crate::registry::{write_with_timeout, AgentRegistry, WriteRequest};

/// Deadline for the handshake/keepalive acks this module itself sends;
/// dispatch writes from the scheduler use their own, longer deadline.
const REPLY_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run_session<S>(
    stream: S,
    peer_addr: SocketAddr,
    registry: AgentRegistry,
    storage: Arc<dyn PersistenceGateway>,
    correlator: ReplyCorrelator,
    offline_timeout: Duration,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = Framer::new(stream).split();
    let (write_tx, mut write_rx) = mpsc::channel::<WriteRequest>(32);

    let writer_task = tokio::spawn(async move {
        while let Some(req) = write_rx.recv().await {
            let result = writer
                .write_frame(&req.message)
                .await
                .map_err(|e| crate::registry::WriteError::Io(e.to_string()));
            let _ = req.ack.send(result);
        }
    });

    let id = match await_hello(&mut reader, &write_tx, peer_addr, &registry, &storage, offline_timeout).await {
        Some(id) => id,
        None => {
            writer_task.abort();
            return;
        }
    };

    info!(agent_id = %id, %peer_addr, "agent identified");
    run_identified(&mut reader, &write_tx, &id, &correlator, offline_timeout).await;

    registry.drop_session(&id).await;
    drop(write_tx);
    let _ = writer_task.await;
    info!(agent_id = %id, "agent session closed");
}

async fn await_hello<R>(
    reader: &mut botfleet_protocol::FrameReader<R>,
    write_tx: &mpsc::Sender<WriteRequest>,
    peer_addr: SocketAddr,
    registry: &AgentRegistry,
    storage: &Arc<dyn PersistenceGateway>,
    offline_timeout: Duration,
) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut frames = reader.read_frames(offline_timeout).await.ok()?;
    if frames.len() != 1 {
        return None;
    }
    let (uuid, hostname, os) = match frames.remove(0) {
        Message::BotHostInfo { uuid, hostname, os } => (uuid, hostname, os),
        _ => return None,
    };

    let address = peer_addr.to_string();
    if let Err(e) = storage.upsert_agent(&uuid, &hostname, &address, &os) {
        warn!(agent_id = %uuid, error = %e, "failed to persist agent registration");
        return None;
    }
    registry
        .upsert(&uuid, &hostname, &address, &os, write_tx.clone())
        .await;

    if write_with_timeout(write_tx, Message::BotHostInfoReply {}, REPLY_WRITE_TIMEOUT)
        .await
        .is_err()
    {
        return None;
    }

    Some(uuid)
}

async fn run_identified<R>(
    reader: &mut botfleet_protocol::FrameReader<R>,
    write_tx: &mpsc::Sender<WriteRequest>,
    id: &str,
    correlator: &ReplyCorrelator,
    offline_timeout: Duration,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        let frames = match reader.read_frames(offline_timeout).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!(agent_id = %id, error = %e, "agent session ending");
                return;
            }
        };

        for frame in frames {
            match frame {
                Message::BotHello {} => {
                    if write_with_timeout(write_tx, Message::BotHelloReply {}, REPLY_WRITE_TIMEOUT)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Message::ExeCommandReply {
                    cmd_id,
                    result,
                    exit_code,
                    ..
                }
                | Message::ExeScriptReply {
                    cmd_id,
                    result,
                    exit_code,
                    ..
                } => {
                    correlator
                        .enqueue(PendingReply {
                            cmd_id,
                            result,
                            exit_code: exit_code_to_i64(exit_code),
                        })
                        .await;
                }
                other => {
                    warn!(agent_id = %id, ?other, "unexpected message from agent");
                    return;
                }
            }
        }
    }
}

fn exit_code_to_i64(code: ExitCode) -> Option<i64> {
    match code {
        ExitCode::Code(c) => Some(i64::from(c)),
        ExitCode::None(_) => None,
    }
}
