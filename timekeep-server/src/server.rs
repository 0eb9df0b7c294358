use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use timekeep_core::client::frame_codec;
use timekeep_core::ipc::{TimekeepRequest, TimekeepResponse};
use timekeep_core::{Client, TimekeepError};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::lifecycle::{Call, Reply};
use crate::notify::NotificationHub;

const CHECK_TIMEOUT: Duration = Duration::from_secs(1);

type Writer = FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>;

/// Lock file guarding `socket_path`; held by the serving instance.
pub fn lock_path(socket_path: &str) -> String {
    format!("{}.lock", socket_path)
}

/// Take the exclusive instance lock without blocking. `None` means another
/// process holds it.
pub fn acquire_instance_lock(socket_path: &str) -> anyhow::Result<Option<Flock<File>>> {
    let path = lock_path(socket_path);
    ensure_parent(Path::new(&path))?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;
    match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(lock) => Ok(Some(lock)),
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
        Err((_, errno)) => Err(anyhow::anyhow!("Failed to lock {}: {}", path, errno)),
    }
}

/// True unless `socket_path` is provably dead. Only a missing file or a
/// refused connection counts as stale; an instance that accepts but does not
/// answer in time is busy, not gone.
pub async fn instance_running(socket_path: &str) -> bool {
    let connect = tokio::time::timeout(CHECK_TIMEOUT, Client::connect(socket_path)).await;
    let mut client = match connect {
        Ok(Ok(client)) => client,
        Ok(Err(e)) if is_stale(&e) => {
            tracing::debug!("No live instance at {}: {}", socket_path, e);
            return false;
        }
        Ok(Err(e)) => {
            tracing::warn!("Cannot check {}: {}; assuming it is in use", socket_path, e);
            return true;
        }
        Err(_) => {
            tracing::warn!("Connecting to {} timed out; assuming it is in use", socket_path);
            return true;
        }
    };

    match tokio::time::timeout(CHECK_TIMEOUT, client.call(&TimekeepRequest::Ping)).await {
        Ok(Ok(response)) => tracing::debug!("Instance at {} answered ({})", socket_path, response.version),
        Ok(Err(e)) => tracing::debug!("Instance at {} accepted but failed the ping: {}", socket_path, e),
        Err(_) => tracing::warn!("Instance at {} is busy", socket_path),
    }
    true
}

fn is_stale(error: &TimekeepError) -> bool {
    matches!(
        error,
        TimekeepError::Io(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::NotFound)
    )
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Bind the service socket. Callers hold the instance lock and have checked
/// the old socket, so a leftover file here belongs to a dead instance.
pub fn bind(socket_path: &str) -> anyhow::Result<UnixListener> {
    let path = Path::new(socket_path);
    if path.exists() {
        tracing::info!("Removing stale socket {}", socket_path);
        std::fs::remove_file(path)?;
    }
    ensure_parent(path)?;
    Ok(UnixListener::bind(path)?)
}

/// Accept loop. Each connection decodes frames and forwards calls to the
/// service loop over `calls`; it never touches storage itself.
pub async fn run_unix_server(
    listener: UnixListener,
    calls: mpsc::Sender<Call>,
    hub: NotificationHub,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                tokio::spawn(handle_connection(stream, calls.clone(), hub.clone()));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }
    Ok(())
}

async fn handle_connection(stream: UnixStream, calls: mpsc::Sender<Call>, hub: NotificationHub) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, frame_codec());
    let mut framed_write = FramedWrite::new(write, frame_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(bytes_mut) => bytes_mut,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let request: TimekeepRequest = match rmp_serde::from_slice(&bytes_mut) {
            Ok(req) => req,
            Err(e) => {
                let resp = TimekeepResponse::err(format!("Deserialization error: {}", e));
                if let Err(se) = send_response(&mut framed_write, &resp).await {
                    tracing::error!("Failed to send error response: {}", se);
                    break;
                }
                continue;
            }
        };

        if matches!(request, TimekeepRequest::Subscribe) {
            let signals = hub.subscribe();
            if let Err(e) = send_response(&mut framed_write, &TimekeepResponse::ok(serde_json::Value::Null)).await {
                tracing::error!("Failed to confirm subscription: {}", e);
                break;
            }
            stream_signals(&mut framed_read, &mut framed_write, signals).await;
            break;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if calls.send(Call { request, reply: reply_tx }).await.is_err() {
            let resp = TimekeepResponse::err("service is shutting down");
            let _ = send_response(&mut framed_write, &resp).await;
            break;
        }
        let reply = match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => Reply::from(TimekeepResponse::err("service stopped before replying")),
        };

        let sent = send_response(&mut framed_write, &reply.response).await;
        if let Some(delivered) = reply.delivered {
            let _ = delivered.send(());
        }
        if let Err(e) = sent {
            tracing::error!("Failed to send response: {}", e);
            break;
        }
    }
}

/// Forward broadcasts until the client hangs up or the hub goes away.
async fn stream_signals<R>(
    framed_read: &mut FramedRead<R, LengthDelimitedCodec>,
    framed_write: &mut Writer,
    mut signals: broadcast::Receiver<timekeep_core::ipc::Signal>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    tracing::debug!("Client subscribed to signals");
    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Ok(signal) => {
                    if let Err(e) = send_response(framed_write, &TimekeepResponse::signal(signal)).await {
                        tracing::debug!("Subscriber went away: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Subscriber lagged, {} signals skipped", missed);
                }
                Err(RecvError::Closed) => break,
            },
            frame = framed_read.next() => match frame {
                Some(Ok(_)) => {
                    let resp = TimekeepResponse::err("subscribed connections accept no calls");
                    if send_response(framed_write, &resp).await.is_err() {
                        break;
                    }
                }
                Some(Err(_)) | None => break,
            },
        }
    }
}

async fn send_response(framed_write: &mut Writer, response: &TimekeepResponse) -> anyhow::Result<()> {
    let resp_bytes = rmp_serde::to_vec_named(response)?;
    framed_write.send(Bytes::from(resp_bytes)).await?;
    Ok(())
}
