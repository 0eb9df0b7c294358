//! Service lifecycle: `Starting -> Running -> Stopping`.
//!
//! Starting takes an exclusive lock next to the socket and backs off silently
//! if another instance holds it or still answers on the socket. Running owns
//! the lock and the only dispatcher loop: calls, watch events and the
//! interrupt signal are handled one at a time, each call to completion.

use nix::fcntl::Flock;
use std::fs::File;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use timekeep_core::config::ServiceConfig;
use timekeep_core::ipc::{TimekeepRequest, TimekeepResponse};
use timekeep_core::storage::Storage;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::facade::StorageFacade;
use crate::watcher::{self, WatchEvent};
use crate::{router, server};

const CALL_QUEUE: usize = 64;
const QUIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    ExecutableModified(PathBuf),
    Interrupted,
    Disconnected,
}

/// A decoded call waiting for the service loop.
pub struct Call {
    pub request: TimekeepRequest,
    pub reply: oneshot::Sender<Reply>,
}

/// `delivered` is signalled by the connection once the response is written.
pub struct Reply {
    pub response: TimekeepResponse,
    pub delivered: Option<oneshot::Sender<()>>,
}

impl From<TimekeepResponse> for Reply {
    fn from(response: TimekeepResponse) -> Self {
        Self {
            response,
            delivered: None,
        }
    }
}

pub struct ServiceLifecycle {
    config: ServiceConfig,
    state: watch::Sender<LifecycleState>,
}

impl ServiceLifecycle {
    pub fn new(config: ServiceConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self { config, state }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Follows the state through `Running` and `Stopping`, after this handle
    /// has been consumed by [`ServiceLifecycle::start`].
    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Acquire the service name. `None` means another instance already holds
    /// it and this process should exit without side effects.
    pub async fn start(self) -> anyhow::Result<Option<RunningService>> {
        let socket_path = self.config.socket_path();
        let Some(instance_lock) = server::acquire_instance_lock(&socket_path)? else {
            tracing::info!(
                "Another instance holds {}",
                server::lock_path(&socket_path)
            );
            return Ok(None);
        };
        if server::instance_running(&socket_path).await {
            tracing::info!("Another instance is already serving {}", socket_path);
            return Ok(None);
        }

        let listener = server::bind(&socket_path)?;
        tracing::info!("IPC Server listening on {}", socket_path);
        self.state.send_replace(LifecycleState::Running);
        Ok(Some(RunningService {
            config: self.config,
            socket_path,
            listener,
            state: self.state,
            instance_lock,
        }))
    }
}

pub struct RunningService {
    config: ServiceConfig,
    socket_path: String,
    listener: UnixListener,
    state: watch::Sender<LifecycleState>,
    instance_lock: Flock<File>,
}

impl RunningService {
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn watch_target(config: &ServiceConfig) -> Option<PathBuf> {
        if !config.watch_executable {
            return None;
        }
        match &config.watch_path {
            Some(path) => Some(PathBuf::from(shellexpand::tilde(path).into_owned())),
            None => match std::env::current_exe() {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Cannot locate own executable: {}", e);
                    None
                }
            },
        }
    }

    /// Publish the RPC surface and run until Quit, a settled change to the
    /// executable, or `shutdown` resolves.
    pub async fn serve<S, F>(self, facade: StorageFacade<S>, shutdown: F) -> anyhow::Result<StopReason>
    where
        S: Storage,
        F: Future<Output = ()>,
    {
        let RunningService {
            config,
            socket_path,
            listener,
            state,
            instance_lock,
        } = self;

        let (calls_tx, mut calls) = mpsc::channel::<Call>(CALL_QUEUE);
        let (stop_tx, _) = broadcast::channel::<()>(1);
        let server = tokio::spawn(server::run_unix_server(
            listener,
            calls_tx,
            facade.hub().clone(),
            stop_tx.subscribe(),
        ));

        let (events_tx, mut events) = mpsc::channel::<WatchEvent>(1);
        let watcher = Self::watch_target(&config).and_then(|path| {
            watcher::spawn_executable_watcher(
                path,
                Duration::from_millis(config.watch_interval_ms),
                events_tx.clone(),
            )
        });

        tokio::pin!(shutdown);
        tracing::info!("Service running");

        let reason = loop {
            tokio::select! {
                call = calls.recv() => match call {
                    Some(call) => {
                        if let Some(reason) = handle_call(call, &facade).await {
                            break reason;
                        }
                    }
                    None => break StopReason::Disconnected,
                },
                Some(event) = events.recv() => match event {
                    WatchEvent::ExecutableModified(path) => {
                        println!("Service file {} changed, quitting", path.display());
                        break StopReason::ExecutableModified(path);
                    }
                },
                _ = &mut shutdown => break StopReason::Interrupted,
            }
        };

        state.send_replace(LifecycleState::Stopping);
        tracing::info!("Service stopping: {:?}", reason);

        let _ = stop_tx.send(());
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        drop(events_tx);
        match server.await {
            Ok(Err(e)) => tracing::warn!("IPC server ended with error: {}", e),
            Err(e) => tracing::warn!("IPC server task failed: {}", e),
            Ok(Ok(())) => {}
        }

        if std::path::Path::new(&socket_path).exists() {
            std::fs::remove_file(&socket_path)?;
        }
        drop(instance_lock);
        Ok(reason)
    }
}

async fn handle_call<S: Storage>(call: Call, facade: &StorageFacade<S>) -> Option<StopReason> {
    if matches!(call.request, TimekeepRequest::Quit) {
        let (delivered_tx, delivered_rx) = oneshot::channel();
        let reply = Reply {
            response: TimekeepResponse::ok(serde_json::Value::Null),
            delivered: Some(delivered_tx),
        };
        if call.reply.send(reply).is_ok() {
            let _ = tokio::time::timeout(QUIT_FLUSH_TIMEOUT, delivered_rx).await;
        }
        return Some(StopReason::Quit);
    }

    let response = router::handle_request(call.request, facade).await;
    let _ = call.reply.send(Reply::from(response));
    None
}
