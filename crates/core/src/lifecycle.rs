//! Server lifecycle: a single-owner struct serializing start/stop/query
//! over a command channel, so the gateway can be started, stopped, and
//! started again without leaking a stale listener.

use crate::control::{ActivityCounter, ControlCommand, ControlPlane};
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// Running state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

struct Running {
    handle: JoinHandle<Result<()>>,
    shutdown_tx: oneshot::Sender<()>,
    port: u16,
}

/// Owns at most one listening socket for its lifetime. `start`/`stop` are the only
/// mutators; both take the internal lock so concurrent callers serialize cleanly.
pub struct Server {
    state: Mutex<RunState>,
    running: Mutex<Option<Running>>,
    control: ControlPlane,
}

impl Server {
    /// Owns a fresh, private activity counter. Use `with_activity` when the
    /// same counter must also be reachable from request handlers.
    pub fn new() -> Self {
        Self::with_activity(Arc::new(ActivityCounter::new()))
    }

    pub fn with_activity(activity: Arc<ActivityCounter>) -> Self {
        Self {
            state: Mutex::new(RunState::Stopped),
            running: Mutex::new(None),
            control: ControlPlane::new(activity),
        }
    }

    pub fn control_plane(&self) -> ControlPlane {
        self.control.clone()
    }

    pub fn activity(&self) -> Arc<ActivityCounter> {
        self.control.activity()
    }

    pub async fn state(&self) -> RunState {
        *self.state.lock().await
    }

    /// Starts the server if not already running. `build_router`
    /// is called once per start so a fresh `Router` (carrying its own state, e.g. a
    /// resolved backend) backs each listen.
    pub async fn start(&self, host: &str, port: u16, router: Router) -> Result<u16> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            log::debug!("start requested while already running; no-op");
            return Ok(running.as_ref().unwrap().port);
        }

        *self.state.lock().await = RunState::Starting;

        let bind_addr = format!("{host}:{port}");
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("binding to {bind_addr}"))?;
        let bound_port = listener
            .local_addr()
            .with_context(|| "reading bound local address")?
            .port();
        log::info!("gateway listening on {}", bind_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .context("gateway server exited")?;
            Ok(())
        });

        *running = Some(Running {
            handle,
            shutdown_tx,
            port: bound_port,
        });
        *self.state.lock().await = RunState::Running;
        Ok(bound_port)
    }

    /// Graceful stop: signal the listener to close, await the accept loop's
    /// exit, then return to `Stopped`. A further `start` is permitted afterward.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(running_server) = running.take() else {
            log::debug!("stop requested while not running; no-op");
            return Ok(());
        };

        *self.state.lock().await = RunState::Stopping;
        let _ = running_server.shutdown_tx.send(());
        match running_server.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *self.state.lock().await = RunState::Error;
                return Err(e);
            }
            Err(e) => {
                *self.state.lock().await = RunState::Error;
                return Err(e.into());
            }
        }
        *self.state.lock().await = RunState::Stopped;
        Ok(())
    }

    /// Drives control commands (`stop`, `toolsReload`, ...) received over the
    /// control plane into lifecycle actions, until the plane is dropped.
    pub async fn run_control_loop(self: Arc<Self>) {
        let mut rx = self.control.subscribe();
        while let Ok(command) = rx.recv().await {
            match command {
                ControlCommand::Stop => {
                    if let Err(e) = self.stop().await {
                        log::warn!("graceful stop failed: {}", e);
                    }
                }
                ControlCommand::Serve { .. } => {
                    log::debug!("serve command received while server already owns its lifecycle");
                }
                ControlCommand::Ui | ControlCommand::ToolsReload => {
                    log::debug!("control command {:?} has no in-process effect here", command);
                }
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[tokio::test]
    async fn start_stop_start_returns_to_running() {
        let server = Server::new();
        let router = Router::new().route("/", get(|| async { "ok" }));
        let port = server.start("127.0.0.1", 0, router).await.unwrap();
        assert!(port > 0);
        assert_eq!(server.state().await, RunState::Running);

        server.stop().await.unwrap();
        assert_eq!(server.state().await, RunState::Stopped);

        let router2 = Router::new().route("/", get(|| async { "ok" }));
        let port2 = server.start("127.0.0.1", 0, router2).await.unwrap();
        assert!(port2 > 0);
        assert_eq!(server.state().await, RunState::Running);
        server.stop().await.unwrap();
    }

    #[test]
    fn with_activity_shares_the_given_counter_with_the_control_plane() {
        let activity = Arc::new(ActivityCounter::new());
        let server = Server::with_activity(activity.clone());
        activity.mark_generation_start();
        assert_eq!(server.activity().total(), 1);
        assert_eq!(server.control_plane().activity().total(), 1);
    }

    #[tokio::test]
    async fn second_start_while_running_is_a_no_op() {
        let server = Server::new();
        let router = Router::new().route("/", get(|| async { "ok" }));
        let port = server.start("127.0.0.1", 0, router).await.unwrap();

        let router2 = Router::new().route("/", get(|| async { "ok" }));
        let port2 = server.start("127.0.0.1", 0, router2).await.unwrap();
        assert_eq!(port, port2);
        server.stop().await.unwrap();
    }
}
