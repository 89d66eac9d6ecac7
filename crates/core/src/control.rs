//! Control plane: the generation-activity counter consumed by the
//! health handler, and a local control surface the CLI uses for start/stop/ui/reload
//! without holding a connection.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared, atomic generation-activity counter.
#[derive(Default)]
pub struct ActivityCounter {
    count: AtomicU64,
}

impl ActivityCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_generation_start(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// The four idempotent control commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlCommand {
    Serve {
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        expose: Option<bool>,
    },
    Stop,
    Ui,
    ToolsReload,
}

/// In-process broadcast of control commands, fed by the local control socket and
/// consumed by the server lifecycle task. Shares a single `ActivityCounter`
/// instance with whatever is actually marking generation starts (the gateway's
/// request handlers) rather than owning a private one nobody ever increments.
#[derive(Clone)]
pub struct ControlPlane {
    activity: Arc<ActivityCounter>,
    tx: broadcast::Sender<ControlCommand>,
}

impl ControlPlane {
    pub fn new(activity: Arc<ActivityCounter>) -> Self {
        let (tx, _rx) = broadcast::channel(16);
        Self { activity, tx }
    }

    pub fn activity(&self) -> Arc<ActivityCounter> {
        self.activity.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlCommand> {
        self.tx.subscribe()
    }

    /// Publishes a command. All commands are idempotent; no-op if nobody is listening.
    pub fn dispatch(&self, command: ControlCommand) {
        let _ = self.tx.send(command);
    }
}

/// Unix-domain control socket carrying `ControlCommand`s as JSON lines.
#[cfg(unix)]
pub mod socket {
    use super::{ControlCommand, ControlPlane};
    use std::path::{Path, PathBuf};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;

    /// Default socket path: `~/.osaurus/control.sock`, overridable via `OSU_CONTROL_SOCKET`.
    pub fn default_socket_path() -> PathBuf {
        std::env::var("OSU_CONTROL_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".osaurus").join("control.sock"))
                    .unwrap_or_else(|| PathBuf::from("osaurus-control.sock"))
            })
    }

    /// Binds the control socket and forwards every parsed line to `plane` until the
    /// listener is dropped. Malformed lines are logged and ignored.
    pub async fn serve(path: &Path, plane: ControlPlane) -> std::io::Result<()> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let listener = UnixListener::bind(path)?;
        log::info!("control socket listening at {}", path.display());

        loop {
            let (stream, _addr) = listener.accept().await?;
            let plane = plane.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match serde_json::from_str::<ControlCommand>(&line) {
                        Ok(command) => plane.dispatch(command),
                        Err(e) => log::warn!("malformed control command: {}", e),
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_counter_starts_at_zero_and_increments() {
        let counter = ActivityCounter::new();
        assert_eq!(counter.total(), 0);
        counter.mark_generation_start();
        counter.mark_generation_start();
        assert_eq!(counter.total(), 2);
    }

    #[tokio::test]
    async fn control_plane_delivers_dispatched_commands() {
        let plane = ControlPlane::new(Arc::new(ActivityCounter::new()));
        let mut rx = plane.subscribe();
        plane.dispatch(ControlCommand::Stop);
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, ControlCommand::Stop));
    }

    #[test]
    fn control_plane_shares_activity_counter_with_its_owner() {
        let activity = Arc::new(ActivityCounter::new());
        let plane = ControlPlane::new(activity.clone());
        activity.mark_generation_start();
        assert_eq!(plane.activity().total(), 1);
    }

    #[test]
    fn control_command_roundtrips_as_json() {
        let cmd = ControlCommand::Serve {
            port: Some(1337),
            expose: Some(false),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: ControlCommand = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ControlCommand::Serve { port: Some(1337), .. }));
    }
}
