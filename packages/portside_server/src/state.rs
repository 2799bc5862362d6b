//! Active-connection state for the panel. Connecting a history item
//! launches it as a supervised child process; disconnecting cancels it.
//! Every change is announced on the live channel so other open panels
//! refresh.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use portside_protocol::{Envelope, kind};

use crate::realtime::RealtimeHub;

/// Cancels the launched process when triggered.
pub struct LaunchHandle {
    cancel: CancellationToken,
}

impl LaunchHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// How connected items get launched. The panel state only needs a handle
/// it can cancel later.
pub trait ItemLauncher: Send + Sync + 'static {
    fn launch(&self, raw: &str) -> Result<LaunchHandle>;
}

/// Launches an item by re-invoking a binary with the item's recorded
/// arguments plus `--no-save`, so the run is not recorded again.
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl ItemLauncher for ProcessLauncher {
    fn launch(&self, raw: &str) -> Result<LaunchHandle> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(raw.split_whitespace())
            .arg("--no-save")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", self.program.display()))?;

        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        let raw = raw.to_string();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!(%raw, %status, "launched item exited"),
                    Err(err) => warn!(%raw, error = %err, "launched item lost"),
                },
                _ = guard.cancelled() => {
                    if let Err(err) = child.kill().await {
                        warn!(%raw, error = %err, "failed to kill launched item");
                    }
                }
            }
        });
        Ok(LaunchHandle::new(cancel))
    }
}

/// Launcher that runs nothing. For panels that only display state, and for
/// tests.
pub struct NoopLauncher;

impl ItemLauncher for NoopLauncher {
    fn launch(&self, _raw: &str) -> Result<LaunchHandle> {
        Ok(LaunchHandle::new(CancellationToken::new()))
    }
}

struct Entry {
    active: bool,
    handle: Option<LaunchHandle>,
}

/// Which history items are currently connected, and their process handles.
pub struct PanelState {
    launcher: Box<dyn ItemLauncher>,
    entries: Mutex<HashMap<String, Entry>>,
    hub: RealtimeHub,
}

impl PanelState {
    pub fn new(launcher: Box<dyn ItemLauncher>, hub: RealtimeHub) -> Self {
        Self {
            launcher,
            entries: Mutex::new(HashMap::new()),
            hub,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark the item active and launch it. The item shows as connected
    /// even when the launch fails; the failure is logged. Reconnecting an
    /// already-active item stops the previous launch first.
    pub fn connect(&self, raw: &str) {
        let handle = match self.launcher.launch(raw) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%raw, error = %err, "failed to launch history item");
                None
            }
        };
        {
            let mut entries = self.lock();
            let previous = entries.insert(
                raw.to_string(),
                Entry {
                    active: true,
                    handle,
                },
            );
            if let Some(Entry {
                handle: Some(previous),
                ..
            }) = previous
            {
                previous.stop();
            }
        }
        info!(%raw, "history item connected");
        self.announce();
    }

    /// Mark the item inactive and stop its launch, if one is running.
    /// Disconnecting an unknown item is a no-op apart from the broadcast.
    pub fn disconnect(&self, raw: &str) {
        {
            let mut entries = self.lock();
            if let Some(entry) = entries.get_mut(raw) {
                entry.active = false;
                if let Some(handle) = entry.handle.take() {
                    handle.stop();
                }
            }
        }
        info!(%raw, "history item disconnected");
        self.announce();
    }

    pub fn is_active(&self, raw: &str) -> bool {
        self.lock().get(raw).is_some_and(|entry| entry.active)
    }

    fn announce(&self) {
        self.hub
            .broadcast(&Envelope::new(kind::CONNECTIONS_CHANGED, json!(null)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> (PanelState, tokio::sync::broadcast::Receiver<String>) {
        let hub = RealtimeHub::new();
        let rx = hub.subscribe();
        (PanelState::new(Box::new(NoopLauncher), hub), rx)
    }

    #[tokio::test]
    async fn connect_then_disconnect_tracks_activity() {
        let (panel, _rx) = panel();
        assert!(!panel.is_active("-project=p"));

        panel.connect("-project=p");
        assert!(panel.is_active("-project=p"));

        panel.disconnect("-project=p");
        assert!(!panel.is_active("-project=p"));
    }

    #[tokio::test]
    async fn changes_are_announced_on_the_channel() {
        let (panel, mut rx) = panel();
        panel.connect("-project=p");
        panel.disconnect("-project=p");

        for _ in 0..2 {
            let frame = rx.recv().await.unwrap();
            let envelope = Envelope::from_json(&frame).unwrap();
            assert_eq!(envelope.kind, kind::CONNECTIONS_CHANGED);
        }
    }

    #[tokio::test]
    async fn disconnecting_an_unknown_item_is_harmless() {
        let (panel, _rx) = panel();
        panel.disconnect("never-connected");
        assert!(!panel.is_active("never-connected"));
    }

    #[tokio::test]
    async fn failed_launches_still_mark_the_item_active() {
        struct FailingLauncher;
        impl ItemLauncher for FailingLauncher {
            fn launch(&self, _raw: &str) -> Result<LaunchHandle> {
                anyhow::bail!("no such binary")
            }
        }
        let hub = RealtimeHub::new();
        let panel = PanelState::new(Box::new(FailingLauncher), hub);
        panel.connect("-project=p");
        assert!(panel.is_active("-project=p"));
    }
}
