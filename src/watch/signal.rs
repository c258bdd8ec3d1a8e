//! Change signal: coalesces bursts of raw filesystem events.
//!
//! Editors routinely emit dozens of events for one logical save
//! (write + rename + metadata touch). The signal collapses any burst
//! arriving within a quiet window into a single downstream trigger.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a set of paths and emits one trigger per coalesced burst.
pub struct ChangeSignal;

impl ChangeSignal {
    /// Start watching `paths` recursively.
    ///
    /// Raw events restart a quiet-window timer; only when the window
    /// elapses with no further event is a single `()` sent on
    /// `trigger_tx`. The returned watcher must be kept alive by the
    /// caller for the watch to stay registered.
    pub fn spawn(
        paths: &[PathBuf],
        quiet_window: Duration,
        trigger_tx: mpsc::UnboundedSender<()>,
    ) -> Result<RecommendedWatcher, notify::Error> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    // Events entirely inside ignored directories are dropped.
                    if event.paths.is_empty() || event.paths.iter().any(|p| !is_ignored(p)) {
                        let _ = raw_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            })?;

        for path in paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
            tracing::info!(path = %path.display(), "Watching for changes");
        }

        tokio::spawn(debounce_loop(raw_rx, quiet_window, trigger_tx));

        Ok(watcher)
    }
}

/// Paths under dependency or VCS directories never count as a change.
fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("node_modules") | Some(".git")
        )
    })
}

/// Restart-on-activity debounce.
///
/// Each raw event restarts the window; the trigger fires only once the
/// window elapses with no further activity. There is never more than one
/// pending trigger: concurrent bursts collapse, which is correct because
/// the supervisor coalesces re-trigger requests during an active run.
async fn debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<()>,
    quiet_window: Duration,
    trigger_tx: mpsc::UnboundedSender<()>,
) {
    loop {
        // Wait for the first event of a burst.
        if raw_rx.recv().await.is_none() {
            return;
        }

        // Absorb the rest of the burst: any activity restarts the window.
        loop {
            match tokio::time::timeout(quiet_window, raw_rx.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if trigger_tx.send(()).is_err() {
            return;
        }
    }
}
