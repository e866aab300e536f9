use crate::mapper::TubeMapper;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};

/// Watch the mapping config file and reload the mapper on change.
///
/// The watch is re-armed after every event: editors commonly save with a
/// rename-modify-delete sequence, after which the newly written file is no
/// longer covered by the original watch. Runs until the event channel
/// closes; setup failure is an error for this task only, the exporter keeps
/// serving the currently active mapping.
pub async fn watch_mapping_config(path: PathBuf, mapper: Arc<TubeMapper>) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<notify::Result<Event>>(16);

    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
        // Called from notify's own thread; drop events if the loop lags.
        let _ = tx.blocking_send(event);
    })
    .context("failed to create mapping config watcher")?;

    watcher
        .watch(&path, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch mapping config {}", path.display()))?;

    while let Some(event) = rx.recv().await {
        match event {
            Ok(event) if is_change(&event.kind) => {
                warn!(
                    "Mapping config {} changed, attempting reload",
                    path.display()
                );
                mapper.reload(&path);

                // Re-arm: the old watch may be gone after a rename/delete.
                let _ = watcher.unwatch(&path);
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    error!(
                        "Failed to re-watch mapping config {}: {}",
                        path.display(),
                        e
                    );
                }
            }
            Ok(_) => {}
            Err(e) => error!("Error watching mapping config: {}", e),
        }
    }

    Ok(())
}

/// Modify covers in-place writes; create covers the rename/recreate save
/// pattern where the watched path is replaced by a fresh file.
fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}
