use crate::mapper::TubeMapper;
use anyhow::Result;
use futures::stream::StreamExt;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Spawn the signal handler task.
///
/// Returns a future that resolves on SIGTERM/SIGINT, used as the HTTP
/// server's graceful-shutdown trigger. SIGHUP forces a mapping config
/// reload through the same entrypoint a watcher event uses.
pub fn spawn_signal_handler(
    mapper: Arc<TubeMapper>,
    mapping_file: Option<PathBuf>,
) -> Result<impl std::future::Future<Output = ()>> {
    let signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut signals = signals.fuse();
        let mut shutdown_tx = Some(shutdown_tx);
        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, shutting down gracefully...");
                    if let Some(tx) = shutdown_tx.take() {
                        let _ = tx.send(());
                    }
                    break;
                }
                SIGHUP => match &mapping_file {
                    Some(path) => {
                        info!("Received SIGHUP, reloading mapping config");
                        mapper.reload(path);
                    }
                    None => warn!("Received SIGHUP but no mapping config is in use"),
                },
                _ => warn!("Received unexpected signal: {}", signal),
            }
        }
    });

    Ok(async move {
        let _ = shutdown_rx.await;
    })
}
