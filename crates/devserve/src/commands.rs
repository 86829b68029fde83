//! The `devserve` command.
//!
//! Lifecycle:
//! 1. Load configuration (defaults, file, environment, flags)
//! 2. Start the server; requests wait at the readiness gate
//! 3. Mirror the static directory into memory and open the gate
//! 4. Re-mirror on every debounced change batch, notifying browsers
//! 5. Shut down gracefully on Ctrl+C

use crate::cli::Cli;
use crate::config::{default_output_dir, DevServerConfig};
use crate::dev::{mirror_directory, BuildHandle, DevServer, FileChange, FileWatcher};
use crate::error::{ConfigError, Result, ServerError};
use crate::ui;
use devserve_store::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::debug;

/// Run the server until Ctrl+C.
///
/// # Errors
///
/// Returns errors for invalid configuration, a missing static directory,
/// server startup failures and watcher setup failures. Mirror failures
/// after startup are reported to browsers instead.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = DevServerConfig::load(&cli.to_overrides(), cli.config.as_deref())?;

    let directory = config
        .static_files
        .directory
        .clone()
        .ok_or_else(|| ConfigError::InvalidValue {
            field: "static.directory".to_string(),
            value: "(not set)".to_string(),
            hint: "Pass a directory to serve, e.g. `devserve public`".to_string(),
        })?;
    if !directory.is_dir() {
        return Err(ServerError::FileNotFound(directory));
    }

    let output_dir = config
        .dev_middleware
        .mounts
        .first()
        .map(|mount| mount.output_dir.clone())
        .unwrap_or_else(default_output_dir);
    let watch = config.static_files.watch;
    let debounce = Duration::from_millis(config.static_files.debounce_ms);

    let store = MemoryStore::new();
    let server = DevServer::new(config, Arc::new(store.clone()))?;
    let build = server.build_handle();
    let handle = server.start().await?;

    ui::success(&format!(
        "Serving {} at {}",
        directory.display(),
        handle.url()
    ));
    debug!(url = %handle.client_web_socket_url(), "live update endpoint");

    rebuild(&directory, &store, &output_dir, &build).await;

    // Without watching, the sender is dropped at once and the change branch
    // below is never taken.
    let (_watcher, mut changes) = if watch {
        let (watcher, changes) = FileWatcher::new(directory.clone(), debounce)?;
        ui::info(&format!("Watching {}", watcher.root().display()));
        (Some(watcher), changes)
    } else {
        let (_, changes) = mpsc::channel::<Vec<FileChange>>(1);
        (None, changes)
    };

    ui::info("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            Some(batch) = changes.recv() => {
                for change in &batch {
                    debug!(path = %change.path().display(), "changed");
                }
                ui::info(&format!("{} file(s) changed", batch.len()));
                rebuild(&directory, &store, &output_dir, &build).await;
            }

            _ = signal::ctrl_c() => {
                ui::info("Shutting down...");
                break;
            }
        }
    }

    handle.shutdown().await;
    ui::success("Development server stopped");
    Ok(())
}

/// Mirror `directory` into `store`, holding requests until it is done.
async fn rebuild(directory: &Path, store: &MemoryStore, output_dir: &Path, build: &BuildHandle) {
    build.invalidate();
    let started = Instant::now();

    match mirror_directory(directory, store, output_dir).await {
        Ok(count) => {
            let released = build.complete();
            ui::success(&format!(
                "Mirrored {} file(s) in {}ms",
                count,
                started.elapsed().as_millis()
            ));
            debug!(released, "released waiting requests");
        }
        Err(e) => {
            ui::error(&format!("Mirror failed: {}", e));
            build.fail(e.to_string());
        }
    }
}
