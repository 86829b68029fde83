//! Copies a directory on disk into a memory store.
//!
//! This is the builder the standalone binary ships with: the "build" is a
//! verbatim copy of the static directory under a mount's output dir.

use crate::error::{Result, ResultExt};
use devserve_store::{MemoryStore, OutputStore};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Replace the contents of `store` with the files under `source`, placed
/// below `output_dir`. Hidden entries are skipped.
///
/// Returns the number of files copied.
pub async fn mirror_directory(source: &Path, store: &MemoryStore, output_dir: &Path) -> Result<usize> {
    let files = collect_files(source)?;

    store.clear();
    for (relative, absolute) in &files {
        let content = tokio::fs::read(absolute).await.with_path(absolute)?;
        store.write_file(&output_dir.join(relative), &content).await?;
    }

    debug!(source = %source.display(), files = files.len(), "mirrored static directory");
    Ok(files.len())
}

fn collect_files(source: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(source)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(source) {
            files.push((relative.to_path_buf(), entry.path().to_path_buf()));
        }
    }

    Ok(files)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}
