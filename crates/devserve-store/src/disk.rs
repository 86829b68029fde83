//! Filesystem-backed output store.

use crate::{FileMetadata, OutputStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Output store that reads and writes the real filesystem.
///
/// Relative paths resolve against `root`; absolute paths are used as-is.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store whose relative paths resolve against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory relative paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn map_io(path: &Path, e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::FileNotFound(path.to_path_buf())
    } else {
        StoreError::Io(format!("{}: {}", path.display(), e))
    }
}

#[async_trait]
impl OutputStore for DiskStore {
    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>> {
        let full_path = self.resolve_path(path);
        let metadata = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;
        if metadata.is_dir() {
            return Err(StoreError::NotAFile(full_path));
        }
        tokio::fs::read(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        let full_path = self.resolve_path(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(parent, e))?;
        }
        tokio::fs::write(&full_path, content)
            .await
            .map_err(|e| map_io(&full_path, e))
    }

    async fn metadata(&self, path: &Path) -> StoreResult<FileMetadata> {
        let full_path = self.resolve_path(path);
        let metadata = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);

        Ok(FileMetadata {
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            is_file: metadata.is_file(),
            modified,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    async fn remove_file(&self, path: &Path) -> StoreResult<()> {
        let full_path = self.resolve_path(path);
        tokio::fs::remove_file(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))
    }

    async fn read_dir(&self, path: &Path) -> StoreResult<Vec<String>> {
        let full_path = self.resolve_path(path);
        let mut entries = tokio::fs::read_dir(&full_path)
            .await
            .map_err(|e| map_io(&full_path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| map_io(&full_path, e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
