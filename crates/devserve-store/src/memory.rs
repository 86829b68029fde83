//! In-memory output store.
//!
//! Files live in a hash map keyed by normalized absolute path. Directories
//! are never stored explicitly: a path is a directory when some stored file
//! lives below it, which matches how bundlers emit output (files only, with
//! parent directories implied).

use crate::{FileMetadata, OutputStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use path_clean::PathClean;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    modified: Option<u64>,
}

/// Output store backed by memory.
///
/// Cloning is cheap and clones share the same files, so a builder and the
/// server can each hold a handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Arc<RwLock<FxHashMap<PathBuf, StoredFile>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every file.
    pub fn clear(&self) {
        self.files.write().clear();
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether the store holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Normalize a path for lookup.
    ///
    /// Relative paths are anchored at `/` so `dist/app.js` and
    /// `/dist/app.js` address the same file.
    fn normalize(path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf().clean()
        } else {
            Path::new("/").join(path).clean()
        }
    }

    fn is_directory(files: &FxHashMap<PathBuf, StoredFile>, dir: &Path) -> bool {
        files
            .keys()
            .any(|file| file != dir && file.starts_with(dir))
    }

    fn now_millis() -> Option<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64)
    }
}

#[async_trait]
impl OutputStore for MemoryStore {
    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        let files = self.files.read();
        match files.get(&normalized) {
            Some(file) => Ok(file.content.clone()),
            None if Self::is_directory(&files, &normalized) => {
                Err(StoreError::NotAFile(normalized))
            }
            None => Err(StoreError::FileNotFound(normalized)),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()> {
        let normalized = Self::normalize(path);
        let mut files = self.files.write();
        if Self::is_directory(&files, &normalized) {
            return Err(StoreError::Io(format!(
                "Cannot write {}: path is a directory",
                normalized.display()
            )));
        }
        files.insert(
            normalized,
            StoredFile {
                content: content.to_vec(),
                modified: Self::now_millis(),
            },
        );
        Ok(())
    }

    async fn metadata(&self, path: &Path) -> StoreResult<FileMetadata> {
        let normalized = Self::normalize(path);
        let files = self.files.read();
        if let Some(file) = files.get(&normalized) {
            return Ok(FileMetadata::file(file.content.len() as u64, file.modified));
        }
        if Self::is_directory(&files, &normalized) {
            return Ok(FileMetadata::directory());
        }
        Err(StoreError::FileNotFound(normalized))
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = Self::normalize(path);
        let files = self.files.read();
        files.contains_key(&normalized) || Self::is_directory(&files, &normalized)
    }

    async fn remove_file(&self, path: &Path) -> StoreResult<()> {
        let normalized = Self::normalize(path);
        match self.files.write().remove(&normalized) {
            Some(_) => Ok(()),
            None => Err(StoreError::FileNotFound(normalized)),
        }
    }

    async fn read_dir(&self, path: &Path) -> StoreResult<Vec<String>> {
        let dir = Self::normalize(path);
        let files = self.files.read();

        let entries: BTreeSet<String> = files
            .keys()
            .filter_map(|file| file.strip_prefix(&dir).ok())
            .filter_map(|rest| match rest.components().next() {
                Some(Component::Normal(name)) => name.to_str().map(String::from),
                _ => None,
            })
            .collect();

        if entries.is_empty() {
            return Err(StoreError::FileNotFound(dir));
        }
        Ok(entries.into_iter().collect())
    }
}
