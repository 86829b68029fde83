//! Virtual output store for devserve
//!
//! This crate defines the `OutputStore` trait that decouples the build
//! pipeline from the dev server. A builder writes compiled assets into a
//! store; the server only ever reads, stats and checks existence. Two
//! implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps every output file in memory (the common case for
//!   a dev server, no disk I/O on rebuilds)
//! - [`DiskStore`] reads and writes through to the real filesystem

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Path exists but is a directory
    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes (0 for directories)
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Whether this is a file
    pub is_file: bool,
    /// Last modified timestamp (milliseconds since epoch)
    pub modified: Option<u64>,
}

impl FileMetadata {
    /// Metadata for a regular file of `size` bytes.
    pub fn file(size: u64, modified: Option<u64>) -> Self {
        Self {
            size,
            is_dir: false,
            is_file: true,
            modified,
        }
    }

    /// Metadata for a directory.
    pub fn directory() -> Self {
        Self {
            size: 0,
            is_dir: true,
            is_file: false,
            modified: None,
        }
    }
}

/// Addressable store holding compiled build output.
///
/// Builders call [`write_file`](OutputStore::write_file) while compiling;
/// the dev server resolves request paths with
/// [`metadata`](OutputStore::metadata) and serves bytes from
/// [`read_file`](OutputStore::read_file).
///
/// # Example
///
/// ```rust
/// use devserve_store::{MemoryStore, OutputStore};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.write_file(Path::new("/dist/app.js"), b"console.log(1)").await.unwrap();
///
/// assert!(store.exists(Path::new("/dist/app.js")));
/// assert!(store.metadata(Path::new("/dist")).await.unwrap().is_dir);
/// # }
/// ```
#[async_trait]
pub trait OutputStore: Send + Sync + std::fmt::Debug {
    /// Read a file from the store
    async fn read_file(&self, path: &Path) -> StoreResult<Vec<u8>>;

    /// Write a file to the store, replacing any previous content
    async fn write_file(&self, path: &Path, content: &[u8]) -> StoreResult<()>;

    /// Get file metadata
    async fn metadata(&self, path: &Path) -> StoreResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Remove a file
    async fn remove_file(&self, path: &Path) -> StoreResult<()>;

    /// List the immediate children of a directory
    async fn read_dir(&self, path: &Path) -> StoreResult<Vec<String>>;
}
