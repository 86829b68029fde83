//! devserve - development server for single-page bundles.
//!
//! A builder writes compiled assets into an output store; the server reads
//! them back, holding requests while a build is in progress and telling
//! connected browsers when to reload.
//!
//! # Architecture
//!
//! - [`config`] - Layered configuration (defaults, file, environment, flags)
//! - [`dev`] - The server: asset serving, proxying, host checks, TLS and
//!   the live update hub
//! - [`error`] - Error types with actionable messages
//! - [`logger`] - Structured logging with tracing
//! - [`ui`] - Terminal messages
//! - `cli` and `commands` - The `devserve` binary
//!
//! # Example
//!
//! ```rust,no_run
//! use devserve::{config::DevServerConfig, dev::DevServer, error::Result};
//! use devserve_store::{MemoryStore, OutputStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<()> {
//! let store = MemoryStore::new();
//! let server = DevServer::new(DevServerConfig::default(), Arc::new(store.clone()))?;
//! let build = server.build_handle();
//! let handle = server.start().await?;
//!
//! store.write_file(Path::new("/dist/index.html"), b"<html></html>").await?;
//! build.complete();
//!
//! println!("listening on {}", handle.url());
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod cli;
pub mod commands;
pub mod config;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

// Re-export commonly used types
pub use error::{CertificateError, ConfigError, Result, ResultExt, ServerError};
