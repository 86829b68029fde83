//! Development server module.
//!
//! Provides:
//! - Build-gated static serving from an [`OutputStore`](devserve_store::OutputStore)
//! - Single byte-range requests
//! - Path-based HTTP and WebSocket proxying
//! - Host/Origin checks against DNS rebinding
//! - A cached self-signed certificate for HTTPS
//! - Live update notifications over WebSocket with heartbeats

pub mod address;
pub mod build;
pub mod cert;
pub mod gate;
pub mod host_guard;
pub mod hub;
pub mod middleware;
pub mod mirror;
pub mod proxy;
pub mod range;
pub mod resolver;
pub mod server;
pub mod watcher;

// Re-exports
pub use build::BuildHandle;
pub use cert::CertificateManager;
pub use gate::{BuildState, ReadinessGate};
pub use host_guard::HostGuard;
pub use hub::{ConnectionState, LiveUpdateHub, ServerMessage};
pub use middleware::{StaticMiddleware, StaticOutcome};
pub use mirror::mirror_directory;
pub use proxy::{ProxyError, ProxyRouter, ProxyRule};
pub use range::{apply_range, parse_range, RangeParse, RangedContent};
pub use resolver::{AssetResolver, MountPoint};
pub use server::{DevServer, DevServerHandle};
pub use watcher::{FileChange, FileWatcher};
