//! Error types for the dev server.
//!
//! The hierarchy mirrors the server's lifecycle:
//! - **Top-level errors** (`ServerError`) are what startup and the binary see
//! - **Domain errors** (`ConfigError`, `CertificateError`) carry detailed context
//! - **Per-request conditions** (asset misses, range errors, proxy failures,
//!   rejected hosts) are answered with responses and never reach this type
//!
//! # Example
//!
//! ```rust,no_run
//! use devserve::error::{Result, ResultExt};
//! use std::path::Path;
//!
//! fn load(path: &Path) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_path(path)
//!         .with_hint("Create the file or pass --config")
//! }
//! ```

mod miette;

pub use self::miette::server_error_to_miette;

use devserve_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration-related errors (invalid values, conflicting options)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Certificate generation or cache I/O failed; HTTPS cannot start
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Failed to bind the listener
    #[error("Failed to bind to {address}: {reason}\n\nHint: Check if another process is using this port")]
    Bind {
        /// Address that could not be bound
        address: String,
        /// OS error message
        reason: String,
    },

    /// Every port in the probe window was taken
    #[error("Ports {first}-{last} on {host} are all in use\n\nHint: Pass a different --port or raise portRetries")]
    PortExhausted {
        /// Host the server tried to bind
        host: String,
        /// First port tried
        first: u16,
        /// Last port tried
        last: u16,
    },

    /// Host name could not be resolved to a bind address
    #[error("Cannot resolve host '{0}'\n\nHint: Use an IP literal, 'localhost', 'local-ip', 'local-ipv4' or 'local-ipv6'")]
    HostResolution(String),

    /// TLS configuration failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// File or directory not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// I/O errors from file system or socket operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output store errors surfaced outside request handling
    #[error("Output store error: {0}")]
    Store(#[from] StoreError),

    /// File watching errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with custom messages
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file doesn't exist at the expected location
    #[error("Config file not found: {}\n\nHint: Create a devserve.config.json file or omit --config", .0.display())]
    NotFound(PathBuf),

    /// Mutually exclusive options were specified
    #[error("Conflicting options: {0}\n\nHint: These options cannot be used together")]
    ConflictingOptions(String),

    /// Invalid value for a configuration option
    #[error("Invalid value for '{field}': {value}\n\nHint: {hint}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The invalid value
        value: String,
        /// Helpful hint for correct values
        hint: String,
    },
}

/// Certificate lifecycle errors.
///
/// All of these are fatal at startup: HTTPS cannot serve without a cert.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// No cache directory could be determined for this platform
    #[error("No cache directory available for the certificate\n\nHint: Set certDir in devserve.config.json")]
    NoCacheDir,

    /// Reading, writing or deleting the cached certificate failed
    #[error("Certificate cache I/O failed for {}: {source}", .path.display())]
    Io {
        /// Cache file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// rcgen could not produce a key or certificate
    #[error("Certificate generation failed: {0}")]
    Generation(String),

    /// Cached PEM did not contain a usable key/certificate pair
    #[error("Invalid certificate PEM: {0}\n\nHint: Delete the cached server.pem to regenerate it")]
    InvalidPem(String),
}

/// Result type alias using `ServerError` as the default error type.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Extension trait for adding context to `Result` types.
pub trait ResultExt<T> {
    /// Add a file path to the error context.
    ///
    /// I/O "not found" errors become [`ServerError::FileNotFound`].
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Add a helpful hint to the error context.
    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T>;

    /// Prefix the error with a message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<ServerError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| {
            let err: ServerError = e.into();
            match err {
                ServerError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                    ServerError::FileNotFound(path.as_ref().to_path_buf())
                }
                other => other,
            }
        })
    }

    fn with_hint(self, hint: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: ServerError = e.into();
            ServerError::Custom(format!("{}\n\nHint: {}", err, hint))
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: ServerError = e.into();
            ServerError::Custom(format!("{}: {}", msg, err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "proxy".to_string(),
            value: "ftp://backend".to_string(),
            hint: "Proxy targets must be http:// URLs".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid value for 'proxy'"));
        assert!(msg.contains("ftp://backend"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_port_exhausted_names_range() {
        let err = ServerError::PortExhausted {
            host: "127.0.0.1".to_string(),
            first: 8080,
            last: 8083,
        };
        let msg = err.to_string();
        assert!(msg.contains("8080-8083"));
        assert!(msg.contains("127.0.0.1"));
    }

    #[test]
    fn test_server_error_from_certificate_error() {
        let err: ServerError = CertificateError::NoCacheDir.into();
        assert!(matches!(err, ServerError::Certificate(_)));
    }

    #[test]
    fn test_server_error_from_store_error() {
        let err: ServerError = StoreError::FileNotFound(PathBuf::from("/out/app.js")).into();
        assert!(matches!(err, ServerError::Store(_)));
        assert!(err.to_string().contains("/out/app.js"));
    }

    #[test]
    fn test_result_ext_with_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let err = result.with_path("/test/devserve.config.json").unwrap_err();
        assert!(matches!(err, ServerError::FileNotFound(_)));
    }

    #[test]
    fn test_result_ext_with_hint() {
        let result: std::result::Result<(), ConfigError> =
            Err(ConfigError::NotFound(PathBuf::from("devserve.config.json")));

        let err = result.with_hint("Try creating the file").unwrap_err();
        assert!(err.to_string().contains("Hint: Try creating the file"));
    }

    #[test]
    fn test_result_ext_context() {
        let result: std::result::Result<(), ConfigError> =
            Err(ConfigError::ConflictingOptions("hot and liveReload".to_string()));

        let err = result.context("Failed to load configuration").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to load configuration"));
        assert!(msg.contains("hot and liveReload"));
    }
}
