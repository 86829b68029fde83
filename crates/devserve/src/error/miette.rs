//! Miette diagnostic conversion for server errors.

use crate::error::{CertificateError, ServerError};
use miette::Report;

/// Convert ServerError to miette Report
pub fn server_error_to_miette(err: ServerError) -> Report {
    match err {
        ServerError::Config(e) => miette::miette!("Configuration error: {}", e),
        ServerError::Certificate(e) => certificate_error_to_miette(e),
        ServerError::PortExhausted { host, first, last } => miette::miette!(
            help = "Pass a different --port or raise portRetries in devserve.config.json",
            "Ports {}-{} on {} are all in use",
            first,
            last,
            host
        ),
        _ => miette::miette!("{}", err),
    }
}

/// Convert CertificateError to miette Report
fn certificate_error_to_miette(err: CertificateError) -> Report {
    match err {
        CertificateError::Io { path, source } => miette::miette!(
            help = "HTTPS needs a writable certificate cache; set certDir to another directory",
            "Cannot access certificate cache {}: {}",
            path.display(),
            source
        ),
        other => miette::miette!("Certificate error: {}", other),
    }
}
