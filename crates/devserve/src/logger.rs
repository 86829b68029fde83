//! Logging infrastructure for devserve.
//!
//! Library code emits `tracing` events (requests at debug, lifecycle at
//! info, rejected hosts and upstream failures at warn/error). The binary
//! installs a subscriber once at startup through [`init_logger`].
//!
//! # Example
//!
//! ```rust,no_run
//! use devserve::logger::init_logger;
//! use tracing::info;
//!
//! init_logger(false, false, false);
//! info!("Serving /dist");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "devserve=debug,devserve_store=debug";

/// Filter used with `--quiet`.
pub const QUIET_FILTER: &str = "devserve=error";

/// Filter used when neither flag nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "devserve=info,devserve_store=info";

/// Initialize the tracing subscriber with the specified options.
///
/// The logging level is determined in this order:
/// 1. `--verbose` flag: DEBUG for devserve crates
/// 2. `--quiet` flag: ERROR only
/// 3. `RUST_LOG` environment variable
/// 4. Default: INFO for devserve crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(build_filter(verbose, quiet), no_color);
}

/// Initialize logger with a custom environment filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // try_init: tests and embedders may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn build_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
