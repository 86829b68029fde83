//! Terminal status lines for the devserve binary.
//!
//! Library code logs through `tracing`; these helpers are for the handful of
//! human-facing lines (server URL, rebuild notices) printed to stderr.

mod messages;

pub use messages::{colors_enabled, error, info, success, warning};

/// Check if color output should be enabled.
///
/// Respects NO_COLOR and FORCE_COLOR, falls back to TTY detection.
pub fn should_use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    console::user_attended_stderr()
}

/// Initialize color support based on environment.
///
/// Should be called once in `main`, before any status line is printed.
pub fn init_colors(no_color: bool) {
    messages::set_colors(!no_color && should_use_color());
}
