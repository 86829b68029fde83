//! Configuration for the dev server with multi-source loading.
//!
//! Merges settings from CLI args, environment variables, and config files.
//! Priority: CLI > Environment > File > Defaults

mod defaults;
mod loading;
mod tests;
mod types;
mod validation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use defaults::*;
pub use loading::{ConfigOverrides, StaticOverrides, DEFAULT_CONFIG_FILE};
pub use types::*;
pub use validation::validate_proxy_target;

/// Dev server configuration - loaded from devserve.config.json or CLI args.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevServerConfig {
    /// Port to listen on (probed upwards when taken)
    #[serde(default = "default_port")]
    pub port: u16,

    /// How many ports after `port` to try before giving up
    #[serde(default = "default_port_retries")]
    pub port_retries: u16,

    /// Bind host: IP literal, hostname, `local-ip`, `local-ipv4` or `local-ipv6`
    #[serde(default = "default_host")]
    pub host: String,

    /// Serve over HTTPS with a cached self-signed certificate
    #[serde(default)]
    pub https: bool,

    /// Offer HTTP/2 (requires https)
    #[serde(default)]
    pub http2: bool,

    /// Gzip responses
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Headers added to every response
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Extra hosts accepted by the Host/Origin check
    #[serde(default)]
    pub allowed_hosts: AllowedHosts,

    /// Apply the Host check to plain HTTP requests (WebSocket upgrades are always checked)
    #[serde(default = "default_true")]
    pub host_check: bool,

    /// Proxy rules, as a context → target map or an ordered list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,

    /// Path of the live update WebSocket endpoint
    #[serde(default = "default_web_socket_path")]
    pub web_socket_path: String,

    /// Announce hot updates (takes precedence over liveReload)
    #[serde(default = "default_true")]
    pub hot: bool,

    /// Ask clients to reload the page after each build
    #[serde(default = "default_true")]
    pub live_reload: bool,

    /// Heartbeat interval for live update connections
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Directory for the cached self-signed certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_dir: Option<PathBuf>,

    /// Static asset serving from the output store
    #[serde(default)]
    pub dev_middleware: DevMiddlewareConfig,

    /// Settings describing how browsers reach the server
    #[serde(default)]
    pub client: ClientConfig,

    /// Directory mirrored into the output store by the devserve binary
    #[serde(default, rename = "static")]
    pub static_files: StaticConfig,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            port_retries: default_port_retries(),
            host: default_host(),
            https: false,
            http2: false,
            compress: true,
            headers: BTreeMap::new(),
            allowed_hosts: AllowedHosts::default(),
            host_check: true,
            proxy: None,
            web_socket_path: default_web_socket_path(),
            hot: true,
            live_reload: true,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            cert_dir: None,
            dev_middleware: DevMiddlewareConfig::default(),
            client: ClientConfig::default(),
            static_files: StaticConfig::default(),
        }
    }
}

impl DevServerConfig {
    /// Which notification is broadcast after a successful build.
    pub fn live_update_mode(&self) -> LiveUpdateMode {
        if self.hot {
            LiveUpdateMode::Hot
        } else if self.live_reload {
            LiveUpdateMode::LiveReload
        } else {
            LiveUpdateMode::None
        }
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// URL scheme browsers use for the server.
    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }
}
