use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::defaults::*;

/// Hosts accepted by the Host/Origin check beyond IP literals, `localhost`
/// and the bind host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedHosts {
    /// `"auto"` (only the built-in rules) or `"all"` (disable the check)
    Keyword(AllowedHostsKeyword),
    /// Explicit host names; a leading `.` also admits every subdomain
    List(Vec<String>),
}

impl Default for AllowedHosts {
    fn default() -> Self {
        Self::Keyword(AllowedHostsKeyword::Auto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedHostsKeyword {
    Auto,
    All,
}

/// Proxy configuration as written by users.
///
/// Both shapes are normalized once into an ordered rule list by
/// [`ProxyRouter::from_config`](crate::dev::ProxyRouter::from_config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyConfig {
    /// `{ "/api": "http://localhost:3000" }` - declaration order
    Map(IndexMap<String, ProxyTarget>),
    /// `[{ "context": ["/api", "/auth"], "target": "..." }]` - declaration order
    List(Vec<ProxyEntry>),
}

/// Value side of the map form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProxyTarget {
    /// Bare target URL
    Url(String),
    /// Target with options
    Options(ProxyTargetOptions),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyTargetOptions {
    pub target: String,
    #[serde(default)]
    pub change_origin: bool,
    #[serde(default)]
    pub ws: bool,
    /// Regex → replacement applied to the forwarded path, in key order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_rewrite: BTreeMap<String, String>,
}

/// One entry of the list form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyEntry {
    pub context: ContextSpec,
    pub target: String,
    #[serde(default)]
    pub change_origin: bool,
    #[serde(default)]
    pub ws: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_rewrite: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextSpec {
    One(String),
    Many(Vec<String>),
}

impl ContextSpec {
    pub fn patterns(&self) -> Vec<&str> {
        match self {
            ContextSpec::One(pattern) => vec![pattern.as_str()],
            ContextSpec::Many(patterns) => patterns.iter().map(String::as_str).collect(),
        }
    }
}

/// Static asset serving settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevMiddlewareConfig {
    /// Ordered mount points; the first matching prefix wins
    #[serde(default = "default_mounts")]
    pub mounts: Vec<MountConfig>,

    /// Serve the index file for directory requests
    #[serde(default = "default_true")]
    pub serve_index: bool,

    /// Index file name
    #[serde(default = "default_index")]
    pub index: String,

    /// Headers added to asset responses
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Default for DevMiddlewareConfig {
    fn default() -> Self {
        Self {
            mounts: default_mounts(),
            serve_index: true,
            index: default_index(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MountConfig {
    /// URL prefix, e.g. `/` or `/static/`
    pub public_path: String,
    /// Directory inside the output store
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// URL browsers should open for live updates, when it differs from the
    /// server's own address (e.g. behind a reverse proxy)
    #[serde(
        default,
        rename = "webSocketURL",
        skip_serializing_if = "Option::is_none"
    )]
    pub web_socket_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StaticConfig {
    /// Directory on disk to mirror into the output store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Re-mirror and notify clients when the directory changes
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Debounce window for change events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            directory: None,
            watch: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Notification broadcast after a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdateMode {
    /// `{"type":"hot"}`
    Hot,
    /// `{"type":"liveReload"}`
    LiveReload,
    /// Nothing is broadcast
    None,
}
