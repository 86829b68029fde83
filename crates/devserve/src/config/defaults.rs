use std::path::PathBuf;

use crate::config::types::MountConfig;

pub fn default_port() -> u16 {
    8080
}

pub fn default_port_retries() -> u16 {
    3
}

pub fn default_host() -> String {
    "localhost".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_web_socket_path() -> String {
    "/ws".to_string()
}

pub fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

pub fn default_index() -> String {
    "index.html".to_string()
}

pub fn default_debounce_ms() -> u64 {
    100
}

/// Virtual directory the binary mirrors output into.
pub fn default_output_dir() -> PathBuf {
    PathBuf::from("/dist")
}

pub fn default_mounts() -> Vec<MountConfig> {
    vec![MountConfig {
        public_path: "/".to_string(),
        output_dir: default_output_dir(),
    }]
}
