use crate::config::{DevServerConfig, ProxyConfig, ProxyTarget};
use crate::error::{ConfigError, Result};

/// Validate a proxy target: only plain `http://` upstreams are supported.
pub fn validate_proxy_target(target: &str) -> Result<()> {
    let url = url::Url::parse(target).map_err(|e| ConfigError::InvalidValue {
        field: "proxy.target".to_string(),
        value: target.to_string(),
        hint: format!("Target must be an absolute URL ({})", e),
    })?;

    if url.scheme() != "http" || url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            field: "proxy.target".to_string(),
            value: target.to_string(),
            hint: "Proxy targets must be http:// URLs with a host".to_string(),
        }
        .into());
    }

    Ok(())
}

impl DevServerConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.http2 && !self.https {
            return Err(ConfigError::ConflictingOptions(
                "http2 requires https (browsers only speak HTTP/2 over TLS)".to_string(),
            )
            .into());
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "heartbeatIntervalMs".to_string(),
                value: "0".to_string(),
                hint: "Heartbeat interval must be positive".to_string(),
            }
            .into());
        }

        if !self.web_socket_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "webSocketPath".to_string(),
                value: self.web_socket_path.clone(),
                hint: "Must be an absolute path such as /ws".to_string(),
            }
            .into());
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "host".to_string(),
                value: String::new(),
                hint: "Use an IP literal, a hostname, local-ip, local-ipv4 or local-ipv6"
                    .to_string(),
            }
            .into());
        }

        for mount in &self.dev_middleware.mounts {
            if !mount.public_path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: "devMiddleware.mounts.publicPath".to_string(),
                    value: mount.public_path.clone(),
                    hint: "Public paths start with '/'".to_string(),
                }
                .into());
            }
            if !mount.output_dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "devMiddleware.mounts.outputDir".to_string(),
                    value: mount.output_dir.display().to_string(),
                    hint: "Output directories are absolute paths inside the output store"
                        .to_string(),
                }
                .into());
            }
        }

        if self.dev_middleware.serve_index && self.dev_middleware.index.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "devMiddleware.index".to_string(),
                value: self.dev_middleware.index.clone(),
                hint: "Index must be a file name, not a path".to_string(),
            }
            .into());
        }

        if let Some(proxy) = &self.proxy {
            match proxy {
                ProxyConfig::Map(rules) => {
                    for target in rules.values() {
                        match target {
                            ProxyTarget::Url(url) => validate_proxy_target(url)?,
                            ProxyTarget::Options(options) => {
                                validate_proxy_target(&options.target)?
                            }
                        }
                    }
                }
                ProxyConfig::List(entries) => {
                    for entry in entries {
                        if entry.context.patterns().is_empty() {
                            return Err(ConfigError::InvalidValue {
                                field: "proxy.context".to_string(),
                                value: "[]".to_string(),
                                hint: "Each proxy entry needs at least one context".to_string(),
                            }
                            .into());
                        }
                        validate_proxy_target(&entry.target)?;
                    }
                }
            }
        }

        if let Some(ws_url) = &self.client.web_socket_url {
            let parsed = url::Url::parse(ws_url).map_err(|e| ConfigError::InvalidValue {
                field: "client.webSocketURL".to_string(),
                value: ws_url.clone(),
                hint: format!("Must be an absolute ws:// or wss:// URL ({})", e),
            })?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(ConfigError::InvalidValue {
                    field: "client.webSocketURL".to_string(),
                    value: ws_url.clone(),
                    hint: "Scheme must be ws or wss".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}
