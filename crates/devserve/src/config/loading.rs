use crate::config::{DevServerConfig, ProxyConfig};
use crate::error::{ConfigError, Result, ResultExt};
use figment::{
    providers::{Env, Format as _, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "devserve.config.json";

/// Values supplied on the command line. Unset fields leave lower-priority
/// sources untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_reload: Option<bool>,
    #[serde(rename = "static", skip_serializing_if = "Option::is_none")]
    pub static_files: Option<StaticOverrides>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,
}

/// The `proxy` key of a config file, read on its own.
#[derive(Debug, Deserialize)]
struct DeclaredProxy {
    #[serde(default)]
    proxy: Option<ProxyConfig>,
}

impl DevServerConfig {
    /// Load configuration from multiple sources.
    /// Priority: CLI args > environment variables > config file > defaults
    pub fn load(overrides: &ConfigOverrides, config_path: Option<&Path>) -> Result<Self> {
        let config_file = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()).into());
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        let mut config = Self::figment(overrides, config_file.as_deref())
            .extract::<Self>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "configuration".to_string(),
                value: e.to_string(),
                hint: format!("Check {} syntax and field types", DEFAULT_CONFIG_FILE),
            })?;

        if let Some(path) = config_file.as_deref() {
            config.restore_proxy_order(path)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Put map-form proxy rules back in the order the file declares them.
    ///
    /// Figment keeps dictionaries sorted by key, which loses the order the
    /// rules are matched in. Keys the file does not declare keep their
    /// relative order after the declared ones.
    fn restore_proxy_order(&mut self, path: &Path) -> Result<()> {
        let Some(ProxyConfig::Map(rules)) = &mut self.proxy else {
            return Ok(());
        };

        let content = std::fs::read_to_string(path).with_path(path)?;
        let declared: DeclaredProxy =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                field: "proxy".to_string(),
                value: e.to_string(),
                hint: format!("Check {} syntax", path.display()),
            })?;

        if let Some(ProxyConfig::Map(declared)) = declared.proxy {
            let rank = |context: &String| declared.get_index_of(context).unwrap_or(usize::MAX);
            rules.sort_by(|a, _, b, _| rank(a).cmp(&rank(b)));
        }
        Ok(())
    }

    /// Layered providers, lowest priority first.
    pub(crate) fn figment(overrides: &ConfigOverrides, config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        // DEVSERVE_PORT_RETRIES, DEVSERVE_DEV_MIDDLEWARE__SERVE_INDEX ...
        figment = figment.merge(
            Env::prefixed("DEVSERVE_")
                .lowercase(false)
                .map(|key| env_key_to_path(key.as_str()).into()),
        );

        figment.merge(Serialized::defaults(overrides))
    }
}

/// Map an environment key (prefix stripped) to a config path.
///
/// `__` separates nesting levels and each level is converted from
/// SCREAMING_SNAKE_CASE to the camelCase field name, so
/// `DEV_MIDDLEWARE__SERVE_INDEX` becomes `devMiddleware.serveIndex`.
fn env_key_to_path(key: &str) -> String {
    key.split("__")
        .map(env_segment_to_field)
        .collect::<Vec<_>>()
        .join(".")
}

fn env_segment_to_field(segment: &str) -> String {
    // Serialized as `webSocketURL`, not `webSocketUrl`
    if segment.eq_ignore_ascii_case("WEB_SOCKET_URL") {
        return "webSocketURL".to_string();
    }

    let mut field = String::with_capacity(segment.len());
    for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        let word = word.to_ascii_lowercase();
        if i == 0 {
            field.push_str(&word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            field.push(first.to_ascii_uppercase());
            field.push_str(chars.as_str());
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_to_path() {
        assert_eq!(env_key_to_path("PORT"), "port");
        assert_eq!(env_key_to_path("PORT_RETRIES"), "portRetries");
        assert_eq!(env_key_to_path("HEARTBEAT_INTERVAL_MS"), "heartbeatIntervalMs");
        assert_eq!(env_key_to_path("WEB_SOCKET_PATH"), "webSocketPath");
        assert_eq!(env_key_to_path("DEV_MIDDLEWARE__SERVE_INDEX"), "devMiddleware.serveIndex");
        assert_eq!(env_key_to_path("STATIC__DEBOUNCE_MS"), "static.debounceMs");
        assert_eq!(env_key_to_path("CLIENT__WEB_SOCKET_URL"), "client.webSocketURL");
    }
}
