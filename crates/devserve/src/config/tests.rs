#[cfg(test)]
mod tests {
    use crate::config::*;
    use figment::Jail;
    use std::path::PathBuf;

    #[test]
    fn test_serialization() {
        let config = DevServerConfig::default();
        let json_val = serde_json::to_value(&config).unwrap();

        // camelCase field names
        assert!(json_val.get("portRetries").is_some());
        assert!(json_val.get("webSocketPath").is_some());
        assert!(json_val.get("port_retries").is_none());
        assert!(json_val["devMiddleware"].get("serveIndex").is_some());
        assert!(json_val.get("static").is_some());

        // skip_serializing_if
        assert!(json_val.get("proxy").is_none());
        assert!(json_val.get("certDir").is_none());
        assert!(json_val["client"].get("webSocketURL").is_none());

        // allowedHosts keyword
        assert_eq!(json_val["allowedHosts"], "auto");
    }

    #[test]
    fn test_defaults() {
        let config = DevServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.port_retries, 3);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.web_socket_path, "/ws");
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.dev_middleware.index, "index.html");
        assert_eq!(
            config.dev_middleware.mounts,
            vec![MountConfig {
                public_path: "/".to_string(),
                output_dir: PathBuf::from("/dist"),
            }]
        );
        assert_eq!(config.live_update_mode(), LiveUpdateMode::Hot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_update_mode_is_exclusive() {
        let config = DevServerConfig {
            hot: false,
            ..DevServerConfig::default()
        };
        assert_eq!(config.live_update_mode(), LiveUpdateMode::LiveReload);

        let config = DevServerConfig {
            hot: false,
            live_reload: false,
            ..DevServerConfig::default()
        };
        assert_eq!(config.live_update_mode(), LiveUpdateMode::None);
    }

    #[test]
    fn test_proxy_config_shapes() {
        let map: ProxyConfig = serde_json::from_str(
            r#"{
                "/api": "http://localhost:3000",
                "/socket": { "target": "http://localhost:4000", "ws": true }
            }"#,
        )
        .unwrap();
        let ProxyConfig::Map(rules) = map else {
            panic!("expected map form");
        };
        assert_eq!(
            rules["/api"],
            ProxyTarget::Url("http://localhost:3000".to_string())
        );
        assert!(matches!(&rules["/socket"], ProxyTarget::Options(o) if o.ws));

        let list: ProxyConfig = serde_json::from_str(
            r#"[
                { "context": ["/auth", "/api"], "target": "http://localhost:3000", "changeOrigin": true },
                { "context": "/legacy/*", "target": "http://localhost:5000" }
            ]"#,
        )
        .unwrap();
        let ProxyConfig::List(entries) = list else {
            panic!("expected list form");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].context.patterns(), vec!["/auth", "/api"]);
        assert!(entries[0].change_origin);
        assert_eq!(entries[1].context.patterns(), vec!["/legacy/*"]);
    }

    #[test]
    fn test_allowed_hosts_shapes() {
        let all: AllowedHosts = serde_json::from_str(r#""all""#).unwrap();
        assert_eq!(all, AllowedHosts::Keyword(AllowedHostsKeyword::All));

        let list: AllowedHosts = serde_json::from_str(r#"[".example.test", "dev.box"]"#).unwrap();
        assert_eq!(
            list,
            AllowedHosts::List(vec![".example.test".to_string(), "dev.box".to_string()])
        );
    }

    #[test]
    fn test_validation() {
        // http2 without https fails
        assert!(DevServerConfig {
            http2: true,
            ..DevServerConfig::default()
        }
        .validate()
        .is_err());

        // http2 with https succeeds
        assert!(DevServerConfig {
            http2: true,
            https: true,
            ..DevServerConfig::default()
        }
        .validate()
        .is_ok());

        // Zero heartbeat fails
        assert!(DevServerConfig {
            heartbeat_interval_ms: 0,
            ..DevServerConfig::default()
        }
        .validate()
        .is_err());

        // Relative websocket path fails
        assert!(DevServerConfig {
            web_socket_path: "ws".to_string(),
            ..DevServerConfig::default()
        }
        .validate()
        .is_err());

        // Relative output dir fails
        let mut config = DevServerConfig::default();
        config.dev_middleware.mounts[0].output_dir = PathBuf::from("dist");
        assert!(config.validate().is_err());

        // https proxy target fails
        let mut config = DevServerConfig::default();
        config.proxy = Some(ProxyConfig::List(vec![ProxyEntry {
            context: ContextSpec::One("/api".to_string()),
            target: "https://backend.test".to_string(),
            change_origin: false,
            ws: false,
            path_rewrite: Default::default(),
        }]));
        assert!(config.validate().is_err());

        // Non-ws client URL fails
        let mut config = DevServerConfig::default();
        config.client.web_socket_url = Some("http://localhost:8080/ws".to_string());
        assert!(config.validate().is_err());
        config.client.web_socket_url = Some("wss://dev.example.test/ws".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_merges_file_env_and_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"{
                    "port": 9000,
                    "host": "127.0.0.1",
                    "compress": false,
                    "proxy": { "/api": "http://localhost:3000" }
                }"#,
            )?;
            jail.set_env("DEVSERVE_PORT", "9100");

            let overrides = ConfigOverrides {
                host: Some("0.0.0.0".to_string()),
                ..ConfigOverrides::default()
            };
            let config = DevServerConfig::load(&overrides, None).map_err(|e| e.to_string())?;

            // env beats file, CLI beats env
            assert_eq!(config.port, 9100);
            assert_eq!(config.host, "0.0.0.0");
            assert!(!config.compress);
            assert!(config.proxy.is_some());
            // untouched defaults survive
            assert_eq!(config.web_socket_path, "/ws");
            Ok(())
        });
    }

    #[test]
    fn test_load_multi_word_env_keys() {
        Jail::expect_with(|jail| {
            jail.set_env("DEVSERVE_PORT_RETRIES", "7");
            jail.set_env("DEVSERVE_HEARTBEAT_INTERVAL_MS", "500");
            jail.set_env("DEVSERVE_HOST_CHECK", "false");
            jail.set_env("DEVSERVE_DEV_MIDDLEWARE__SERVE_INDEX", "false");
            jail.set_env("DEVSERVE_CLIENT__WEB_SOCKET_URL", "wss://dev.example.test/ws");

            let config = DevServerConfig::load(&ConfigOverrides::default(), None)
                .map_err(|e| e.to_string())?;

            assert_eq!(config.port_retries, 7);
            assert_eq!(config.heartbeat_interval_ms, 500);
            assert!(!config.host_check);
            assert!(!config.dev_middleware.serve_index);
            assert_eq!(
                config.client.web_socket_url.as_deref(),
                Some("wss://dev.example.test/ws")
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_keeps_proxy_declaration_order() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"{
                    "proxy": {
                        "/socket": "http://localhost:5000",
                        "/api/special": "http://localhost:4000",
                        "/api": "http://localhost:3000"
                    }
                }"#,
            )?;

            let config = DevServerConfig::load(&ConfigOverrides::default(), None)
                .map_err(|e| e.to_string())?;
            let Some(ProxyConfig::Map(rules)) = config.proxy else {
                panic!("expected map form");
            };
            let contexts: Vec<&str> = rules.keys().map(String::as_str).collect();
            assert_eq!(contexts, vec!["/socket", "/api/special", "/api"]);
            Ok(())
        });
    }

    #[test]
    fn test_load_static_override_keeps_file_settings() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"{ "static": { "debounceMs": 250 } }"#,
            )?;

            let overrides = ConfigOverrides {
                static_files: Some(StaticOverrides {
                    directory: Some(PathBuf::from("build")),
                    watch: None,
                }),
                ..ConfigOverrides::default()
            };
            let config = DevServerConfig::load(&overrides, None).map_err(|e| e.to_string())?;

            assert_eq!(config.static_files.directory, Some(PathBuf::from("build")));
            assert_eq!(config.static_files.debounce_ms, 250);
            assert!(config.static_files.watch);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, r#"{ "prot": 9000 }"#)?;
            assert!(DevServerConfig::load(&ConfigOverrides::default(), None).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = DevServerConfig::load(
            &ConfigOverrides::default(),
            Some(std::path::Path::new("/definitely/not/here.json")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
