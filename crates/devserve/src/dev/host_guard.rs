//! Host/Origin validation against DNS rebinding.
//!
//! A page on an attacker's domain that rebinds its DNS to 127.0.0.1 still
//! sends its own name in `Host` and `Origin`. Accepting only IP literals,
//! `localhost`, the bind host and explicitly allowed names shuts it out.

use crate::config::{AllowedHosts, AllowedHostsKeyword};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;
use url::{Host, Url};

/// Validates `Host` and `Origin` headers.
#[derive(Debug, Clone)]
pub struct HostGuard {
    bind_host: String,
    allowed: AllowedHosts,
    extra_hosts: Vec<String>,
}

impl HostGuard {
    /// Create a guard for a server bound to `bind_host`.
    pub fn new(bind_host: impl Into<String>, allowed: AllowedHosts) -> Self {
        Self {
            bind_host: bind_host.into().to_ascii_lowercase(),
            allowed,
            extra_hosts: Vec::new(),
        }
    }

    /// Also accept `host` (e.g. the host of a configured client WebSocket URL).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.extra_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    /// Check the named header.
    ///
    /// A missing `Host` is rejected. A missing `Origin` is accepted because
    /// only browsers send it, and non-browser clients are not the threat.
    pub fn is_allowed(&self, headers: &HeaderMap, header_name: &HeaderName) -> bool {
        if matches!(self.allowed, AllowedHosts::Keyword(AllowedHostsKeyword::All)) {
            return true;
        }

        let is_origin = header_name == header::ORIGIN;
        let Some(value) = headers.get(header_name) else {
            return is_origin;
        };
        let Ok(value) = value.to_str() else {
            return false;
        };

        let parsed = if is_origin {
            Url::parse(value)
        } else {
            Url::parse(&format!("http://{}", value))
        };
        let Ok(url) = parsed else {
            return false;
        };

        // Pages loaded from files or browser extensions
        if is_origin && (url.scheme() == "file" || url.scheme().ends_with("-extension")) {
            return true;
        }

        match url.host() {
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
            Some(Host::Domain(domain)) => self.is_allowed_hostname(&domain.to_ascii_lowercase()),
            None => false,
        }
    }

    /// Check both `Host` and `Origin`, as done for WebSocket upgrades.
    pub fn is_allowed_upgrade(&self, headers: &HeaderMap) -> bool {
        self.is_allowed(headers, &header::HOST) && self.is_allowed(headers, &header::ORIGIN)
    }

    fn is_allowed_hostname(&self, hostname: &str) -> bool {
        if hostname == "localhost" || hostname == self.bind_host {
            return true;
        }

        if self.extra_hosts.iter().any(|host| host == hostname) {
            return true;
        }

        if let AllowedHosts::List(entries) = &self.allowed {
            for entry in entries {
                let entry = entry.to_ascii_lowercase();
                if entry == hostname {
                    return true;
                }
                // ".example.test" admits example.test and every subdomain
                if let Some(domain) = entry.strip_prefix('.') {
                    if hostname == domain || hostname.ends_with(&entry) {
                        return true;
                    }
                }
            }
        }

        false
    }
}

/// Axum middleware rejecting HTTP requests with a foreign `Host`.
pub async fn check_host(
    State(guard): State<Arc<HostGuard>>,
    request: Request,
    next: Next,
) -> Response {
    if !guard.is_allowed(request.headers(), &header::HOST) {
        warn!(
            host = ?request.headers().get(header::HOST),
            path = request.uri().path(),
            "rejected request with invalid Host header"
        );
        return (StatusCode::FORBIDDEN, "Invalid Host header").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    fn guard() -> HostGuard {
        HostGuard::new("localhost", AllowedHosts::default())
    }

    #[test]
    fn test_ip_literals_always_allowed() {
        let guard = guard();
        for host in ["127.0.0.1:8080", "192.168.1.20", "[::1]:8080", "[fe80::1]"] {
            assert!(
                guard.is_allowed(&headers(&[(header::HOST, host)]), &header::HOST),
                "{} should be allowed",
                host
            );
        }
    }

    #[test]
    fn test_rebinding_host_rejected() {
        let guard = guard();
        assert!(!guard.is_allowed(
            &headers(&[(header::HOST, "evil.example.com")]),
            &header::HOST
        ));
        assert!(!guard.is_allowed(
            &headers(&[(header::ORIGIN, "http://evil.example.com:8080")]),
            &header::ORIGIN
        ));
    }

    #[test]
    fn test_localhost_and_bind_host() {
        let guard = HostGuard::new("dev.box", AllowedHosts::default());
        assert!(guard.is_allowed(&headers(&[(header::HOST, "localhost:8080")]), &header::HOST));
        assert!(guard.is_allowed(&headers(&[(header::HOST, "DEV.BOX:8080")]), &header::HOST));
        assert!(!guard.is_allowed(&headers(&[(header::HOST, "other.box")]), &header::HOST));
    }

    #[test]
    fn test_missing_headers() {
        let guard = guard();
        assert!(!guard.is_allowed(&HeaderMap::new(), &header::HOST));
        assert!(guard.is_allowed(&HeaderMap::new(), &header::ORIGIN));
    }

    #[test]
    fn test_allowed_hosts_list() {
        let guard = HostGuard::new(
            "localhost",
            AllowedHosts::List(vec![".example.test".to_string(), "dev.box".to_string()]),
        );
        for host in ["example.test", "app.example.test", "a.b.example.test", "dev.box"] {
            assert!(
                guard.is_allowed(&headers(&[(header::HOST, host)]), &header::HOST),
                "{} should be allowed",
                host
            );
        }
        assert!(!guard.is_allowed(&headers(&[(header::HOST, "badexample.test")]), &header::HOST));
    }

    #[test]
    fn test_allowed_hosts_all() {
        let guard = HostGuard::new("localhost", AllowedHosts::Keyword(AllowedHostsKeyword::All));
        assert!(guard.is_allowed(&headers(&[(header::HOST, "anything.test")]), &header::HOST));
        assert!(guard.is_allowed(&HeaderMap::new(), &header::HOST));
    }

    #[test]
    fn test_extension_origin() {
        let guard = guard();
        assert!(guard.is_allowed(
            &headers(&[(header::ORIGIN, "chrome-extension://abcdef")]),
            &header::ORIGIN
        ));
        assert!(!guard.is_allowed(&headers(&[(header::ORIGIN, "null")]), &header::ORIGIN));
    }

    #[test]
    fn test_upgrade_checks_both() {
        let guard = guard();
        assert!(guard.is_allowed_upgrade(&headers(&[
            (header::HOST, "localhost:8080"),
            (header::ORIGIN, "http://localhost:8080"),
        ])));
        assert!(!guard.is_allowed_upgrade(&headers(&[
            (header::HOST, "localhost:8080"),
            (header::ORIGIN, "http://evil.example.com"),
        ])));
        assert!(guard.is_allowed_upgrade(&headers(&[(header::HOST, "127.0.0.1")])));
    }

    #[test]
    fn test_extra_host() {
        let guard = guard().with_host("dev.example.test");
        assert!(guard.is_allowed(
            &headers(&[(header::HOST, "dev.example.test")]),
            &header::HOST
        ));
    }
}
