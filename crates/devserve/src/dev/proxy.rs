//! Proxy passthrough for requests no asset answered.
//!
//! Both configuration shapes (context → target map, or an ordered list of
//! entries) are normalized once into [`ProxyRule`]s. Each request is matched
//! against the rules in order and forwarded to the first match with method,
//! headers and body untouched, except `Host` when `changeOrigin` is set.
//!
//! WebSocket upgrades for `ws` rules bypass the request pipeline and are
//! tunnelled as raw bytes after the upstream handshake.

use crate::config::{validate_proxy_target, ProxyConfig, ProxyTarget};
use crate::error::{ConfigError, Result, ServerError};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

/// Per-request proxy failures, answered with the proxy's own error response.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream could not be reached
    #[error("could not connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// The upstream connection failed mid-request
    #[error("upstream {target} failed: {reason}")]
    Upstream { target: String, reason: String },

    /// The forwarded URI could not be built
    #[error("invalid upstream URI: {0}")]
    InvalidUri(String),
}

impl ProxyError {
    /// Status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Connect { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Upstream { .. } | ProxyError::InvalidUri(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// How a rule decides whether it applies to a request path.
#[derive(Debug, Clone)]
pub enum ContextMatcher {
    /// Compiled glob (`*`, `**`, `?`, `{a,b}`), matched against the whole path
    Glob { pattern: String, regex: Regex },
    /// Literal path, matched as a prefix
    ExactPath(String),
}

impl ContextMatcher {
    /// Build a matcher from a configured context.
    ///
    /// A bare `*` becomes `**` and a trailing `/*` is stripped, so `/api/*`
    /// proxies everything under `/api`.
    pub fn parse(context: &str) -> Result<Self> {
        let normalized = if context == "*" {
            "**".to_string()
        } else if let Some(prefix) = context.strip_suffix("/*") {
            if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            }
        } else {
            context.to_string()
        };

        if normalized.contains(['*', '?', '{']) {
            let regex = glob_to_regex(&normalized)?;
            Ok(ContextMatcher::Glob {
                pattern: normalized,
                regex,
            })
        } else {
            Ok(ContextMatcher::ExactPath(normalized))
        }
    }

    /// Check whether `path` (no query string) is covered.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            ContextMatcher::Glob { regex, .. } => regex.is_match(path),
            ContextMatcher::ExactPath(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Compile a glob into an anchored regex.
///
/// `**` spans path segments, `*` and `?` stay within one, `{a,b}` is an
/// alternation. `/**` at the end also matches the bare parent path.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut in_braces = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                let next = chars.get(i + 2);
                if at_segment_start && next == Some(&'/') {
                    // "**/" matches zero or more whole segments
                    out.push_str("(?:[^/]*/)*");
                    i += 3;
                    continue;
                }
                if at_segment_start && next.is_none() && out.ends_with('/') {
                    // trailing "/**" also matches the parent itself
                    out.pop();
                    out.push_str("(?:/.*)?");
                } else {
                    out.push_str(".*");
                }
                i += 2;
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                in_braces = true;
                out.push_str("(?:");
            }
            '}' if in_braces => {
                in_braces = false;
                out.push(')');
            }
            ',' if in_braces => out.push('|'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }
    out.push('$');

    Regex::new(&out).map_err(|e| {
        ServerError::from(ConfigError::InvalidValue {
            field: "proxy.context".to_string(),
            value: glob.to_string(),
            hint: format!("Unsupported glob pattern ({})", e),
        })
    })
}

/// Options applied when forwarding through a rule.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// Rewrite `Host` to the target's authority
    pub change_origin: bool,
    /// Tunnel WebSocket upgrades
    pub ws: bool,
    /// Path rewrites; the first matching regex is applied
    pub path_rewrite: Vec<(Regex, String)>,
}

/// One normalized proxy rule.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    pub matchers: Vec<ContextMatcher>,
    pub target: Uri,
    pub options: ProxyOptions,
}

impl ProxyRule {
    fn new(
        contexts: &[&str],
        target: &str,
        change_origin: bool,
        ws: bool,
        path_rewrite: &std::collections::BTreeMap<String, String>,
    ) -> Result<Self> {
        validate_proxy_target(target)?;
        let target: Uri = target.parse().map_err(|e| ConfigError::InvalidValue {
            field: "proxy.target".to_string(),
            value: target.to_string(),
            hint: format!("{}", e),
        })?;

        let matchers = contexts
            .iter()
            .map(|context| ContextMatcher::parse(context))
            .collect::<Result<Vec<_>>>()?;

        let path_rewrite = path_rewrite
            .iter()
            .map(|(pattern, replacement)| {
                Regex::new(pattern)
                    .map(|regex| (regex, replacement.clone()))
                    .map_err(|e| {
                        ServerError::from(ConfigError::InvalidValue {
                            field: "proxy.pathRewrite".to_string(),
                            value: pattern.clone(),
                            hint: e.to_string(),
                        })
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            matchers,
            target,
            options: ProxyOptions {
                change_origin,
                ws,
                path_rewrite,
            },
        })
    }

    /// Check whether this rule covers `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(path))
    }

    /// Authority of the target, e.g. `localhost:3000`.
    pub fn authority(&self) -> &str {
        self.target
            .authority()
            .map(|authority| authority.as_str())
            .unwrap_or_default()
    }

    /// Build the upstream path and query for `original`.
    fn upstream_path(&self, original: &str) -> String {
        let mut path = original.to_string();
        for (regex, replacement) in &self.options.path_rewrite {
            if regex.is_match(&path) {
                path = regex.replace(&path, replacement.as_str()).into_owned();
                break;
            }
        }

        let base = self.target.path().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Absolute upstream URI for `original`.
    fn upstream_uri(&self, original: &str) -> std::result::Result<Uri, ProxyError> {
        let uri = format!("http://{}{}", self.authority(), self.upstream_path(original));
        uri.parse()
            .map_err(|e: axum::http::uri::InvalidUri| ProxyError::InvalidUri(e.to_string()))
    }
}

/// Ordered proxy rules and the client used to forward through them.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    rules: Vec<ProxyRule>,
    client: Client<HttpConnector, Body>,
}

impl ProxyRouter {
    /// A router with no rules; every request passes through.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self {
            rules,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    /// Normalize a proxy configuration into rules.
    ///
    /// Both shapes keep declaration order.
    pub fn from_config(config: Option<&ProxyConfig>) -> Result<Self> {
        let no_rewrites = Default::default();
        let mut rules = Vec::new();

        match config {
            None => {}
            Some(ProxyConfig::Map(map)) => {
                for (context, target) in map {
                    let rule = match target {
                        ProxyTarget::Url(url) => {
                            ProxyRule::new(&[context.as_str()], url, false, false, &no_rewrites)?
                        }
                        ProxyTarget::Options(options) => ProxyRule::new(
                            &[context.as_str()],
                            &options.target,
                            options.change_origin,
                            options.ws,
                            &options.path_rewrite,
                        )?,
                    };
                    rules.push(rule);
                }
            }
            Some(ProxyConfig::List(entries)) => {
                for entry in entries {
                    rules.push(ProxyRule::new(
                        &entry.context.patterns(),
                        &entry.target,
                        entry.change_origin,
                        entry.ws,
                        &entry.path_rewrite,
                    )?);
                }
            }
        }

        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }

    /// First rule covering `path`.
    pub fn match_rule(&self, path: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    /// First `ws` rule covering `path`.
    pub fn match_ws_rule(&self, path: &str) -> Option<&ProxyRule> {
        self.rules
            .iter()
            .find(|rule| rule.options.ws && rule.matches(path))
    }

    /// Forward `request` through `rule`.
    ///
    /// Upstream failures are logged and answered with 504 (connect) or 502,
    /// never propagated.
    pub async fn forward(&self, rule: &ProxyRule, request: Request) -> Response {
        match self.try_forward(rule, request).await {
            Ok(response) => response,
            Err(e) => {
                error!(upstream = %rule.target, error = %e, "proxy error");
                (
                    e.status(),
                    format!("Error occurred while trying to proxy: {}", e),
                )
                    .into_response()
            }
        }
    }

    async fn try_forward(
        &self,
        rule: &ProxyRule,
        mut request: Request,
    ) -> std::result::Result<Response, ProxyError> {
        let original = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        *request.uri_mut() = rule.upstream_uri(&original)?;
        if rule.options.change_origin {
            set_host(&mut request, rule.authority());
        }

        debug!(from = %original, to = %request.uri(), "proxying");

        let response = self.client.request(request).await.map_err(|e| {
            if e.is_connect() {
                ProxyError::Connect {
                    target: rule.target.to_string(),
                    reason: e.to_string(),
                }
            } else {
                ProxyError::Upstream {
                    target: rule.target.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(response.map(Body::new))
    }

    /// Tunnel a WebSocket upgrade through `rule`.
    ///
    /// The handshake is replayed against the upstream over a fresh
    /// connection. When it answers `101`, both upgraded connections are
    /// spliced together until either side closes.
    pub async fn tunnel(&self, rule: &ProxyRule, mut request: Request) -> Response {
        let original = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let client_upgrade = hyper::upgrade::on(&mut request);

        match open_tunnel(rule, &original, request).await {
            Ok(mut upstream_response) => {
                if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
                    return upstream_response.map(Body::new);
                }

                let upstream_upgrade = hyper::upgrade::on(&mut upstream_response);
                let target = rule.target.to_string();
                tokio::spawn(async move {
                    match tokio::try_join!(client_upgrade, upstream_upgrade) {
                        Ok((client, upstream)) => {
                            let mut client = TokioIo::new(client);
                            let mut upstream = TokioIo::new(upstream);
                            if let Err(e) =
                                tokio::io::copy_bidirectional(&mut client, &mut upstream).await
                            {
                                debug!(upstream = %target, error = %e, "websocket tunnel closed");
                            }
                        }
                        Err(e) => warn!(upstream = %target, error = %e, "websocket upgrade failed"),
                    }
                });

                let (parts, _) = upstream_response.into_parts();
                Response::from_parts(parts, Body::empty())
            }
            Err(e) => {
                error!(upstream = %rule.target, error = %e, "websocket proxy error");
                (e.status(), e.to_string()).into_response()
            }
        }
    }
}

async fn open_tunnel(
    rule: &ProxyRule,
    original: &str,
    request: Request,
) -> std::result::Result<hyper::Response<hyper::body::Incoming>, ProxyError> {
    let authority = rule.authority().to_string();
    let connect_err = |reason: String| ProxyError::Connect {
        target: authority.clone(),
        reason,
    };

    let host = rule.target.host().unwrap_or("localhost");
    let port = rule.target.port_u16().unwrap_or(80);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| connect_err(e.to_string()))?;

    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = connection.with_upgrades().await {
            debug!(error = %e, "upstream websocket connection ended");
        }
    });

    let path: Uri = rule
        .upstream_path(original)
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| ProxyError::InvalidUri(e.to_string()))?;

    let (parts, _body) = request.into_parts();
    let mut upstream = hyper::Request::from_parts(parts, Empty::<Bytes>::new());
    *upstream.uri_mut() = path;
    if rule.options.change_origin {
        if let Ok(value) = HeaderValue::from_str(&authority) {
            upstream.headers_mut().insert(header::HOST, value);
        }
    }

    sender
        .send_request(upstream)
        .await
        .map_err(|e| ProxyError::Upstream {
            target: authority.clone(),
            reason: e.to_string(),
        })
}

fn set_host(request: &mut Request, authority: &str) {
    if let Ok(value) = HeaderValue::from_str(authority) {
        request.headers_mut().insert(header::HOST, value);
    }
}

/// Axum middleware forwarding requests that match a rule.
pub async fn proxy_requests(
    State(proxy): State<Arc<ProxyRouter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match proxy.match_rule(&path) {
        Some(rule) => proxy.forward(rule, request).await,
        None => next.run(request).await,
    }
}
