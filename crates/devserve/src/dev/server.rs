//! Development server: router composition, listener and accept loop.
//!
//! Request flow, outermost first:
//!
//! 1. WebSocket upgrades for the live update path or a `ws` proxy rule are
//!    dispatched directly and never enter the rest of the pipeline
//! 2. Host check (when `hostCheck` is enabled)
//! 3. Compression (when `compress` is enabled)
//! 4. Server-wide headers
//! 5. Static assets from the output store
//! 6. Proxy rules
//! 7. 404 fallback
//!
//! HTTP and HTTPS share one accept loop; HTTPS wraps each accepted stream in
//! TLS before handing it to hyper.

use crate::config::DevServerConfig;
use crate::dev::address::{bind_with_retries, resolve_host};
use crate::dev::build::BuildHandle;
use crate::dev::cert::{tls_config, CertificateManager};
use crate::dev::gate::ReadinessGate;
use crate::dev::host_guard::{check_host, HostGuard};
use crate::dev::hub::LiveUpdateHub;
use crate::dev::middleware::{header_map, serve_static, StaticMiddleware};
use crate::dev::proxy::{proxy_requests, ProxyRouter};
use crate::dev::resolver::{AssetResolver, MountPoint};
use crate::error::Result;
use axum::{
    extract::{FromRequestParts, Request, State, WebSocketUpgrade},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    BoxError, Router,
};
use devserve_store::OutputStore;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tower_http::compression::CompressionLayer;
use tracing::{debug, info, warn};

/// Development server.
pub struct DevServer {
    config: Arc<DevServerConfig>,
    store: Arc<dyn OutputStore>,
    gate: Arc<ReadinessGate>,
    assets: Arc<StaticMiddleware>,
    proxy: Arc<ProxyRouter>,
    guard: Arc<HostGuard>,
    hub: LiveUpdateHub,
    certificates: Option<CertificateManager>,
}

impl DevServer {
    /// Create a server reading build output from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or, with HTTPS, no
    /// certificate cache directory can be determined.
    pub fn new(config: DevServerConfig, store: Arc<dyn OutputStore>) -> Result<Self> {
        config.validate()?;

        let gate = Arc::new(ReadinessGate::new());

        let mounts = config
            .dev_middleware
            .mounts
            .iter()
            .map(MountPoint::from)
            .collect();
        let index = config
            .dev_middleware
            .serve_index
            .then(|| config.dev_middleware.index.clone());
        let assets = Arc::new(StaticMiddleware::new(
            store.clone(),
            gate.clone(),
            AssetResolver::new(mounts, index),
            &config.dev_middleware.headers,
        ));

        let proxy = Arc::new(ProxyRouter::from_config(config.proxy.as_ref())?);

        let mut guard = HostGuard::new(&config.host, config.allowed_hosts.clone());
        if let Some(host) = config
            .client
            .web_socket_url
            .as_deref()
            .and_then(|url| url::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(str::to_string))
        {
            guard = guard.with_host(host);
        }

        let hub = LiveUpdateHub::new(config.live_update_mode(), config.heartbeat_interval());

        let certificates = if config.https {
            Some(match &config.cert_dir {
                Some(dir) => CertificateManager::new(dir),
                None => CertificateManager::with_default_dir()?,
            })
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            store,
            gate,
            assets,
            proxy,
            guard: Arc::new(guard),
            hub,
            certificates,
        })
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OutputStore> {
        &self.store
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    pub fn hub(&self) -> &LiveUpdateHub {
        &self.hub
    }

    /// Handle for the builder integration.
    pub fn build_handle(&self) -> BuildHandle {
        BuildHandle::new(self.gate.clone(), self.hub.clone())
    }

    /// Wait until the current build is complete.
    pub async fn wait_until_valid(&self) {
        self.assets.wait_until_valid().await;
    }

    /// Build the request pipeline.
    pub fn router(&self) -> Router {
        let server_headers = Arc::new(header_map(&self.config.headers));

        let mut router = Router::new()
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                self.proxy.clone(),
                proxy_requests,
            ))
            .layer(middleware::from_fn_with_state(
                self.assets.clone(),
                serve_static,
            ))
            .layer(middleware::from_fn_with_state(
                server_headers,
                apply_headers,
            ));

        if self.config.compress {
            router = router.layer(CompressionLayer::new());
        }

        if self.config.host_check {
            router = router.layer(middleware::from_fn_with_state(
                self.guard.clone(),
                check_host,
            ));
        }

        let upgrades = UpgradeRoutes {
            web_socket_path: Arc::from(self.config.web_socket_path.as_str()),
            hub: self.hub.clone(),
            guard: self.guard.clone(),
            proxy: self.proxy.clone(),
        };
        router.layer(middleware::from_fn_with_state(upgrades, dispatch_upgrades))
    }

    /// Bind the listener and start serving in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be resolved, every port in the
    /// probe window is taken, or the HTTPS certificate cannot be loaded.
    pub async fn start(self) -> Result<DevServerHandle> {
        let ip = resolve_host(&self.config.host).await?;
        let listener =
            bind_with_retries(ip, self.config.port, self.config.port_retries).await?;
        let local_addr = listener.local_addr()?;

        let tls = match &self.certificates {
            Some(certificates) => {
                let pem = certificates.get_certificate().await?;
                Some(TlsAcceptor::from(tls_config(&pem, self.config.http2)?))
            }
            None => None,
        };

        self.hub.start_heartbeat();

        let router = self.router();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            router,
            tls,
            self.config.http2,
            shutdown_rx,
        ));

        let handle = DevServerHandle {
            local_addr,
            config: self.config.clone(),
            hub: self.hub.clone(),
            shutdown_tx,
            task,
        };
        info!(url = %handle.url(), "dev server listening");
        Ok(handle)
    }
}

/// Running server. Dropping it leaves the server running; call
/// [`shutdown`](Self::shutdown) to stop it.
#[derive(Debug)]
pub struct DevServerHandle {
    local_addr: SocketAddr,
    config: Arc<DevServerConfig>,
    hub: LiveUpdateHub,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL browsers should open.
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}/",
            self.config.scheme(),
            self.display_host(),
            self.local_addr.port()
        )
    }

    /// URL the browser client should open its live update socket on.
    pub fn client_web_socket_url(&self) -> String {
        if let Some(url) = &self.config.client.web_socket_url {
            return url.clone();
        }
        let scheme = if self.config.https { "wss" } else { "ws" };
        format!(
            "{}://{}:{}{}",
            scheme,
            self.display_host(),
            self.local_addr.port(),
            self.config.web_socket_path
        )
    }

    fn display_host(&self) -> String {
        let host = self.config.host.as_str();
        let is_literal = host.trim_matches(['[', ']']).parse::<IpAddr>().is_ok();
        if !is_literal && !host.starts_with("local-ip") {
            return host.to_string();
        }

        match self.local_addr.ip() {
            ip if ip.is_unspecified() => "localhost".to_string(),
            IpAddr::V6(ip) => format!("[{}]", ip),
            IpAddr::V4(ip) => ip.to_string(),
        }
    }

    /// Stop accepting connections, stop the heartbeat and close every live
    /// update connection.
    pub async fn shutdown(self) {
        self.hub.shutdown();
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "accept loop ended abnormally");
        }
        info!("dev server stopped");
    }
}

#[derive(Clone)]
struct UpgradeRoutes {
    web_socket_path: Arc<str>,
    hub: LiveUpdateHub,
    guard: Arc<HostGuard>,
    proxy: Arc<ProxyRouter>,
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

async fn dispatch_upgrades(
    State(routes): State<UpgradeRoutes>,
    request: Request,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(request.headers()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();

    if path == *routes.web_socket_path {
        // Always checked, whatever hostCheck says
        let allowed = routes.guard.is_allowed_upgrade(request.headers());
        let (mut parts, _body) = request.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => routes.hub.accept(upgrade, allowed),
            Err(rejection) => rejection.into_response(),
        };
    }

    if let Some(rule) = routes.proxy.match_ws_rule(&path) {
        return routes.proxy.tunnel(rule, request).await;
    }

    next.run(request).await
}

async fn apply_headers(
    State(headers): State<Arc<HeaderMap>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    for (name, value) in headers.iter() {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

async fn not_found(method: Method, uri: Uri) -> Response {
    debug!(%method, path = uri.path(), "no handler");
    (
        StatusCode::NOT_FOUND,
        format!("Cannot {} {}", method, uri.path()),
    )
        .into_response()
}

async fn accept_loop(
    listener: TcpListener,
    router: Router,
    tls: Option<TlsAcceptor>,
    http2: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let router = router.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, router, tls, http2).await {
                        debug!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    router: Router,
    tls: Option<TlsAcceptor>,
    http2: bool,
) -> std::result::Result<(), BoxError> {
    let service = TowerToHyperService::new(router);
    let mut builder = auto::Builder::new(TokioExecutor::new());
    if !http2 {
        builder = builder.http1_only();
    }

    match tls {
        Some(acceptor) => {
            let stream = acceptor.accept(stream).await?;
            builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
        }
        None => {
            builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MountConfig;
    use axum::http::HeaderValue;
    use devserve_store::MemoryStore;
    use std::path::PathBuf;

    fn config() -> DevServerConfig {
        let mut config = DevServerConfig::default();
        config.dev_middleware.mounts = vec![MountConfig {
            public_path: "/".to_string(),
            output_dir: PathBuf::from("/out"),
        }];
        config
    }

    #[test]
    fn test_is_websocket_upgrade() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = config();
        config.http2 = true;
        assert!(DevServer::new(config, Arc::new(MemoryStore::new())).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut config = config();
        config.host = "127.0.0.1".to_string();
        config.port = 0;

        let server = DevServer::new(config, Arc::new(MemoryStore::new())).unwrap();
        let handle = server.start().await.unwrap();

        let port = handle.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(handle.url(), format!("http://127.0.0.1:{}/", port));
        assert_eq!(
            handle.client_web_socket_url(),
            format!("ws://127.0.0.1:{}/ws", port)
        );

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_client_web_socket_url_override() {
        let mut config = config();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.client.web_socket_url = Some("wss://dev.example.test/ws".to_string());

        let handle = DevServer::new(config, Arc::new(MemoryStore::new()))
            .unwrap()
            .start()
            .await
            .unwrap();
        assert_eq!(handle.client_web_socket_url(), "wss://dev.example.test/ws");
        handle.shutdown().await;
    }
}
