//! Static asset middleware serving build output from the output store.
//!
//! # Contract
//!
//! `handle` either answers a request with an asset or returns
//! [`StaticOutcome::Next`] so the proxy and fallback can take over:
//!
//! - Non GET/HEAD requests are never answered here
//! - Every GET/HEAD waits on the [`ReadinessGate`] first, with no timeout
//! - A resolution miss is `Next`
//! - A store read failure is also `Next`, never an error response. Output can
//!   disappear between `metadata` and `read_file` while a rebuild rewrites the
//!   store, and the next handler is the right place for such a request.

use crate::dev::gate::ReadinessGate;
use crate::dev::range::apply_range;
use crate::dev::resolver::AssetResolver;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use devserve_store::OutputStore;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of [`StaticMiddleware::handle`].
pub enum StaticOutcome {
    /// The asset response
    Response(Response),
    /// Not handled here; pass to the next handler
    Next,
}

/// Serves resolved assets from the output store once the build is ready.
#[derive(Debug)]
pub struct StaticMiddleware {
    store: Arc<dyn OutputStore>,
    gate: Arc<ReadinessGate>,
    resolver: AssetResolver,
    headers: HeaderMap,
}

impl StaticMiddleware {
    /// Create the middleware.
    ///
    /// `headers` are added to every asset response; entries that are not
    /// valid header names or values are skipped with a warning.
    pub fn new(
        store: Arc<dyn OutputStore>,
        gate: Arc<ReadinessGate>,
        resolver: AssetResolver,
        headers: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            store,
            gate,
            resolver,
            headers: header_map(headers),
        }
    }

    /// Wait until the current build is complete.
    pub async fn wait_until_valid(&self) {
        self.gate.wait_until_ready("").await;
    }

    /// Answer the request with an asset, or delegate.
    pub async fn handle(&self, method: &Method, uri: &Uri, headers: &HeaderMap) -> StaticOutcome {
        if method != Method::GET && method != Method::HEAD {
            return StaticOutcome::Next;
        }

        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        self.gate.wait_until_ready(url).await;

        let Some(filename) = self.resolver.resolve(self.store.as_ref(), url).await else {
            debug!(url, "no asset, passing on");
            return StaticOutcome::Next;
        };

        let content = match self.store.read_file(&filename).await {
            Ok(content) => Bytes::from(content),
            Err(e) => {
                debug!(file = %filename.display(), error = %e, "asset read failed, passing on");
                return StaticOutcome::Next;
            }
        };

        let range = headers
            .get(header::RANGE)
            .and_then(|value| value.to_str().ok());
        let ranged = apply_range(content, range);

        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(ranged.body)
        };

        let mut response = Response::new(body);
        *response.status_mut() = ranged.status;

        let response_headers = response.headers_mut();
        for (name, value) in &self.headers {
            response_headers.insert(name.clone(), value.clone());
        }
        if !response_headers.contains_key(header::CONTENT_TYPE) {
            response_headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_type_for(&filename)),
            );
        }
        response_headers.extend(ranged.headers);

        debug!(url, file = %filename.display(), status = %response.status(), "served asset");
        StaticOutcome::Response(response)
    }
}

/// Axum middleware wrapping [`StaticMiddleware::handle`].
pub async fn serve_static(
    State(assets): State<Arc<StaticMiddleware>>,
    request: Request,
    next: Next,
) -> Response {
    let outcome = assets
        .handle(request.method(), request.uri(), request.headers())
        .await;

    match outcome {
        StaticOutcome::Response(response) => response,
        StaticOutcome::Next => next.run(request).await,
    }
}

/// Convert configured header pairs, dropping invalid entries.
pub(crate) fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "ignoring invalid header"),
        }
    }
    map
}

/// Determine content type from file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "wasm" => "application/wasm",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "webmanifest" => "application/manifest+json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
