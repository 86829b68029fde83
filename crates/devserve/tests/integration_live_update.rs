//! Integration tests for the live update hub and WebSocket proxying.
//!
//! These run a real listener since WebSocket upgrades need a connection.

use axum::extract::ws::{Message as AxumMessage, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use devserve::config::{ContextSpec, DevServerConfig, ProxyConfig, ProxyEntry};
use devserve::dev::{BuildHandle, DevServer, DevServerHandle, LiveUpdateHub};
use devserve_store::MemoryStore;
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn local_config() -> DevServerConfig {
    let mut config = DevServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config
}

async fn start(config: DevServerConfig) -> (DevServerHandle, BuildHandle, LiveUpdateHub) {
    let server = DevServer::new(config, Arc::new(MemoryStore::new())).unwrap();
    let build = server.build_handle();
    let hub = server.hub().clone();
    let handle = server.start().await.unwrap();
    (handle, build, hub)
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .unwrap();
        if message.is_text() {
            return message.to_text().unwrap().to_string();
        }
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_capability_and_broadcasts() {
    let (handle, build, hub) = start(local_config()).await;

    let (mut client, _) = connect_async(handle.client_web_socket_url()).await.unwrap();
    assert_eq!(next_text(&mut client).await, r#"{"type":"hot"}"#);
    assert_eq!(hub.connection_count(), 1);

    build.complete();
    assert_eq!(next_text(&mut client).await, r#"{"type":"hot"}"#);

    build.fail("Module not found: ./missing");
    assert_eq!(
        next_text(&mut client).await,
        r#"{"type":"error","data":"Module not found: ./missing"}"#
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn test_live_reload_mode() {
    let mut config = local_config();
    config.hot = false;
    let (handle, build, _hub) = start(config).await;

    let (mut client, _) = connect_async(handle.client_web_socket_url()).await.unwrap();
    assert_eq!(next_text(&mut client).await, r#"{"type":"liveReload"}"#);

    build.complete();
    assert_eq!(next_text(&mut client).await, r#"{"type":"liveReload"}"#);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_foreign_origin_is_rejected() {
    let (handle, _build, hub) = start(local_config()).await;

    let mut request = handle
        .client_web_socket_url()
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Origin", "http://attacker.invalid".parse().unwrap());

    let (mut client, _) = connect_async(request).await.unwrap();
    assert_eq!(
        next_text(&mut client).await,
        r#"{"type":"error","data":"Invalid Host/Origin header"}"#
    );

    // Server closes right after the error
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(hub.connection_count(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_drops_silent_clients() {
    let mut config = local_config();
    config.heartbeat_interval_ms = 100;
    let (handle, _build, hub) = start(config).await;

    // Reading answers pings automatically
    let (mut responsive, _) = connect_async(handle.client_web_socket_url()).await.unwrap();
    next_text(&mut responsive).await;

    // Never read again, so pings go unanswered
    let (mut silent, _) = connect_async(handle.client_web_socket_url()).await.unwrap();
    next_text(&mut silent).await;
    assert_eq!(hub.connection_count(), 2);

    let reader = tokio::spawn(async move {
        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(600) {
            let _ = timeout(Duration::from_millis(10), responsive.next()).await;
        }
        responsive
    });

    let hub_view = hub.clone();
    wait_for(move || hub_view.connection_count() == 1).await;

    let _responsive = reader.await.unwrap();
    assert_eq!(hub.connection_count(), 1);

    drop(silent);
    handle.shutdown().await;
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let (handle, _build, hub) = start(local_config()).await;

    let (mut client, _) = connect_async(handle.client_web_socket_url()).await.unwrap();
    next_text(&mut client).await;

    handle.shutdown().await;
    assert_eq!(hub.connection_count(), 0);

    let ended = timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn test_websocket_proxy() {
    let upstream = Router::new().route(
        "/socket",
        get(|ws: WebSocketUpgrade| async move {
            ws.on_upgrade(|mut socket| async move {
                while let Some(Ok(message)) = socket.recv().await {
                    if let AxumMessage::Text(text) = message {
                        let reply = format!("echo: {}", text.as_str());
                        if socket.send(AxumMessage::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
            })
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.unwrap();
    });

    let mut config = local_config();
    config.proxy = Some(ProxyConfig::List(vec![ProxyEntry {
        context: ContextSpec::One("/socket".to_string()),
        target: format!("http://127.0.0.1:{}", upstream_port),
        change_origin: false,
        ws: true,
        path_rewrite: BTreeMap::new(),
    }]));
    let (handle, _build, _hub) = start(config).await;

    let url = format!("ws://127.0.0.1:{}/socket", handle.local_addr().port());
    let (mut client, _) = connect_async(url).await.unwrap();
    client.send(Message::Text("ping".into())).await.unwrap();
    assert_eq!(next_text(&mut client).await, "echo: ping");

    handle.shutdown().await;
}
