//! WebSocket hub pushing live update notifications to browsers.
//!
//! Each hub owns its connection registry and heartbeat task, so any number
//! of servers can run side by side in one process.
//!
//! # Heartbeat
//!
//! Every tick, a connection that has not answered the previous ping is
//! terminated; every other connection is marked not-alive and pinged. A
//! client that stops answering is therefore dropped exactly one interval
//! after its first unanswered ping, which is between one and two intervals
//! after its last pong.

use crate::config::LiveUpdateMode;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Message sent when a connection fails the Host/Origin check.
pub const INVALID_HOST_MESSAGE: &str = "Invalid Host/Origin header";

/// Server → client notification, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Hot updates are available
    Hot,
    /// Reload the page
    LiveReload,
    /// Build or protocol error
    Error(String),
}

impl ServerMessage {
    /// Capability announced to new connections for `mode`.
    pub fn capability(mode: LiveUpdateMode) -> Option<Self> {
        match mode {
            LiveUpdateMode::Hot => Some(ServerMessage::Hot),
            LiveUpdateMode::LiveReload => Some(ServerMessage::LiveReload),
            LiveUpdateMode::None => None,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a tagged enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Lifecycle of a hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Ping,
    Terminate,
}

#[derive(Debug)]
struct Connection {
    is_alive: Arc<AtomicBool>,
    state: ConnectionState,
    tx: mpsc::UnboundedSender<Outbound>,
}

#[derive(Debug)]
struct HubInner {
    mode: LiveUpdateMode,
    interval: Duration,
    next_id: AtomicU64,
    connections: Mutex<BTreeMap<u64, Connection>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// Live update hub. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct LiveUpdateHub {
    inner: Arc<HubInner>,
}

impl LiveUpdateHub {
    /// Create a hub announcing `mode` and heartbeating every `interval`.
    pub fn new(mode: LiveUpdateMode, interval: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                mode,
                interval,
                next_id: AtomicU64::new(0),
                connections: Mutex::new(BTreeMap::new()),
                heartbeat: Mutex::new(None),
            }),
        }
    }

    pub fn mode(&self) -> LiveUpdateMode {
        self.inner.mode
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.inner
            .connections
            .lock()
            .values()
            .filter(|connection| connection.state == ConnectionState::Open)
            .count()
    }

    /// State of connection `id`; `Closed` once it has been removed.
    pub fn connection_state(&self, id: u64) -> ConnectionState {
        self.inner
            .connections
            .lock()
            .get(&id)
            .map(|connection| connection.state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Start the heartbeat task. Calling it again is a no-op.
    pub fn start_heartbeat(&self) {
        let mut heartbeat = self.inner.heartbeat.lock();
        if heartbeat.is_some() {
            return;
        }

        let hub = self.clone();
        let interval = self.inner.interval;
        *heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                hub.heartbeat_tick();
            }
        }));
    }

    /// One heartbeat pass over every open connection.
    fn heartbeat_tick(&self) {
        let mut connections = self.inner.connections.lock();
        let mut dead = Vec::new();

        for (id, connection) in connections.iter_mut() {
            if connection.state != ConnectionState::Open {
                continue;
            }
            if !connection.is_alive.load(Ordering::Acquire) {
                let _ = connection.tx.send(Outbound::Terminate);
                connection.state = ConnectionState::Closed;
                dead.push(*id);
                continue;
            }
            connection.is_alive.store(false, Ordering::Release);
            let _ = connection.tx.send(Outbound::Ping);
        }

        for id in dead {
            connections.remove(&id);
            debug!(id, "terminated unresponsive live update connection");
        }
    }

    /// Complete a WebSocket upgrade.
    ///
    /// When `allowed` is false (failed Host/Origin check) the client gets an
    /// error message and the connection is closed.
    pub fn accept(&self, upgrade: WebSocketUpgrade, allowed: bool) -> Response {
        let hub = self.clone();
        upgrade.on_upgrade(move |socket| async move {
            if allowed {
                hub.serve(socket).await;
            } else {
                reject(socket).await;
            }
        })
    }

    /// Drive an accepted socket until it closes or is terminated.
    pub async fn serve(&self, mut socket: WebSocket) {
        let (id, is_alive, mut rx) = self.register();
        self.open(id);
        debug!(id, "live update client connected");

        loop {
            tokio::select! {
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Text(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Ping) => {
                        if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Terminate) | None => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Pong(_))) => is_alive.store(true, Ordering::Release),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Clients have nothing to say beyond ping/pong
                    Some(Ok(_)) => {}
                },
            }
        }

        self.inner.connections.lock().remove(&id);
        debug!(id, "live update client disconnected");
    }

    /// Add a connection in the `Connecting` state.
    ///
    /// Broadcasts skip it until [`open`](Self::open) runs, so the
    /// capability message is always the first thing a client receives.
    fn register(&self) -> (u64, Arc<AtomicBool>, mpsc::UnboundedReceiver<Outbound>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let is_alive = Arc::new(AtomicBool::new(true));

        self.inner.connections.lock().insert(
            id,
            Connection {
                is_alive: is_alive.clone(),
                state: ConnectionState::Connecting,
                tx,
            },
        );
        (id, is_alive, rx)
    }

    /// Queue the capability message and move a `Connecting` connection to
    /// `Open`. Returns false when it was closed in the meantime.
    fn open(&self, id: u64) -> bool {
        let mut connections = self.inner.connections.lock();
        let Some(connection) = connections.get_mut(&id) else {
            return false;
        };
        if connection.state != ConnectionState::Connecting {
            return false;
        }

        if let Some(capability) = ServerMessage::capability(self.inner.mode) {
            let _ = connection.tx.send(Outbound::Text(capability.to_json()));
        }
        connection.state = ConnectionState::Open;
        true
    }

    /// Queue `message` for connection `id`.
    ///
    /// The connection state is checked right before queueing, so a message
    /// racing a heartbeat termination is dropped instead of written to a
    /// closed socket. Returns whether the message was queued.
    pub fn send(&self, id: u64, message: &ServerMessage) -> bool {
        let connections = self.inner.connections.lock();
        match connections.get(&id) {
            Some(connection) if connection.state == ConnectionState::Open => connection
                .tx
                .send(Outbound::Text(message.to_json()))
                .is_ok(),
            _ => false,
        }
    }

    /// Send `message` to every open connection. Returns how many were reached.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = message.to_json();
        let connections = self.inner.connections.lock();
        let sent = connections
            .values()
            .filter(|connection| connection.state == ConnectionState::Open)
            .filter(|connection| connection.tx.send(Outbound::Text(text.clone())).is_ok())
            .count();
        debug!(message = %text, clients = sent, "broadcast");
        sent
    }

    /// Stop the heartbeat and terminate every connection.
    pub fn shutdown(&self) {
        if let Some(heartbeat) = self.inner.heartbeat.lock().take() {
            heartbeat.abort();
        }

        let mut connections = self.inner.connections.lock();
        for connection in connections.values_mut() {
            let _ = connection.tx.send(Outbound::Terminate);
            connection.state = ConnectionState::Closed;
        }
        let count = connections.len();
        connections.clear();
        if count > 0 {
            info!(count, "closed live update connections");
        }
    }
}

async fn reject(mut socket: WebSocket) {
    warn!("rejected live update connection with invalid Host/Origin header");
    let message = ServerMessage::Error(INVALID_HOST_MESSAGE.to_string()).to_json();
    let _ = socket.send(Message::Text(message.into())).await;
    let _ = socket.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json() {
        assert_eq!(ServerMessage::Hot.to_json(), r#"{"type":"hot"}"#);
        assert_eq!(ServerMessage::LiveReload.to_json(), r#"{"type":"liveReload"}"#);
        assert_eq!(
            ServerMessage::Error("boom".to_string()).to_json(),
            r#"{"type":"error","data":"boom"}"#
        );
    }

    #[test]
    fn test_capability_by_mode() {
        assert_eq!(
            ServerMessage::capability(LiveUpdateMode::Hot),
            Some(ServerMessage::Hot)
        );
        assert_eq!(
            ServerMessage::capability(LiveUpdateMode::LiveReload),
            Some(ServerMessage::LiveReload)
        );
        assert_eq!(ServerMessage::capability(LiveUpdateMode::None), None);
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let hub = LiveUpdateHub::new(LiveUpdateMode::Hot, Duration::from_secs(30));
        assert!(!hub.send(7, &ServerMessage::Hot));
        assert_eq!(hub.connection_state(7), ConnectionState::Closed);
        assert_eq!(hub.broadcast(&ServerMessage::Hot), 0);
    }

    #[test]
    fn test_heartbeat_marks_then_terminates() {
        let hub = LiveUpdateHub::new(LiveUpdateMode::Hot, Duration::from_secs(30));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let is_alive = Arc::new(AtomicBool::new(true));
        hub.inner.connections.lock().insert(
            1,
            Connection {
                is_alive: is_alive.clone(),
                state: ConnectionState::Open,
                tx,
            },
        );

        // First tick: alive → ping
        hub.heartbeat_tick();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Ping)));
        assert!(!is_alive.load(Ordering::Acquire));

        // Pong arrives, second tick pings again
        is_alive.store(true, Ordering::Release);
        hub.heartbeat_tick();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Ping)));
        assert_eq!(hub.connection_count(), 1);

        // No pong, third tick terminates
        hub.heartbeat_tick();
        assert!(matches!(rx.try_recv(), Ok(Outbound::Terminate)));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.connection_state(1), ConnectionState::Closed);
        assert!(!hub.send(1, &ServerMessage::Hot));
    }

    #[test]
    fn test_capability_precedes_broadcasts() {
        let hub = LiveUpdateHub::new(LiveUpdateMode::LiveReload, Duration::from_secs(30));
        let (id, _is_alive, mut rx) = hub.register();

        // Not announced yet: nothing is delivered
        assert_eq!(hub.connection_state(id), ConnectionState::Connecting);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.broadcast(&ServerMessage::Error("early".to_string())), 0);
        assert!(!hub.send(id, &ServerMessage::Hot));
        assert!(rx.try_recv().is_err());

        assert!(hub.open(id));
        assert_eq!(hub.connection_state(id), ConnectionState::Open);
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Text(text)) if text == r#"{"type":"liveReload"}"#
        ));

        assert_eq!(hub.broadcast(&ServerMessage::LiveReload), 1);
        assert!(!hub.open(id));
    }

    #[test]
    fn test_open_after_shutdown() {
        let hub = LiveUpdateHub::new(LiveUpdateMode::Hot, Duration::from_secs(30));
        let (id, _is_alive, mut rx) = hub.register();

        hub.shutdown();
        assert!(!hub.open(id));
        assert_eq!(hub.connection_state(id), ConnectionState::Closed);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Terminate)));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let hub = LiveUpdateHub::new(LiveUpdateMode::LiveReload, Duration::from_millis(10));
        hub.start_heartbeat();
        hub.start_heartbeat();
        hub.shutdown();
        hub.shutdown();
        assert_eq!(hub.connection_count(), 0);
    }
}
