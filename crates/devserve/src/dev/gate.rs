//! Readiness gate holding requests until the current build has finished.
//!
//! Serving a half-written bundle is worse than waiting, so requests that
//! arrive while a build is running are parked here with no timeout and
//! released in arrival order once the builder reports completion.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::debug;

/// Whether the latest build has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// A build is running (or none has completed yet)
    NotReady,
    /// Output in the store is complete
    Ready,
}

/// A request parked until the next ready transition.
#[derive(Debug)]
pub struct PendingRequest {
    /// URL the request was made for (diagnostics only)
    pub url: String,
    resolve: oneshot::Sender<()>,
}

#[derive(Debug)]
struct GateInner {
    state: BuildState,
    pending: VecDeque<PendingRequest>,
}

/// FIFO gate in front of asset serving.
#[derive(Debug)]
pub struct ReadinessGate {
    inner: Mutex<GateInner>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    /// Create a gate in the `NotReady` state.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: BuildState::NotReady,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Current build state.
    pub fn state(&self) -> BuildState {
        self.inner.lock().state
    }

    /// Check if the gate lets requests through.
    pub fn is_ready(&self) -> bool {
        self.state() == BuildState::Ready
    }

    /// Number of requests currently parked.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// URLs of parked requests, oldest first.
    pub fn pending_urls(&self) -> Vec<String> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    /// Wait until the gate is ready.
    ///
    /// Returns immediately when the gate is already `Ready`. Otherwise the
    /// caller is queued and suspended until [`mark_ready`](Self::mark_ready)
    /// releases it. There is no timeout.
    pub async fn wait_until_ready(&self, url: &str) {
        let released = {
            let mut inner = self.inner.lock();
            if inner.state == BuildState::Ready {
                return;
            }

            let (resolve, released) = oneshot::channel();
            inner.pending.push_back(PendingRequest {
                url: url.to_string(),
                resolve,
            });
            debug!(url, queued = inner.pending.len(), "waiting for build");
            released
        };

        // A dropped sender means the gate itself went away; nothing to wait for.
        let _ = released.await;
    }

    /// Transition to `Ready` and release every parked request in FIFO order.
    ///
    /// Returns how many requests were released. Each request is released
    /// exactly once; entries whose client has since disconnected are
    /// released as a no-op.
    pub fn mark_ready(&self) -> usize {
        let released: Vec<PendingRequest> = {
            let mut inner = self.inner.lock();
            inner.state = BuildState::Ready;
            inner.pending.drain(..).collect()
        };

        let count = released.len();
        for request in released {
            if request.resolve.send(()).is_err() {
                debug!(url = %request.url, "client gone before build finished");
            }
        }

        if count > 0 {
            debug!(count, "released waiting requests");
        }
        count
    }

    /// Reset to `NotReady`; new requests queue until the next `mark_ready`.
    pub fn invalidate(&self) {
        self.inner.lock().state = BuildState::NotReady;
    }
}
