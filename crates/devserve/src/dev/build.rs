//! Handle through which a builder reports build progress.

use crate::dev::gate::ReadinessGate;
use crate::dev::hub::{LiveUpdateHub, ServerMessage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Given to the builder integration: drives the readiness gate and tells
/// connected browsers about results.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    gate: Arc<ReadinessGate>,
    hub: LiveUpdateHub,
}

impl BuildHandle {
    pub fn new(gate: Arc<ReadinessGate>, hub: LiveUpdateHub) -> Self {
        Self { gate, hub }
    }

    /// A build started; hold new asset requests until it finishes.
    pub fn invalidate(&self) {
        debug!("build invalidated");
        self.gate.invalidate();
    }

    /// The build finished successfully.
    ///
    /// Releases waiting requests, then broadcasts `hot` or `liveReload`
    /// depending on the hub's mode (nothing when live updates are off).
    /// Returns the number of released requests.
    pub fn complete(&self) -> usize {
        let released = self.gate.mark_ready();
        if let Some(message) = ServerMessage::capability(self.hub.mode()) {
            self.hub.broadcast(&message);
        }
        released
    }

    /// The build failed.
    ///
    /// Waiting requests are released against whatever output the store
    /// holds, and clients receive the error.
    pub fn fail(&self, message: impl Into<String>) -> usize {
        let message = message.into();
        warn!(error = %message, "build failed");
        let released = self.gate.mark_ready();
        self.hub.broadcast(&ServerMessage::Error(message));
        released
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }
}
