use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::messaging::GenericEvent;
use crate::routing::{EventHandler, HandlerError};

/// Catch-all that logs every event it sees. Never fails, whatever the body.
#[derive(Default)]
pub struct DebugLogHandler {
    seen: AtomicU64,
}

impl DebugLogHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bodies logged so far
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for DebugLogHandler {
    fn name(&self) -> &str {
        "debug_log"
    }

    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        match serde_json::from_slice::<GenericEvent>(body) {
            Ok(event) => tracing::debug!(event_type = %event.event_type, "Received event"),
            Err(e) => tracing::debug!(error = %e, "Event body is not a known envelope"),
        }

        tracing::debug!(raw = %String::from_utf8_lossy(body), "Raw event");
        self.seen.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
