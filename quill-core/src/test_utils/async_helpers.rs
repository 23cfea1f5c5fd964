//! Async test helpers

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use crate::core_collab::ServerEvent;

/// Default wait for an event that is expected to arrive
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Receive the next event from an outbox, or `None` on timeout or close
pub async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    duration: Duration,
) -> Option<ServerEvent> {
    timeout(duration, rx.recv()).await.ok().flatten()
}

/// Everything already queued, without waiting
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
