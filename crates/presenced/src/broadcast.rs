//! Publish/subscribe fan-out of recorded attendance to live observers.
//!
//! Transport-agnostic: subscribers get a `broadcast::Receiver` and decide
//! how to deliver. Publishing never waits on a subscriber; one that falls
//! more than `capacity` events behind skips the oldest ones.

use presence_core::AttendanceEntry;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Payload of an `attendance-update` event.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: AttendanceEntry,
}

/// Camera status notice relayed between connected peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    #[serde(alias = "cctvId")]
    pub camera_id: String,
    pub status: String,
}

/// Everything fanned out to subscribers, in the `{event, data}` envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum BroadcastEvent {
    AttendanceUpdate(AttendanceUpdate),
    CctvStatusUpdate(CameraStatus),
}

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        tracing::info!(capacity, "broadcaster initialized");
        Self { tx }
    }

    /// Deliver to every subscriber connected right now. Returns how many
    /// received it; zero subscribers is not an error.
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    pub fn publish_attendance(&self, entry: AttendanceEntry) -> usize {
        self.publish(BroadcastEvent::AttendanceUpdate(AttendanceUpdate {
            kind: "new-attendance",
            data: entry,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
