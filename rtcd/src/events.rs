//! Event broadcast for host status and progress updates.

use chrono::Utc;
use rtc_common::{CategoryProgress, HostId, TrafficLight};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

/// Why a progress watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Errored,
    Stopped,
}

/// Broadcast channel for daemon events (JSON lines).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl EventBus {
    /// Create a new event bus; the buffer never drops below `DEFAULT_BUFFER`.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event with payload.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }

    pub fn host_status(&self, host: &HostId, light: TrafficLight) {
        self.emit(
            "host_status",
            &json!({ "host": host, "status": light, "availability": light.availability() }),
        );
    }

    pub fn progress(&self, progress: &CategoryProgress) {
        self.emit("progress", progress);
    }

    pub fn watch_stopped(&self, host: &HostId, category: &str, reason: StopReason) {
        self.emit(
            "watch_stopped",
            &json!({ "host": host, "category": category, "reason": reason }),
        );
    }
}
