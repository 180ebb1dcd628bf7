//! Event bus for sdnet events.
//!
//! Provides a publish/subscribe mechanism for network lifecycle changes
//! and workload attachments.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe(vec!["network.*".to_string()]);
//!
//! bus.publish(Event::new(EventType::NetworkReady, "net-a", "Network net-a is ready"));
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{}: {}", event.event_type, event.resource_id);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    NetworkAllocated,
    NetworkReady,
    NetworkFailed,
    NetworkProvisioned,
    WorkloadAttached,
}

impl EventType {
    /// Dotted name used for filtering (e.g., "network.ready").
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NetworkAllocated => "network.allocated",
            EventType::NetworkReady => "network.ready",
            EventType::NetworkFailed => "network.failed",
            EventType::NetworkProvisioned => "network.provisioned",
            EventType::WorkloadAttached => "workload.attached",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An sdnet event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    /// Network or workload ID, depending on the event type
    pub resource_id: String,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: SystemTime,
}

impl Event {
    pub fn new(event_type: EventType, resource_id: &str, message: &str) -> Self {
        Self {
            event_type,
            resource_id: resource_id.to_string(),
            message: message.to_string(),
            metadata: BTreeMap::new(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// `"network.ready"` matches itself, `"network.*"` matches every network event.
fn pattern_matches(pattern: &str, event_type: EventType) -> bool {
    let name = event_type.as_str();
    match pattern.strip_suffix(".*") {
        Some(prefix) => name.split('.').next() == Some(prefix),
        None => pattern == name,
    }
}

/// Broadcast bus shared by the coordinator and every agent.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish an event; dropped silently when nobody listens.
    pub fn publish(&self, event: Event) {
        debug!(event_type = %event.event_type, resource_id = %event.resource_id, "Publishing event");
        let _ = self.sender.send(event);
    }

    /// Subscribe to events matching any of `filters` (all events when empty).
    pub fn subscribe(&self, filters: Vec<String>) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe(), filters }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<Event>,
    filters: Vec<String>,
}

impl EventSubscriber {
    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(event.event_type) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Event subscriber lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn wants(&self, event_type: EventType) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| pattern_matches(f, event_type))
    }
}
