//! Event bus for arena observers
//!
//! Provides pub/sub messaging using Tokio broadcast channels. Publishing is
//! fire-and-forget: a bus without subscribers accepts events and drops them.
//! Slow subscribers may lag and miss events; nothing in the core depends on
//! an event being observed.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ArenaEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ArenaEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a custom channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: ArenaEvent) -> usize {
        let event_type = event.event_type();

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events from this tab
    pub origin: Option<String>,
    /// Skip events from this tab
    pub exclude_origin: Option<String>,
    /// Only events with these types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by originating tab
    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    /// Drop events raised by the given tab
    pub fn exclude_origin(mut self, origin: &str) -> Self {
        self.exclude_origin = Some(origin.to_string());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ArenaEvent) -> bool {
        if let Some(ref origin) = self.origin {
            if event.origin() != origin.as_str() {
                return false;
            }
        }

        if let Some(ref excluded) = self.exclude_origin {
            if event.origin() == excluded.as_str() {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<ArenaEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<ArenaEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<ArenaEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ResponderStatus;
    use crate::storage::StorageKey;
    use chrono::Utc;

    fn status_event(id: &str) -> ArenaEvent {
        status_event_from("tab-a", id)
    }

    fn status_event_from(origin: &str, id: &str) -> ArenaEvent {
        ArenaEvent::ResponderStatus {
            origin: origin.to_string(),
            responder_id: id.to_string(),
            status: ResponderStatus::Thinking,
            timestamp: Utc::now(),
        }
    }

    fn storage_event(origin: &str) -> ArenaEvent {
        ArenaEvent::StorageChanged {
            key: StorageKey::ChatHistory,
            origin: origin.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(status_event("chatgpt"));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "responder_status");
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        assert_eq!(bus.publish(status_event("gemini")), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.publish(storage_event("tab-a")), 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();

        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .exclude_origin("tab-a")
            .types(vec!["storage_changed"]);

        assert!(filter.matches(&storage_event("tab-b")));
        assert!(!filter.matches(&storage_event("tab-a")));
        assert!(!filter.matches(&status_event("grok")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().origin("tab-b"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(storage_event("tab-a"));
            publisher.publish(storage_event("tab-b"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.origin(), "tab-b");
    }

    #[test]
    fn test_status_events_are_scoped_by_origin() {
        let own = EventFilter::new().origin("tab-a");
        assert!(own.matches(&status_event_from("tab-a", "grok")));
        assert!(!own.matches(&status_event_from("tab-b", "grok")));

        let others = EventFilter::new().exclude_origin("tab-a");
        assert!(!others.matches(&status_event_from("tab-a", "gemini")));
        assert!(others.matches(&status_event_from("tab-b", "gemini")));
    }
}
