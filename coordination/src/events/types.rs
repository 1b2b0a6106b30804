//! Event types for the arena
//!
//! Events are the side channel between the data-producing core (dispatch,
//! annotation, history) and its observers (render layer, other tabs).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::Message;
use crate::storage::StorageKey;

/// Identifier of one running session ("tab") sharing the same storage
pub type TabId = String;

/// Transient activity state of a single responder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderStatus {
    /// A request to the responder is in flight
    Thinking,
    /// No request in flight
    Idle,
}

impl std::fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thinking => write!(f, "thinking"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// All arena events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// A responder changed activity state
    ResponderStatus {
        origin: TabId,
        responder_id: String,
        status: ResponderStatus,
        timestamp: DateTime<Utc>,
    },

    /// A query is being fanned out to every responder
    DispatchStarted {
        origin: TabId,
        query_preview: String,
        responders: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Every responder of a batch has resolved
    DispatchCompleted {
        origin: TabId,
        batch_size: usize,
        failures: Vec<String>,
        annotated: usize,
        timestamp: DateTime<Utc>,
    },

    /// Messages were appended to a history.
    ///
    /// This is the only place the fresh flag survives, so observers can run
    /// one-shot effects (notification sound) exactly once per message.
    MessagesAppended {
        origin: TabId,
        messages: Vec<Message>,
        timestamp: DateTime<Utc>,
    },

    /// The whole history was replaced with an empty sequence
    HistoryCleared {
        origin: TabId,
        timestamp: DateTime<Utc>,
    },

    /// A persisted key was written
    StorageChanged {
        key: StorageKey,
        origin: TabId,
        timestamp: DateTime<Utc>,
    },

    /// The theme preference changed
    ThemeChanged {
        origin: TabId,
        theme: String,
        timestamp: DateTime<Utc>,
    },
}

impl ArenaEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ResponderStatus { .. } => "responder_status",
            Self::DispatchStarted { .. } => "dispatch_started",
            Self::DispatchCompleted { .. } => "dispatch_completed",
            Self::MessagesAppended { .. } => "messages_appended",
            Self::HistoryCleared { .. } => "history_cleared",
            Self::StorageChanged { .. } => "storage_changed",
            Self::ThemeChanged { .. } => "theme_changed",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ResponderStatus { timestamp, .. }
            | Self::DispatchStarted { timestamp, .. }
            | Self::DispatchCompleted { timestamp, .. }
            | Self::MessagesAppended { timestamp, .. }
            | Self::HistoryCleared { timestamp, .. }
            | Self::StorageChanged { timestamp, .. }
            | Self::ThemeChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the originating tab
    pub fn origin(&self) -> &str {
        match self {
            Self::ResponderStatus { origin, .. }
            | Self::DispatchStarted { origin, .. }
            | Self::DispatchCompleted { origin, .. }
            | Self::MessagesAppended { origin, .. }
            | Self::HistoryCleared { origin, .. }
            | Self::StorageChanged { origin, .. }
            | Self::ThemeChanged { origin, .. } => origin.as_str(),
        }
    }

    /// Get the responder ID, if the event concerns a single responder
    pub fn responder_id(&self) -> Option<&str> {
        match self {
            Self::ResponderStatus { responder_id, .. } => Some(responder_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ArenaEvent::ResponderStatus {
            origin: "tab-1".to_string(),
            responder_id: "grok".to_string(),
            status: ResponderStatus::Thinking,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"responder_status\""));
        assert!(json.contains("\"status\":\"thinking\""));

        let parsed: ArenaEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "responder_status");
        assert_eq!(parsed.responder_id(), Some("grok"));
        assert_eq!(parsed.origin(), "tab-1");
    }

    #[test]
    fn test_storage_event_origin() {
        let event = ArenaEvent::StorageChanged {
            key: StorageKey::ChatHistory,
            origin: "tab-1".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.origin(), "tab-1");
        assert_eq!(event.event_type(), "storage_changed");
    }
}
