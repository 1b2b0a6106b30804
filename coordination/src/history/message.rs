//! Chat message type and the logical clock that orders it

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for messages
pub type MessageId = String;

/// Discriminator used in ids of user-authored messages
const USER_DISCRIMINATOR: &str = "user";

/// One entry of the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// `{timestamp}-{discriminator}`, unique across the whole history
    pub id: MessageId,

    /// User display name or responder display name
    pub sender: String,

    /// Reply or query text; responder output may carry simple markup
    pub text: String,

    /// Logical ordering key in milliseconds
    pub timestamp: i64,

    /// Set only on responder messages that were just produced
    #[serde(default)]
    pub is_fresh: bool,

    /// Divergence note attached by the annotator, at most once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,

    /// Registry id of the responder that produced this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_id: Option<String>,
}

impl Message {
    /// Create a user message
    pub fn from_user(sender: impl Into<String>, text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: format!("{timestamp}-{USER_DISCRIMINATOR}"),
            sender: sender.into(),
            text: text.into(),
            timestamp,
            is_fresh: false,
            annotation: None,
            responder_id: None,
        }
    }

    /// Create a fresh responder message for position `index` of a batch.
    ///
    /// All messages of a batch share `batch_timestamp` in their id and are
    /// ordered by `batch_timestamp + index`.
    pub fn from_responder(
        responder_id: &str,
        display_name: &str,
        text: impl Into<String>,
        batch_timestamp: i64,
        index: usize,
    ) -> Self {
        Self {
            id: format!("{batch_timestamp}-{responder_id}"),
            sender: display_name.to_string(),
            text: text.into(),
            timestamp: batch_timestamp + index as i64,
            is_fresh: true,
            annotation: None,
            responder_id: Some(responder_id.to_string()),
        }
    }

    /// Attach an annotation unless one is already set.
    ///
    /// Returns whether the annotation was attached.
    pub fn annotate(&mut self, note: impl Into<String>) -> bool {
        if self.annotation.is_some() {
            return false;
        }
        self.annotation = Some(note.into());
        true
    }

    /// Whether a responder produced this message
    pub fn is_from_responder(&self) -> bool {
        self.responder_id.is_some()
    }

    /// The same message with the fresh flag cleared
    pub fn settled(mut self) -> Self {
        self.is_fresh = false;
        self
    }

    /// Wall-clock view of the logical timestamp
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }
}

/// Hands out strictly increasing millisecond slots.
///
/// Follows wall-clock time but never moves backwards or repeats, so ids
/// built from a reserved slot stay unique even when two batches land in
/// the same millisecond.
#[derive(Debug, Default)]
pub struct BatchClock {
    last: AtomicI64,
}

impl BatchClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock that never hands out `last` or anything before it
    pub fn seeded(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Make sure future slots come after `timestamp`
    pub fn observe(&self, timestamp: i64) {
        self.last.fetch_max(timestamp, Ordering::SeqCst);
    }

    /// Reserve `slots` consecutive timestamps and return the first one
    pub fn reserve(&self, slots: usize) -> i64 {
        let span = slots.max(1) as i64;
        let now = Utc::now().timestamp_millis();
        let mut current = self.last.load(Ordering::SeqCst);
        loop {
            let base = now.max(current + 1);
            match self.last.compare_exchange(
                current,
                base + span - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return base,
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_and_responder_ids() {
        let user = Message::from_user("alice", "hi", 1_000);
        assert_eq!(user.id, "1000-user");
        assert!(!user.is_fresh);
        assert!(!user.is_from_responder());

        let reply = Message::from_responder("gemini", "Gemini", "hello", 2_000, 1);
        assert_eq!(reply.id, "2000-gemini");
        assert_eq!(reply.timestamp, 2_001);
        assert_eq!(reply.sender, "Gemini");
        assert!(reply.is_fresh);
        assert!(reply.is_from_responder());
    }

    #[test]
    fn test_annotation_is_never_overwritten() {
        let mut msg = Message::from_responder("grok", "Grok", "yo", 10, 0);
        assert!(msg.annotate("first"));
        assert!(!msg.annotate("second"));
        assert_eq!(msg.annotation.as_deref(), Some("first"));
    }

    #[test]
    fn test_serialized_form_is_camel_case() {
        let mut msg = Message::from_responder("chatgpt", "ChatGPT", "text", 5, 0);
        msg.annotate("note");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"isFresh\":true"));
        assert!(json.contains("\"responderId\":\"chatgpt\""));

        let legacy = r#"{"id":"1-user","sender":"bob","text":"x","timestamp":1}"#;
        let parsed: Message = serde_json::from_str(legacy).unwrap();
        assert!(!parsed.is_fresh);
        assert!(parsed.annotation.is_none());
    }

    #[test]
    fn test_settled_clears_fresh_flag_only() {
        let msg = Message::from_responder("grok", "Grok", "yo", 10, 2).settled();
        assert!(!msg.is_fresh);
        assert_eq!(msg.timestamp, 12);
    }

    #[test]
    fn test_clock_reservations_never_overlap() {
        let clock = BatchClock::new();
        let first = clock.reserve(4);
        let second = clock.reserve(1);
        let third = clock.reserve(4);
        assert!(second >= first + 4);
        assert!(third > second);
    }

    #[test]
    fn test_seeded_clock_skips_past_future_timestamps() {
        let far_future = Utc::now().timestamp_millis() + 60_000;
        let clock = BatchClock::seeded(far_future);
        assert_eq!(clock.reserve(2), far_future + 1);
        assert_eq!(clock.reserve(1), far_future + 3);

        clock.observe(far_future + 100);
        assert_eq!(clock.reserve(1), far_future + 101);
    }
}
