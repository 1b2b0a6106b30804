//! Chat history: messages, logical ordering, and the append-only store
//!
//! The history is the single source of truth for rendering and for resuming
//! a session. Messages are created during dispatch, annotated at most once
//! before they are stored, and never deleted individually; only the whole
//! history can be cleared.

pub mod message;
pub mod store;

pub use message::{BatchClock, Message, MessageId};
pub use store::{Durability, HistoryStore};
