//! Append-only chat history with whole-sequence persistence

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::message::Message;
use crate::events::{ArenaEvent, TabId};
use crate::storage::{SharedStorage, StorageKey};

/// Whether the last write reached the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// The full sequence was written
    Persisted,
    /// The write failed; the change lives in memory for this session only
    SessionOnly,
}

impl Durability {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted)
    }
}

/// Ordered log of user and responder messages.
///
/// Appends re-read the persisted sequence first, so writes made by other
/// processes sharing the store are folded in rather than overwritten. Every
/// mutation rewrites the whole persisted sequence; only truly simultaneous
/// writers can lose each other's batch.
pub struct HistoryStore {
    messages: RwLock<Vec<Message>>,
    storage: SharedStorage,
    origin: TabId,
    /// Set while the in-memory sequence holds messages the store rejected
    unsynced: AtomicBool,
}

impl HistoryStore {
    /// Open the history persisted in `storage` on behalf of tab `origin`
    pub fn open(storage: SharedStorage, origin: impl Into<TabId>) -> Self {
        let messages = Self::read_persisted(&storage).unwrap_or_default();
        debug!(count = messages.len(), "History loaded");

        Self {
            messages: RwLock::new(messages),
            storage,
            origin: origin.into(),
            unsynced: AtomicBool::new(false),
        }
    }

    /// Append messages, persist the entire sequence, and notify observers
    pub fn append(&self, batch: Vec<Message>) -> Durability {
        let durability = {
            let mut messages = self.write_guard();
            self.refresh(&mut messages);
            messages.extend(batch.iter().cloned().map(Message::settled));
            self.persist(&messages)
        };

        debug!(appended = batch.len(), ?durability, "Messages appended");
        self.storage.bus().publish(ArenaEvent::MessagesAppended {
            origin: self.origin.clone(),
            messages: batch,
            timestamp: Utc::now(),
        });
        durability
    }

    /// Replace the whole sequence
    pub fn replace_all(&self, replacement: Vec<Message>) -> Durability {
        let mut messages = self.write_guard();
        *messages = replacement.into_iter().map(Message::settled).collect();
        self.persist(&messages)
    }

    /// Snapshot of the current sequence
    pub fn load_all(&self) -> Vec<Message> {
        self.read_guard().clone()
    }

    /// Reset to an empty sequence.
    ///
    /// Callers are responsible for having obtained the user's confirmation.
    pub fn clear(&self) -> Durability {
        let durability = {
            let mut messages = self.write_guard();
            messages.clear();
            self.persist(&messages)
        };

        info!(?durability, "History cleared");
        self.storage.bus().publish(ArenaEvent::HistoryCleared {
            origin: self.origin.clone(),
            timestamp: Utc::now(),
        });
        durability
    }

    /// Re-read the persisted sequence, e.g. after another tab wrote it.
    ///
    /// Keeps the in-memory sequence when the store cannot be read.
    /// Returns the number of messages after the reload.
    pub fn reload(&self) -> usize {
        let mut messages = self.write_guard();
        if !self.refresh(&mut messages) {
            warn!("History reload failed, keeping in-memory state");
        }
        messages.len()
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Timestamp of the newest message, if any
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.read_guard().iter().map(|m| m.timestamp).max()
    }

    /// Bring `messages` up to date with the persisted sequence.
    ///
    /// Local messages the store never accepted are kept after the persisted
    /// ones. An unreadable store leaves `messages` untouched and returns false.
    fn refresh(&self, messages: &mut Vec<Message>) -> bool {
        let Some(persisted) = Self::read_persisted(&self.storage) else {
            return false;
        };

        let local_only: Vec<Message> = if self.unsynced.load(Ordering::SeqCst) {
            let known: HashSet<&str> = persisted.iter().map(|m| m.id.as_str()).collect();
            messages
                .iter()
                .filter(|m| !known.contains(m.id.as_str()))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let external = persisted.len().saturating_sub(messages.len());
        *messages = persisted;
        messages.extend(local_only);
        if external > 0 {
            debug!(external, "Folded in history written elsewhere");
        }
        true
    }

    fn persist(&self, messages: &[Message]) -> Durability {
        match self
            .storage
            .save(StorageKey::ChatHistory, &messages, &self.origin)
        {
            Ok(()) => {
                self.unsynced.store(false, Ordering::SeqCst);
                Durability::Persisted
            }
            Err(e) => {
                warn!(error = %e, count = messages.len(), "Failed to persist history");
                self.unsynced.store(true, Ordering::SeqCst);
                Durability::SessionOnly
            }
        }
    }

    /// `None` when the store is unreadable; an absent key is an empty history
    fn read_persisted(storage: &SharedStorage) -> Option<Vec<Message>> {
        match storage.load::<Vec<Message>>(StorageKey::ChatHistory) {
            Ok(messages) => Some(messages.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted history");
                None
            }
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Vec<Message>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Vec<Message>> {
        self.messages.write().unwrap_or_else(PoisonError::into_inner)
    }
}
