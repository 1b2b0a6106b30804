//! Fixed key names for the persistence boundary
//!
//! Each key holds one JSON-serialized value. Writes to the chat-history key
//! are what other tabs watch for.

use serde::{Deserialize, Serialize};

/// Key for the current user identity
pub const KEY_CURRENT_USER: &str = "arena.user";

/// Key for the full chat history
pub const KEY_CHAT_HISTORY: &str = "arena.chat_history";

/// Key for the theme preference
pub const KEY_THEME: &str = "arena.theme";

/// All key names
pub const ALL_KEYS: &[&str] = &[KEY_CURRENT_USER, KEY_CHAT_HISTORY, KEY_THEME];

/// The three persisted values of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKey {
    CurrentUser,
    ChatHistory,
    Theme,
}

impl StorageKey {
    /// The key name as stored in the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => KEY_CURRENT_USER,
            Self::ChatHistory => KEY_CHAT_HISTORY,
            Self::Theme => KEY_THEME,
        }
    }

    /// All keys
    pub fn all() -> &'static [StorageKey] {
        &[Self::CurrentUser, Self::ChatHistory, Self::Theme]
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
