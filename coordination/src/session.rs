//! Arena session - explicit context for one client tab
//!
//! Owns everything a running tab needs: identity, theme, responder roster,
//! dispatch machinery and the history. Nothing lives at process scope, so
//! several sessions can share one storage and event bus and see each other's
//! writes as separate tabs would.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ArenaConfig;
use crate::dispatch::{DispatchCoordinator, DispatchGate, DispatchReport};
use crate::divergence::DivergenceAnnotator;
use crate::events::{ArenaEvent, EventBusExt, EventFilter, TabId};
use crate::history::{BatchClock, Durability, HistoryStore, Message};
use crate::registry::ResponderRegistry;
use crate::storage::{SharedStorage, StorageKey};

/// Minimum length of a display name, in characters
pub const MIN_USERNAME_CHARS: usize = 2;

/// Characters of the query carried on the dispatch-started event
const QUERY_PREVIEW_CHARS: usize = 80;

/// Errors surfaced to the user by session operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("A dispatch is already in progress")]
    Busy,
}

/// Color scheme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark => write!(f, "dark"),
            Self::Light => write!(f, "light"),
        }
    }
}

impl FromStr for Theme {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(SessionError::Validation(format!("Unknown theme: {other}"))),
        }
    }
}

/// One client tab's view of the arena
pub struct ArenaSession {
    tab_id: TabId,
    registry: ResponderRegistry,
    coordinator: DispatchCoordinator,
    annotator: DivergenceAnnotator,
    history: HistoryStore,
    gate: DispatchGate,
    clock: BatchClock,
    storage: SharedStorage,
    user: RwLock<Option<String>>,
    theme: RwLock<Theme>,
}

impl ArenaSession {
    /// Open a session over `storage`, restoring user, theme and history
    pub fn open(config: &ArenaConfig, registry: ResponderRegistry, storage: SharedStorage) -> Self {
        let tab_id = uuid::Uuid::new_v4().to_string();
        let history = HistoryStore::open(storage.clone(), tab_id.clone());
        let clock = BatchClock::seeded(history.latest_timestamp().unwrap_or_default());
        let coordinator = DispatchCoordinator::new(
            storage.bus().clone(),
            tab_id.clone(),
            config.dispatch_config(),
        );

        let user = load_or_default::<Option<String>>(&storage, StorageKey::CurrentUser);
        let theme = load_or_default::<Theme>(&storage, StorageKey::Theme);

        info!(
            tab = %tab_id,
            user = ?user,
            %theme,
            messages = history.len(),
            responders = registry.len(),
            "Session opened"
        );

        Self {
            tab_id,
            registry,
            coordinator,
            annotator: DivergenceAnnotator::default(),
            history,
            gate: DispatchGate::new(),
            clock,
            storage,
            user: RwLock::new(user),
            theme: RwLock::new(theme),
        }
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn registry(&self) -> &ResponderRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn current_user(&self) -> Option<String> {
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn theme(&self) -> Theme {
        *self.theme.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a dispatch is in flight
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Set the display name for this and future sessions
    pub fn login(&self, name: &str) -> Result<Durability, SessionError> {
        let name = name.trim();
        if name.chars().count() < MIN_USERNAME_CHARS {
            return Err(SessionError::Validation(format!(
                "Username must be at least {MIN_USERNAME_CHARS} characters"
            )));
        }

        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        info!(tab = %self.tab_id, user = name, "Logged in");
        Ok(self.persist(StorageKey::CurrentUser, &name))
    }

    /// Forget the identity; history is kept
    pub fn logout(&self) -> Durability {
        self.user.write().unwrap_or_else(PoisonError::into_inner).take();
        info!(tab = %self.tab_id, "Logged out");

        match self.storage.remove(StorageKey::CurrentUser, &self.tab_id) {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                warn!(error = %e, "Failed to remove persisted user");
                Durability::SessionOnly
            }
        }
    }

    /// Send `query` to every responder and record the batch.
    ///
    /// Rejected without side effects when the query is blank, nobody is
    /// logged in, or another dispatch is still in flight.
    pub async fn send(&self, query: &str) -> Result<DispatchReport, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::Validation("Message must not be empty".to_string()));
        }
        let sender = self.current_user().ok_or(SessionError::NotLoggedIn)?;
        let _pass = self.gate.try_acquire().ok_or(SessionError::Busy)?;

        // Pick up batches other processes wrote since the last read.
        self.history.reload();
        if let Some(latest) = self.history.latest_timestamp() {
            self.clock.observe(latest);
        }

        // One slot for the user message, then one per responder.
        let base = self.clock.reserve(1 + self.registry.len());
        self.history.append(vec![Message::from_user(&sender, query, base)]);

        self.storage.bus().publish(ArenaEvent::DispatchStarted {
            origin: self.tab_id.clone(),
            query_preview: query.chars().take(QUERY_PREVIEW_CHARS).collect(),
            responders: self.registry.ids(),
            timestamp: Utc::now(),
        });

        let context = self.history.load_all();
        let mut report = self
            .coordinator
            .dispatch_with_report(query, self.registry.as_slice(), &context, base + 1)
            .await;

        let annotated = self.annotator.annotate(&mut report.messages);
        self.history.append(report.messages.clone());

        self.storage.bus().publish(ArenaEvent::DispatchCompleted {
            origin: self.tab_id.clone(),
            batch_size: report.messages.len(),
            failures: report.failures.clone(),
            annotated,
            timestamp: Utc::now(),
        });

        Ok(report)
    }

    /// Clear the whole history if `confirm` agrees. Returns whether it did.
    pub fn clear_history(&self, confirm: impl FnOnce() -> bool) -> bool {
        if !confirm() {
            debug!(tab = %self.tab_id, "History clear declined");
            return false;
        }
        self.history.clear();
        true
    }

    pub fn set_theme(&self, theme: Theme) -> Durability {
        *self.theme.write().unwrap_or_else(PoisonError::into_inner) = theme;
        self.storage.bus().publish(ArenaEvent::ThemeChanged {
            origin: self.tab_id.clone(),
            theme: theme.to_string(),
            timestamp: Utc::now(),
        });
        self.persist(StorageKey::Theme, &theme)
    }

    /// Flip between dark and light, returning the new theme
    pub fn toggle_theme(&self) -> Theme {
        let theme = self.theme().toggled();
        self.set_theme(theme);
        theme
    }

    /// Keep this session in step with writes from other tabs.
    ///
    /// The task holds only a weak reference and ends once the session is
    /// dropped and another event arrives, or when the bus closes.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let filter = EventFilter::new()
            .exclude_origin(&self.tab_id)
            .types(vec!["storage_changed"]);
        let mut events = self.storage.bus().subscribe_filtered(filter);
        let session: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let key = match events.recv().await {
                    Ok(ArenaEvent::StorageChanged { key, .. }) => Some(key),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Sync fell behind, reloading everything");
                        None
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(session) = session.upgrade() else {
                    break;
                };
                match key {
                    Some(key) => session.apply_remote_change(key),
                    None => StorageKey::all()
                        .iter()
                        .for_each(|&key| session.apply_remote_change(key)),
                }
            }
        })
    }

    /// Re-read `key` after another tab wrote it
    pub fn apply_remote_change(&self, key: StorageKey) {
        match key {
            StorageKey::ChatHistory => {
                let count = self.history.reload();
                if let Some(latest) = self.history.latest_timestamp() {
                    self.clock.observe(latest);
                }
                debug!(tab = %self.tab_id, count, "History synced from another tab");
            }
            StorageKey::CurrentUser => {
                let user = load_or_default::<Option<String>>(&self.storage, key);
                *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
            }
            StorageKey::Theme => {
                let theme = load_or_default::<Theme>(&self.storage, key);
                *self.theme.write().unwrap_or_else(PoisonError::into_inner) = theme;
            }
        }
    }

    fn persist<T: Serialize>(&self, key: StorageKey, value: &T) -> Durability {
        match self.storage.save(key, value, &self.tab_id) {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist, keeping session value");
                Durability::SessionOnly
            }
        }
    }
}

fn load_or_default<T>(storage: &SharedStorage, key: StorageKey) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match storage.load::<T>(key) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read stored value");
            T::default()
        }
    }
}
