//! AI Arena coordination library
//!
//! This library provides:
//! - Concurrent fan-out of one user query to N responder personas
//! - Lexical divergence detection that annotates contested replies
//! - An append-only chat history persisted as a whole and shared across tabs
//! - A provider proxy serving one completion route per responder
//!
//! # Flow
//!
//! ```text
//! send(query) -> DispatchGate -> DispatchCoordinator (join over N responders)
//!             -> DivergenceAnnotator -> HistoryStore (persist + notify)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use coordination::{ArenaConfig, ArenaSession, EventBus, FileStore, Storage};
//!
//! let config = ArenaConfig::load(None)?;
//! let bus = EventBus::new().shared();
//! let storage = Storage::new(Arc::new(FileStore::open(&config.data_dir)?), bus).shared();
//! let session = ArenaSession::open(&config, config.build_registry()?, storage);
//!
//! session.login("alice")?;
//! let report = session.send("Why is the sky blue?").await?;
//! ```

pub mod config;
pub mod dispatch;
pub mod divergence;
pub mod events;
pub mod history;
pub mod proxy;
pub mod registry;
pub mod responder;
pub mod session;
pub mod storage;

// Re-export configuration types
pub use config::{ArenaConfig, ConfigError, Credentials, DispatchSection, Transport};

// Re-export dispatch types
pub use dispatch::{
    DispatchConfig, DispatchCoordinator, DispatchGate, DispatchReport, GatePass,
    SharedDispatchCoordinator,
};

// Re-export divergence types
pub use divergence::{similarity, tokenize, DivergenceAnnotator, DIVERGENCE_THRESHOLD};

// Re-export key event types
pub use events::{
    ArenaEvent, EventBus, EventBusExt, EventFilter, FilteredReceiver, ResponderStatus,
    SharedEventBus, TabId,
};

// Re-export history types
pub use history::{BatchClock, Durability, HistoryStore, Message, MessageId};

// Re-export proxy types
pub use proxy::{ProviderClient, ProviderError, ProviderKind, ProxyState};

// Re-export registry types
pub use registry::{RegistryError, Responder, ResponderRegistry, ResponderSpec};

// Re-export responder capability types
pub use responder::{HttpResponder, ResponderClient, ResponderError};

// Re-export session types
pub use session::{ArenaSession, SessionError, Theme, MIN_USERNAME_CHARS};

// Re-export storage types
pub use storage::{
    FileStore, KeyValueStore, MemoryStore, SharedStorage, Storage, StorageKey, StoreError,
};
