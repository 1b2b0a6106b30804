//! Persistence boundary for the arena
//!
//! A key-value store addressed by three fixed keys (current user, full chat
//! history, theme preference), each holding a JSON-serialized value. This
//! plays the role a browser origin's local storage plays for a web client.
//!
//! # Usage
//!
//! ```ignore
//! use coordination::storage::{FileStore, Storage, StorageKey};
//!
//! let storage = Storage::new(Arc::new(FileStore::open("./arena-data")?), bus).shared();
//! storage.save(StorageKey::Theme, &"dark", &tab_id)?;
//! let theme: Option<String> = storage.load(StorageKey::Theme)?;
//! ```

pub mod schema;
pub mod store;

pub use schema::StorageKey;
pub use store::{
    FileStore, KeyValueStore, MemoryStore, SharedStorage, Storage, StoreError, StoreResult,
};
