//! Key-value stores backing the arena session
//!
//! Values are JSON strings addressed by a fixed key. The backend only moves
//! raw strings; [`Storage`] layers typed access and change notification on
//! top of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::schema::StorageKey;
use crate::events::{ArenaEvent, SharedEventBus};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Raw string key-value backend
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replace the value stored under `key`
    fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// One JSON file per key inside a data directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Get the data directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        // Readers never observe a half-written file: last full write wins.
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;

        debug!(key, bytes = value.len(), path = %path.display(), "Value written");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write, as a full or locked browser store would
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is read-only".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_writable()?;
        let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_writable()?;
        let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Shared reference to Storage
pub type SharedStorage = Arc<Storage>;

/// Typed JSON access over a backend, announcing every write on the bus
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
    bus: SharedEventBus,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>, bus: SharedEventBus) -> Self {
        Self { backend, bus }
    }

    /// Create an in-memory storage
    pub fn in_memory(bus: SharedEventBus) -> Self {
        Self::new(Arc::new(MemoryStore::new()), bus)
    }

    /// Create a shared reference to this storage
    pub fn shared(self) -> SharedStorage {
        Arc::new(self)
    }

    /// The event bus write notifications go to
    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Load and deserialize a value.
    ///
    /// A stored value that no longer parses is treated as absent.
    pub fn load<T: DeserializeOwned>(&self, key: StorageKey) -> StoreResult<Option<T>> {
        let Some(raw) = self.backend.read(key.as_str())? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unparseable stored value");
                Ok(None)
            }
        }
    }

    /// Serialize and store a value, then notify observers
    pub fn save<T: Serialize>(&self, key: StorageKey, value: &T, origin: &str) -> StoreResult<()> {
        let raw =
            serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend.write(key.as_str(), &raw)?;
        self.notify(key, origin);
        Ok(())
    }

    /// Remove a value, then notify observers
    pub fn remove(&self, key: StorageKey, origin: &str) -> StoreResult<()> {
        self.backend.remove(key.as_str())?;
        self.notify(key, origin);
        Ok(())
    }

    fn notify(&self, key: StorageKey, origin: &str) {
        self.bus.publish(ArenaEvent::StorageChanged {
            key,
            origin: origin.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip_and_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("data")).unwrap();

        assert_eq!(store.read("arena.user").unwrap(), None);

        store.write("arena.user", "\"alice\"").unwrap();
        assert_eq!(store.read("arena.user").unwrap().as_deref(), Some("\"alice\""));

        store.write("arena.user", "\"bob\"").unwrap();
        assert_eq!(store.read("arena.user").unwrap().as_deref(), Some("\"bob\""));
        assert!(!store.dir().join("arena.user.json.tmp").exists());

        store.remove("arena.user").unwrap();
        store.remove("arena.user").unwrap();
        assert_eq!(store.read("arena.user").unwrap(), None);
    }

    #[test]
    fn test_memory_store_read_only() {
        let store = MemoryStore::new();
        store.write("k", "1").unwrap();

        store.set_read_only(true);
        assert!(matches!(store.write("k", "2"), Err(StoreError::Unavailable(_))));
        assert_eq!(store.read("k").unwrap().as_deref(), Some("1"));

        store.set_read_only(false);
        store.write("k", "2").unwrap();
        assert_eq!(store.read("k").unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_save_publishes_storage_changed() {
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let storage = Storage::in_memory(bus.clone());

        storage
            .save(StorageKey::Theme, &"light".to_string(), "tab-1")
            .unwrap();

        match rx.recv().await.unwrap() {
            ArenaEvent::StorageChanged { key, origin, .. } => {
                assert_eq!(key, StorageKey::Theme);
                assert_eq!(origin, "tab-1");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let theme: Option<String> = storage.load(StorageKey::Theme).unwrap();
        assert_eq!(theme.as_deref(), Some("light"));
    }

    #[test]
    fn test_unparseable_value_loads_as_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend.write(StorageKey::ChatHistory.as_str(), "{not json").unwrap();
        let storage = Storage::new(backend, EventBus::new().shared());

        let loaded: Option<Vec<String>> = storage.load(StorageKey::ChatHistory).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_failed_write_does_not_notify() {
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let backend = Arc::new(MemoryStore::new());
        backend.set_read_only(true);
        let storage = Storage::new(backend, bus);

        assert!(storage.save(StorageKey::CurrentUser, &"al", "tab").is_err());
        assert!(rx.try_recv().is_err());
    }
}
