//! Persistent key-value storage.
//!
//! Every key is namespaced under a fixed application prefix. The default
//! backend writes JSON files into the platform config directory
//! (`~/.config/hubline/` on Linux); tests inject [`MemoryStorage`] instead.
//! Writers do not coordinate: the credential store is deliberately
//! last-write-wins.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Namespace prefix applied to every stored key.
pub const STORAGE_PREFIX: &str = "hubline::";

/// Raw string storage backend. Injected into [`crate::CredentialStore`] so
/// tests never touch the filesystem.
pub trait KeyValueStorage: Send + Sync {
    /// Store a raw value. Returns `true` on success.
    fn save_raw(&self, key: &str, value: &str) -> bool;
    /// Load a raw value, `None` when absent.
    fn load_raw(&self, key: &str) -> Option<String>;
    /// Remove a key. Removing an absent key is not an error.
    fn remove_raw(&self, key: &str);
}

fn full_key(key: &str) -> String {
    format!("{STORAGE_PREFIX}{key}")
}

/// Save a raw string under the namespaced key.
pub fn save_str(store: &dyn KeyValueStorage, key: &str, value: &str) -> bool {
    store.save_raw(&full_key(key), value)
}

/// Load a raw string from the namespaced key.
pub fn load_str(store: &dyn KeyValueStorage, key: &str) -> Option<String> {
    store.load_raw(&full_key(key))
}

/// Save a serializable value as JSON.
pub fn save<T: Serialize>(store: &dyn KeyValueStorage, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => save_str(store, key, &json),
        Err(_) => false,
    }
}

/// Load a JSON value. `None` if the key doesn't exist or fails to parse.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let json = load_str(store, key)?;
    serde_json::from_str(&json).ok()
}

/// Remove a namespaced key.
pub fn remove(store: &dyn KeyValueStorage, key: &str) {
    store.remove_raw(&full_key(key));
}

/// Check whether a namespaced key exists.
pub fn exists(store: &dyn KeyValueStorage, key: &str) -> bool {
    load_str(store, key).is_some()
}

/// File-backed storage in the platform config directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) the application storage directory.
    pub fn new() -> Option<Self> {
        let dir = dirs::config_dir()?.join("hubline");
        if !dir.exists() {
            std::fs::create_dir_all(&dir).ok()?;
        }
        Some(Self { dir })
    }

    /// Storage rooted at an explicit directory.
    pub fn at(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize the key to a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        std::fs::write(self.file_path(key), value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.file_path(key)).ok()
    }

    fn remove_raw(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }
}

/// In-process storage for tests.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn save_raw(&self, key: &str, value: &str) -> bool {
        self.map
            .lock()
            .expect("storage lock poisoned")
            .insert(key.to_string(), value.to_string());
        true
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        self.map
            .lock()
            .expect("storage lock poisoned")
            .get(key)
            .cloned()
    }

    fn remove_raw(&self, key: &str) {
        self.map
            .lock()
            .expect("storage lock poisoned")
            .remove(key);
    }
}
