//! Local key/value persistence.
//!
//! Values are plain strings, one file per key under the storage directory.
//! Persistence is best-effort: failures are logged and the caller carries on
//! with its in-memory state.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};

pub const REQUEST_COUNT_KEY: &str = "gemini_request_count";
pub const HISTORY_KEY: &str = "classifia_history";
pub const DARK_MODE_KEY: &str = "classifia_dark";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    /// Remove the key entirely. Removing an absent key is a no-op.
    fn remove(&self, key: &str);
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read stored '{key}': {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!("Failed to create storage dir {}: {e}", self.dir.display());
            return;
        }
        match fs::write(self.path(key), value) {
            Ok(()) => debug!("Stored '{key}' ({} bytes)", value.len()),
            Err(e) => warn!("Failed to store '{key}': {e}"),
        }
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.path(key)) {
            Ok(()) => debug!("Removed stored '{key}'"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove stored '{key}': {e}"),
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}
