//! Recent classification history.
//!
//! Newest first, capped at [`HISTORY_LIMIT`] entries, mirrored to the local
//! store as a JSON array of `{object, result}` after every mutation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{KeyValueStore, HISTORY_KEY};

pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub object: String,
    pub result: String,
}

impl HistoryEntry {
    pub fn new(object: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            result: result.into(),
        }
    }
}

pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    store: Arc<dyn KeyValueStore>,
}

impl HistoryStore {
    /// Restore the persisted history. A malformed value counts as empty.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match store.get(HISTORY_KEY) {
            Some(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(mut entries) => {
                    entries.truncate(HISTORY_LIMIT);
                    debug!("Loaded {} history entries", entries.len());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring malformed stored history: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Self { entries, store }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_LIMIT);
        self.persist();
    }

    /// Empty the history and drop the persisted key altogether.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.store.remove(HISTORY_KEY);
    }

    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) {
        match serde_json::to_string(&self.entries) {
            Ok(json) => self.store.set(HISTORY_KEY, &json),
            Err(e) => warn!("Failed to serialize history: {e}"),
        }
    }
}
