//! Expiring key-value stores backing the credential cache.
//!
//! Entries carry an absolute expiry; expired entries are never returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Persisted name/value entries with an explicit expiry.
pub trait KeyValueStore: Send + Sync {
    /// Value for `name`, or `None` when absent or expired.
    fn get(&self, name: &str) -> Option<String>;

    /// Store `value` under `name` for `ttl`.
    fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()>;

    fn remove(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-process store. Lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, name: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .filter(|e| e.is_live(Utc::now()))
            .map(|e| e.value.clone())
    }

    fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            name.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(name);
        Ok(())
    }
}

/// JSON file store, shared between runs of the CLI.
///
/// Layout: a single object mapping name to `{ value, expires_at }`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> HashMap<String, StoredEntry> {
        if !self.path.exists() {
            return HashMap::new();
        }
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn save_all(&self, data: &HashMap<String, StoredEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        // Atomic write: write to temp then rename
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, name: &str) -> Option<String> {
        self.load_all()
            .remove(name)
            .filter(|e| e.is_live(Utc::now()))
            .map(|e| e.value)
    }

    fn set(&self, name: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let mut data = self.load_all();
        let before = data.len();
        data.retain(|_, e| e.is_live(now));
        if data.len() != before {
            debug!(pruned = before - data.len(), "Pruned expired store entries");
        }
        data.insert(
            name.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        self.save_all(&data)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut data = self.load_all();
        if data.remove(name).is_some() {
            self.save_all(&data)?;
        }
        Ok(())
    }
}
