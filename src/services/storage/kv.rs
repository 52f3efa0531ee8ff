//! Synchronous key/value stores.
//!
//! The browser's key/value store is string-to-string and synchronous, with a
//! hard per-origin quota. `MemoryKvStore` models it for tests and embedding;
//! `FileKvStore` (see `file_kv`) persists the same model to disk.

use crate::error::{Result, StorageError};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Storage cost of one entry: key and value counted in UTF-16 code units,
/// two bytes each.
pub fn entry_cost(key: &str, value: &str) -> u64 {
    ((key.encode_utf16().count() + value.encode_utf16().count()) * 2) as u64
}

/// Total cost of a set of entries
pub fn total_cost<'a, I>(entries: I) -> u64
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    entries.into_iter().map(|(k, v)| entry_cost(k, v)).sum()
}

/// Reject a write that would push the map over `capacity`.
pub(crate) fn check_capacity(
    map: &BTreeMap<String, String>,
    capacity: Option<u64>,
    key: &str,
    value: &str,
) -> Result<()> {
    let Some(capacity) = capacity else {
        return Ok(());
    };

    let current = total_cost(map.iter());
    let replaced = map.get(key).map(|old| entry_cost(key, old)).unwrap_or(0);
    let projected = current - replaced + entry_cost(key, value);

    if projected > capacity {
        tracing::debug!(
            "rejecting write to '{}': {} > {} bytes",
            key,
            projected,
            capacity
        );
        return Err(StorageError::capacity_exceeded(key));
    }
    Ok(())
}

/// Synchronous string key/value store with an optional quota
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// `StorageError::CapacityExceeded` when the store's quota would be
    /// exceeded; any other variant for genuine store failures.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys, sorted
    fn keys(&self) -> Result<Vec<String>>;

    /// All entries, sorted by key
    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if let Some(value) = self.get(&key)? {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

/// In-memory key/value store
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    map: Mutex<BTreeMap<String, String>>,
    capacity: Option<u64>,
    /// When set, every `set` fails with this message
    failure: Mutex<Option<String>>,
}

impl MemoryKvStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once total cost would exceed `capacity` bytes
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Make every subsequent `set` fail with a generic store error
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    /// Insert without quota checks (seeding test fixtures)
    pub fn insert_unchecked(&self, key: &str, value: &str) {
        self.map.lock().insert(key.to_string(), value.to_string());
    }

    pub fn used_bytes(&self) -> u64 {
        total_cost(self.map.lock().iter())
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(msg) = self.failure.lock().as_ref() {
            return Err(StorageError::store(msg.clone()));
        }

        let mut map = self.map.lock();
        check_capacity(&map, self.capacity, key, value)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.map.lock().keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .map
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
