// Shared helpers for integration tests

#![allow(dead_code)]

pub mod tracing;

use std::sync::Arc;
use webpad::config::StorageConfig;
use webpad::error::{Result, StorageError};
use webpad::services::confirm::SharedConfirmPrompt;
use webpad::services::report::BufferReporter;
use webpad::services::storage::{KvStore, MemoryKvStore, StorageManager};
use webpad::services::time_source::TestTimeSource;

/// Build a storage manager over `store` with a recording reporter
pub fn storage_manager(
    store: Arc<dyn KvStore>,
    prompt: SharedConfirmPrompt,
) -> (Arc<StorageManager>, Arc<BufferReporter>, Arc<TestTimeSource>) {
    tracing::init_tracing_from_env();
    let reporter = Arc::new(BufferReporter::new());
    let time = TestTimeSource::shared();
    let manager = StorageManager::new(
        store,
        StorageConfig::default(),
        prompt,
        reporter.clone(),
        time.clone(),
    );
    (Arc::new(manager), reporter, time)
}

/// JSON array of snapshot records with the given timestamps
pub fn snapshot_records(timestamps: &[i64]) -> String {
    let records: Vec<serde_json::Value> = timestamps
        .iter()
        .map(|ts| serde_json::json!({ "timestamp": ts, "code": format!("v{}", ts) }))
        .collect();
    serde_json::Value::Array(records).to_string()
}

/// Timestamps stored under `key`, in stored order
pub fn stored_timestamps(store: &dyn KvStore, key: &str) -> Vec<i64> {
    let raw = store.get(key).unwrap().unwrap_or_else(|| "[]".to_string());
    let records: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
    records
        .iter()
        .map(|r| r["timestamp"].as_i64().unwrap())
        .collect()
}

/// Store that rejects every write with a capacity error
#[derive(Debug, Default)]
pub struct AlwaysFullStore {
    pub inner: MemoryKvStore,
}

impl KvStore for AlwaysFullStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, _value: &str) -> Result<()> {
        Err(StorageError::capacity_exceeded(key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

/// Store that rejects writes to other keys while the watched key's value is
/// longer than `threshold` characters
#[derive(Debug)]
pub struct ThresholdStore {
    pub inner: MemoryKvStore,
    pub watched_key: String,
    pub threshold: usize,
}

impl KvStore for ThresholdStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if key != self.watched_key {
            let watched = self.inner.get(&self.watched_key)?.unwrap_or_default();
            if watched.len() > self.threshold {
                return Err(StorageError::capacity_exceeded(key));
            }
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}
