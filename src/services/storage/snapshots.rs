//! Snapshot collections
//!
//! Each configuration identity owns one key (`<prefix><config id>`) holding a
//! JSON array of snapshot records. Records are opaque apart from their
//! `timestamp` field (milliseconds since the epoch). Collections are appended
//! by the host application and only shrink through the cleanup operations
//! below.
//!
//! Persisted data is never trusted: an unparseable collection counts as
//! empty, and a record without a numeric timestamp sorts as the oldest.

use super::kv::{entry_cost, KvStore};
use crate::config::StorageLayout;
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Summary of one stored collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotConfigInfo {
    pub config_id: String,
    pub snapshot_count: usize,
    pub storage_key: String,
    /// UTF-16 cost of the whole entry
    pub size: u64,
}

/// Timestamp of a record, `0` when missing or not a number
pub fn record_timestamp(record: &Value) -> i64 {
    record
        .get("timestamp")
        .and_then(|t| t.as_i64().or_else(|| t.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

/// Parse a stored collection; anything but a JSON array yields `None`.
pub fn parse_collection(raw: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

#[derive(Clone)]
pub struct SnapshotRegistry {
    store: Arc<dyn KvStore>,
    layout: StorageLayout,
    keep: usize,
}

impl std::fmt::Debug for SnapshotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRegistry")
            .field("store", &"<dyn KvStore>")
            .field("layout", &self.layout)
            .field("keep", &self.keep)
            .finish()
    }
}

impl SnapshotRegistry {
    pub fn new(store: Arc<dyn KvStore>, layout: StorageLayout, keep: usize) -> Self {
        Self {
            store,
            layout,
            keep: keep.max(1),
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn storage_key(&self, config_id: &str) -> String {
        self.layout.snapshot_key(config_id)
    }

    /// Every snapshot collection in the store, sorted by key
    pub fn get_all_snapshot_configs(&self) -> Result<Vec<SnapshotConfigInfo>> {
        let mut out = Vec::new();
        for (key, value) in self.store.entries()? {
            let Some(config_id) = self.layout.config_id_of(&key) else {
                continue;
            };

            let snapshot_count = match parse_collection(&value) {
                Some(items) => items.len(),
                None => {
                    tracing::warn!("snapshot collection '{}' is not a JSON array", key);
                    0
                }
            };

            out.push(SnapshotConfigInfo {
                config_id: config_id.to_string(),
                snapshot_count,
                size: entry_cost(&key, &value),
                storage_key: key,
            });
        }
        Ok(out)
    }

    /// Records stored for `config_id`, in stored order
    pub fn load(&self, config_id: &str) -> Result<Vec<Value>> {
        let key = self.storage_key(config_id);
        Ok(self
            .store
            .get(&key)?
            .and_then(|raw| parse_collection(&raw))
            .unwrap_or_default())
    }

    /// Serialized collection for `config_id` with `record` appended.
    ///
    /// Nothing is written; the caller persists the result through the quota
    /// manager.
    pub fn appended(&self, config_id: &str, record: Value) -> Result<(String, String)> {
        let mut records = self.load(config_id)?;
        records.push(record);
        let key = self.storage_key(config_id);
        Ok((key, serde_json::to_string(&records)?))
    }

    /// Keep only the newest snapshots of the collection stored at `storage_key`.
    ///
    /// Records are sorted by timestamp, newest first, and truncated. Returns
    /// the number of records removed. Collections with at most one record,
    /// missing keys and unparseable values are left untouched.
    pub fn cleanup_old_snapshots(&self, storage_key: &str) -> Result<usize> {
        let Some(raw) = self.store.get(storage_key)? else {
            return Ok(0);
        };
        let Some(mut records) = parse_collection(&raw) else {
            tracing::warn!("not pruning malformed snapshot collection '{}'", storage_key);
            return Ok(0);
        };
        if records.len() <= 1 {
            return Ok(0);
        }

        let before = records.len();
        records.sort_by_key(|r| std::cmp::Reverse(record_timestamp(r)));
        records.truncate(self.keep);
        let removed = before - records.len();

        let serialized = serde_json::to_string(&records)?;
        if serialized != raw {
            self.store.set(storage_key, &serialized)?;
        }

        tracing::debug!(
            "pruned '{}': kept {}, removed {}",
            storage_key,
            records.len(),
            removed
        );
        Ok(removed)
    }

    /// Apply [`cleanup_old_snapshots`](Self::cleanup_old_snapshots) to every collection
    pub fn cleanup_all_collections(&self) -> Result<usize> {
        let mut removed = 0;
        for info in self.get_all_snapshot_configs()? {
            removed += self.cleanup_old_snapshots(&info.storage_key)?;
        }
        Ok(removed)
    }

    /// Delete every snapshot collection except `current_key`.
    ///
    /// Returns the number of collections deleted.
    pub fn cleanup_other_configs(&self, current_key: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys()? {
            if self.layout.is_snapshot_key(&key) && key != current_key {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        tracing::debug!("removed {} snapshot collections besides '{}'", removed, current_key);
        Ok(removed)
    }

    /// Delete all snapshot collections, the file mirror and the autosave slot.
    ///
    /// Returns the number of keys deleted. Callers are responsible for having
    /// obtained the user's confirmation.
    pub fn purge_all(&self) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys()? {
            let owned = self.layout.is_snapshot_key(&key)
                || key == self.layout.file_mirror_key
                || key == self.layout.autosave_key;
            if owned {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::kv::MemoryKvStore;
    use serde_json::json;

    fn registry() -> (Arc<MemoryKvStore>, SnapshotRegistry) {
        let store = Arc::new(MemoryKvStore::new());
        let registry = SnapshotRegistry::new(store.clone(), StorageLayout::default(), 3);
        (store, registry)
    }

    fn timestamps(store: &MemoryKvStore, key: &str) -> Vec<i64> {
        let raw = store.get(key).unwrap().unwrap();
        parse_collection(&raw)
            .unwrap()
            .iter()
            .map(record_timestamp)
            .collect()
    }

    #[test]
    fn test_cleanup_keeps_three_newest() {
        let (store, registry) = registry();
        store.insert_unchecked(
            "snapshots_cfg",
            &json!([
                {"timestamp": 1, "code": "a"},
                {"timestamp": 2, "code": "b"},
                {"timestamp": 3, "code": "c"},
                {"timestamp": 4, "code": "d"},
                {"timestamp": 5, "code": "e"}
            ])
            .to_string(),
        );

        assert_eq!(registry.cleanup_old_snapshots("snapshots_cfg").unwrap(), 2);
        assert_eq!(timestamps(&store, "snapshots_cfg"), vec![5, 4, 3]);

        // Extra fields survive
        let records = registry.load("cfg").unwrap();
        assert_eq!(records[0]["code"], "e");
    }

    #[test]
    fn test_cleanup_single_entry_is_noop() {
        let (store, registry) = registry();
        let raw = json!([{"timestamp": 9}]).to_string();
        store.insert_unchecked("snapshots_cfg", &raw);

        assert_eq!(registry.cleanup_old_snapshots("snapshots_cfg").unwrap(), 0);
        assert_eq!(store.get("snapshots_cfg").unwrap(), Some(raw));
        assert_eq!(registry.cleanup_old_snapshots("snapshots_missing").unwrap(), 0);
    }

    #[test]
    fn test_cleanup_sorts_short_collections() {
        let (store, registry) = registry();
        store.insert_unchecked("snapshots_cfg", &json!([{"timestamp": 1}, {"timestamp": 7}]).to_string());

        assert_eq!(registry.cleanup_old_snapshots("snapshots_cfg").unwrap(), 0);
        assert_eq!(timestamps(&store, "snapshots_cfg"), vec![7, 1]);
    }

    #[test]
    fn test_records_without_timestamp_sort_last() {
        let (store, registry) = registry();
        store.insert_unchecked(
            "snapshots_cfg",
            &json!([{"code": "x"}, {"timestamp": 3}, {"timestamp": "soon"}, {"timestamp": 2}, {"timestamp": 1.0}])
                .to_string(),
        );

        registry.cleanup_old_snapshots("snapshots_cfg").unwrap();
        assert_eq!(timestamps(&store, "snapshots_cfg"), vec![3, 2, 1]);
    }

    #[test]
    fn test_malformed_collection_reports_zero() {
        let (store, registry) = registry();
        store.insert_unchecked("snapshots_bad", "{oops");
        store.insert_unchecked("snapshots_obj", "{\"timestamp\": 1}");
        store.insert_unchecked("snapshots_ok", &json!([{"timestamp": 1}, {"timestamp": 2}]).to_string());
        store.insert_unchecked("unrelated", "[1,2,3]");

        let configs = registry.get_all_snapshot_configs().unwrap();
        assert_eq!(configs.len(), 3);

        let bad = configs.iter().find(|c| c.config_id == "bad").unwrap();
        assert_eq!(bad.snapshot_count, 0);
        assert_eq!(bad.storage_key, "snapshots_bad");
        assert_eq!(bad.size, entry_cost("snapshots_bad", "{oops"));

        let obj = configs.iter().find(|c| c.config_id == "obj").unwrap();
        assert_eq!(obj.snapshot_count, 0);

        let ok = configs.iter().find(|c| c.config_id == "ok").unwrap();
        assert_eq!(ok.snapshot_count, 2);

        // Pruning a malformed collection leaves it alone
        assert_eq!(registry.cleanup_old_snapshots("snapshots_bad").unwrap(), 0);
        assert_eq!(store.get("snapshots_bad").unwrap(), Some("{oops".to_string()));
    }

    #[test]
    fn test_cleanup_other_configs() {
        let (store, registry) = registry();
        store.insert_unchecked("snapshots_a", "[]");
        store.insert_unchecked("snapshots_b", "[]");
        store.insert_unchecked("snapshots_c", "[]");
        store.insert_unchecked("vfs_files_v1", "{}");

        assert_eq!(registry.cleanup_other_configs("snapshots_b").unwrap(), 2);
        assert_eq!(store.keys().unwrap(), vec!["snapshots_b", "vfs_files_v1"]);
    }

    #[test]
    fn test_purge_all_keeps_foreign_keys() {
        let (store, registry) = registry();
        store.insert_unchecked("snapshots_a", "[]");
        store.insert_unchecked("vfs_files_v1", "{}");
        store.insert_unchecked("autosave_v1", "{}");
        store.insert_unchecked("theme", "dark");

        assert_eq!(registry.purge_all().unwrap(), 3);
        assert_eq!(store.keys().unwrap(), vec!["theme"]);
    }

    #[test]
    fn test_appended_does_not_write() {
        let (store, registry) = registry();
        store.insert_unchecked("snapshots_cfg", &json!([{"timestamp": 1}]).to_string());

        let (key, value) = registry
            .appended("cfg", json!({"timestamp": 2, "code": "x"}))
            .unwrap();
        assert_eq!(key, "snapshots_cfg");
        assert_eq!(parse_collection(&value).unwrap().len(), 2);
        assert_eq!(registry.load("cfg").unwrap().len(), 1);
    }
}
