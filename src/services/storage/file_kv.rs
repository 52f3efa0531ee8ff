//! Key/value store persisted as a single JSON file
//!
//! Every mutation rewrites the file through a temp file and rename so a crash
//! never leaves a half-written store behind.

use super::kv::{check_capacity, KvStore};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
    capacity: Option<u64>,
}

impl FileKvStore {
    /// Open the store at `path`, creating an empty one if the file is missing.
    ///
    /// A file that does not parse as a JSON string map is treated as empty;
    /// it is only overwritten by the next successful write.
    pub fn open(path: impl Into<PathBuf>, capacity: Option<u64>) -> Result<Self> {
        let path = path.into();

        let map = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        "ignoring malformed key/value file {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            map: Mutex::new(map),
            capacity,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;
        self.atomic_write(json.as_bytes())
    }

    fn atomic_write(&self, content: &[u8]) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Apply `f` to a copy of the map and commit it only if persisting succeeds.
    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<()>,
    {
        let mut guard = self.map.lock();
        let mut next = guard.clone();
        f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let capacity = self.capacity;
        self.mutate(|map| {
            check_capacity(map, capacity, key, value)?;
            map.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if !self.map.lock().contains_key(key) {
            return Ok(());
        }
        self.mutate(|map| {
            map.remove(key);
            Ok(())
        })
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
