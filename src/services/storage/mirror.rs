//! Key/value file mirror
//!
//! The whole file tree serialized as one JSON object (`path -> content`)
//! under a single key. It is the synchronous fallback when no transactional
//! store can be opened, and every change made while the primary store is up
//! is copied here so a later fallback session sees the same tree.

use super::manager::StorageManager;
use crate::error::{Result, StorageError};
use crate::services::fs::VfsBackend;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FileMirror {
    storage: Arc<StorageManager>,
    key: String,
}

impl FileMirror {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        let key = storage.config().layout.file_mirror_key.clone();
        Self { storage, key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current mirror contents; unparseable data reads as an empty tree.
    pub fn load_map(&self) -> Result<BTreeMap<String, String>> {
        let Some(raw) = self.storage.store().get(&self.key)? else {
            return Ok(BTreeMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!("ignoring malformed file mirror '{}': {}", self.key, e);
                Ok(BTreeMap::new())
            }
        }
    }

    /// Persist the whole tree through the quota manager.
    ///
    /// # Errors
    ///
    /// `StorageError::QuotaUnresolved` when the store stayed full, carrying
    /// whether the user cancelled or the cleanup was not enough.
    pub async fn save_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(map)?;
        let outcome = self.storage.safe_set_item(&self.key, &json).await?;
        match outcome.error {
            None => Ok(()),
            Some(reason) => {
                tracing::warn!("file mirror not saved: {}", reason);
                Err(StorageError::quota_unresolved(&self.key, reason))
            }
        }
    }

    /// Copy one file into the mirror without involving the user.
    ///
    /// Failures are logged and dropped.
    pub fn mirror_best_effort(&self, path: &str, content: &str) {
        self.update_best_effort(path, |map| {
            if map.get(path).map(String::as_str) == Some(content) {
                return false;
            }
            map.insert(path.to_string(), content.to_string());
            true
        });
    }

    /// Drop one file from the mirror without involving the user.
    pub fn forget_best_effort(&self, path: &str) {
        self.update_best_effort(path, |map| map.remove(path).is_some());
    }

    fn update_best_effort<F>(&self, path: &str, update: F)
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let result = self.load_map().and_then(|mut map| {
            if !update(&mut map) {
                return Ok(());
            }
            let json = serde_json::to_string(&map)?;
            self.storage.store().set(&self.key, &json)
        });
        if let Err(e) = result {
            tracing::warn!("could not mirror {} to '{}': {}", path, self.key, e);
        }
    }
}

#[async_trait]
impl VfsBackend for FileMirror {
    fn name(&self) -> &str {
        "kv-mirror"
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.load_map()?.into_keys().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<String>> {
        Ok(self.load_map()?.remove(path))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let mut map = self.load_map()?;
        map.insert(path.to_string(), content.to_string());
        self.save_map(&map).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut map = self.load_map()?;
        if map.remove(path).is_some() {
            self.save_map(&map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::services::confirm::{
        CleanupAction, ConfirmReply, NoPrompt, ScriptedPrompt, SharedConfirmPrompt,
    };
    use crate::services::report::BufferReporter;
    use crate::services::storage::kv::{entry_cost, KvStore, MemoryKvStore};
    use crate::services::storage::manager::SafeWriteFailure;
    use crate::services::time_source::TestTimeSource;

    fn mirror_over(store: Arc<MemoryKvStore>, prompt: SharedConfirmPrompt) -> FileMirror {
        let storage = StorageManager::new(
            store,
            StorageConfig::default(),
            prompt,
            Arc::new(BufferReporter::new()),
            TestTimeSource::shared(),
        );
        FileMirror::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let store = Arc::new(MemoryKvStore::new());
        let mirror = mirror_over(store.clone(), Arc::new(NoPrompt));

        mirror.write("/main.py", "print(1)").await.unwrap();
        mirror.write("/lib.py", "x = 1").await.unwrap();
        assert_eq!(mirror.list().await.unwrap(), vec!["/lib.py", "/main.py"]);
        assert_eq!(
            mirror.read("/lib.py").await.unwrap(),
            Some("x = 1".to_string())
        );

        mirror.delete("/lib.py").await.unwrap();
        assert_eq!(mirror.list().await.unwrap(), vec!["/main.py"]);

        let raw = store.get("vfs_files_v1").unwrap().unwrap();
        assert_eq!(raw, r#"{"/main.py":"print(1)"}"#);
    }

    #[tokio::test]
    async fn test_malformed_mirror_reads_empty() {
        let store = Arc::new(MemoryKvStore::new());
        store.insert_unchecked("vfs_files_v1", "{not json");
        let mirror = mirror_over(store, Arc::new(NoPrompt));

        assert!(mirror.list().await.unwrap().is_empty());
        mirror.write("/a.py", "1").await.unwrap();
        assert_eq!(mirror.list().await.unwrap(), vec!["/a.py"]);
    }

    #[tokio::test]
    async fn test_write_fails_when_quota_cleanup_cancelled() {
        let store = Arc::new(MemoryKvStore::with_capacity(entry_cost("vfs_files_v1", "{}")));
        let prompt = Arc::new(ScriptedPrompt::always(ConfirmReply::Action(CleanupAction::Cancel)));
        let mirror = mirror_over(store, prompt.clone());

        let err = mirror.write("/a.py", "too big").await.unwrap_err();
        assert_eq!(err.quota_failure(), Some(SafeWriteFailure::Cancelled));
        assert!(!err.is_capacity_exceeded());
        assert_eq!(prompt.asked().len(), 1);
    }

    #[tokio::test]
    async fn test_write_reports_cleanup_that_freed_too_little() {
        let store = Arc::new(MemoryKvStore::with_capacity(entry_cost("vfs_files_v1", "{}")));
        let prompt = Arc::new(ScriptedPrompt::always(ConfirmReply::Bool(true)));
        let mirror = mirror_over(store, prompt);

        let err = mirror.write("/a.py", "too big").await.unwrap_err();
        assert_eq!(err.quota_failure(), Some(SafeWriteFailure::StillExceeded));
    }

    #[test]
    fn test_forget_removes_only_that_path() {
        let store = Arc::new(MemoryKvStore::new());
        let mirror = mirror_over(store.clone(), Arc::new(NoPrompt));
        mirror.mirror_best_effort("/a.py", "1");
        mirror.mirror_best_effort("/b.py", "2");

        mirror.forget_best_effort("/a.py");
        mirror.forget_best_effort("/missing.py");

        let raw = store.get("vfs_files_v1").unwrap().unwrap();
        assert_eq!(raw, r#"{"/b.py":"2"}"#);
    }

    #[tokio::test]
    async fn test_best_effort_never_prompts() {
        let store = Arc::new(MemoryKvStore::with_capacity(8));
        let prompt = Arc::new(ScriptedPrompt::always(ConfirmReply::Bool(true)));
        let mirror = mirror_over(store.clone(), prompt.clone());

        mirror.mirror_best_effort("/a.py", "content");
        assert!(prompt.asked().is_empty());
        assert_eq!(store.get("vfs_files_v1").unwrap(), None);
    }
}
