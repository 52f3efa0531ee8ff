use super::path::normalize_path;
use super::runtime::RuntimeFs;
use crate::error::Result;
use async_trait::async_trait;

/// Async backend trait for the virtual file tree
///
/// This trait gives every concrete store (transactional blob store, key/value
/// mirror, in-memory test store) the same CRUD contract. Paths passed in are
/// already normalized.
#[async_trait]
pub trait VfsBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// List every stored path
    ///
    /// # Errors
    ///
    /// `StorageError::BackendUnavailable` when the store cannot be opened at
    /// all; callers fall back to the key/value mirror in that case.
    async fn list(&self) -> Result<Vec<String>>;

    /// Read a file, `None` if it does not exist
    async fn read(&self, path: &str) -> Result<Option<String>>;

    /// Create or replace a file
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Delete a file; deleting a missing file succeeds
    async fn delete(&self, path: &str) -> Result<()>;

    /// Push every stored file into the runtime filesystem.
    ///
    /// Returns the number of files written.
    async fn mount_to_runtime(&self, runtime: &dyn RuntimeFs) -> Result<usize> {
        let mut mounted = 0;
        for path in self.list().await? {
            if let Some(content) = self.read(&path).await? {
                runtime.write_file(&path, &content)?;
                mounted += 1;
            }
        }
        tracing::debug!("{}: mounted {} files into runtime", self.name(), mounted);
        Ok(mounted)
    }

    /// Pull files the runtime wrote directly and store those that differ.
    ///
    /// `protected` names the one file that may never be cleared: empty
    /// runtime content for it is skipped. Returns the `(path, content)` pairs
    /// that changed.
    async fn sync_from_runtime(
        &self,
        runtime: &dyn RuntimeFs,
        protected: &str,
    ) -> Result<Vec<(String, String)>> {
        let mut changed = Vec::new();
        for path in runtime.list_files() {
            let path = normalize_path(&path);
            let Some(content) = runtime.read_file(&path) else {
                continue;
            };
            if path == protected && content.is_empty() {
                tracing::warn!("{}: not clearing {} from runtime sync", self.name(), path);
                continue;
            }
            if self.read(&path).await?.as_deref() != Some(content.as_str()) {
                self.write(&path, &content).await?;
                changed.push((path, content));
            }
        }
        tracing::debug!(
            "{}: synced {} changed files from runtime",
            self.name(),
            changed.len()
        );
        Ok(changed)
    }
}
