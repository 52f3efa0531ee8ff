//! In-memory backend
//!
//! Stands in for the browser's transactional blob store in tests and in
//! hosts that keep files only for the lifetime of the process.

use super::backend::VfsBackend;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            files: Mutex::new(
                files
                    .into_iter()
                    .map(|(p, c)| (p.into(), c.into()))
                    .collect(),
            ),
        }
    }

    /// Current contents, bypassing the async API
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.files.lock().clone()
    }
}

#[async_trait]
impl VfsBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.files.lock().keys().cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<Option<String>> {
        Ok(self.files.lock().get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .lock()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fs::runtime::{MemoryRuntimeFs, RuntimeFs};

    #[tokio::test]
    async fn test_crud() {
        let backend = MemoryBackend::new();
        backend.write("/a.py", "1").await.unwrap();
        backend.write("/b.py", "2").await.unwrap();
        assert_eq!(backend.list().await.unwrap(), vec!["/a.py", "/b.py"]);
        assert_eq!(backend.read("/a.py").await.unwrap(), Some("1".to_string()));

        backend.delete("/a.py").await.unwrap();
        backend.delete("/missing.py").await.unwrap();
        assert_eq!(backend.read("/a.py").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mount_to_runtime() {
        let backend = MemoryBackend::with_files([("/main.py", "print(1)"), ("/lib.py", "x = 1")]);
        let runtime = MemoryRuntimeFs::new();

        assert_eq!(backend.mount_to_runtime(&runtime).await.unwrap(), 2);
        assert_eq!(runtime.read_file("/lib.py"), Some("x = 1".to_string()));
    }

    #[tokio::test]
    async fn test_sync_from_runtime_only_reports_changes() {
        let backend = MemoryBackend::with_files([("/main.py", "print(1)")]);
        let runtime = MemoryRuntimeFs::new();
        backend.mount_to_runtime(&runtime).await.unwrap();

        runtime.program_write("out/result.txt", "42");

        let changed = backend.sync_from_runtime(&runtime, "/main.py").await.unwrap();
        assert_eq!(
            changed,
            vec![("/out/result.txt".to_string(), "42".to_string())]
        );
        assert_eq!(
            backend.read("/out/result.txt").await.unwrap(),
            Some("42".to_string())
        );

        assert!(backend.sync_from_runtime(&runtime, "/main.py").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_never_clears_protected_file() {
        let backend = MemoryBackend::with_files([("/main.py", "print(1)")]);
        let runtime = MemoryRuntimeFs::new();
        runtime.program_write("main.py", "");
        runtime.program_write("empty.txt", "");

        let changed = backend.sync_from_runtime(&runtime, "/main.py").await.unwrap();
        assert_eq!(changed, vec![("/empty.txt".to_string(), String::new())]);
        assert_eq!(
            backend.read("/main.py").await.unwrap(),
            Some("print(1)".to_string())
        );
    }
}
