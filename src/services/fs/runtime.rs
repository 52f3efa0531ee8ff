//! Bridge to the execution runtime's filesystem
//!
//! Code runs inside a runtime (a WebAssembly interpreter) with its own
//! synchronous in-memory filesystem. Files are pushed into it before a run
//! and pulled back out afterwards, since programs may write files directly.

use super::path::normalize_path;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Synchronous filesystem owned by the execution runtime
pub trait RuntimeFs: Send + Sync {
    /// Paths of every regular file the runtime knows about
    fn list_files(&self) -> Vec<String>;

    fn read_file(&self, path: &str) -> Option<String>;

    fn write_file(&self, path: &str, content: &str) -> Result<()>;
}

/// In-memory runtime filesystem that records every write it receives
#[derive(Debug, Default)]
pub struct MemoryRuntimeFs {
    files: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryRuntimeFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the running program writing a file directly
    pub fn program_write(&self, path: &str, content: &str) {
        self.files
            .lock()
            .insert(normalize_path(path), content.to_string());
    }

    /// Writes pushed in through [`RuntimeFs::write_file`]
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }
}

impl RuntimeFs for MemoryRuntimeFs {
    fn list_files(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    fn read_file(&self, path: &str) -> Option<String> {
        self.files.lock().get(&normalize_path(path)).cloned()
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path);
        self.files.lock().insert(path.clone(), content.to_string());
        self.writes.lock().push((path, content.to_string()));
        Ok(())
    }
}
