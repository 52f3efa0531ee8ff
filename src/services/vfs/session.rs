//! Per-session VFS state
//!
//! Everything the file manager and the echo controller share lives here:
//! the in-memory file mirror, outstanding expected writes, the pending-tab
//! queue, the debouncer and the suppression flag. Two sessions never share
//! state, so tests can run side by side.

use super::debounce::Debouncer;
use crate::config::StorageConfig;
use crate::services::fs::normalize_path;
use crate::services::time_source::SharedTimeSource;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// A write this layer issued and expects to hear about again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedWrite {
    pub path: String,
    pub content: String,
    pub timestamp: Instant,
}

/// Externally changed paths waiting for the UI, in arrival order
#[derive(Debug, Default)]
pub struct PendingTabQueue {
    paths: Vec<String>,
}

impl PendingTabQueue {
    /// Returns `false` if the path was already queued.
    pub fn push(&mut self, path: &str) -> bool {
        if self.paths.iter().any(|p| p == path) {
            return false;
        }
        self.paths.push(path.to_string());
        true
    }

    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.paths)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub struct VfsSession {
    config: StorageConfig,
    main_path: String,
    time: SharedTimeSource,
    files: RwLock<BTreeMap<String, String>>,
    expected: Mutex<HashMap<String, ExpectedWrite>>,
    pending: Mutex<PendingTabQueue>,
    debouncer: Mutex<Debouncer>,
    suppressed: AtomicBool,
}

impl std::fmt::Debug for VfsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsSession")
            .field("main_path", &self.main_path)
            .field("files", &self.files.read().len())
            .field("expected", &self.expected.lock().len())
            .field("pending", &self.pending.lock().paths())
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}

impl VfsSession {
    pub fn new(config: StorageConfig, time: SharedTimeSource) -> Self {
        let main_path = normalize_path(&config.main_path);
        let debouncer = Debouncer::new(config.debounce_window());
        Self {
            config,
            main_path,
            time,
            files: RwLock::new(BTreeMap::new()),
            expected: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingTabQueue::default()),
            debouncer: Mutex::new(debouncer),
            suppressed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn time_source(&self) -> &SharedTimeSource {
        &self.time
    }

    pub fn main_path(&self) -> &str {
        &self.main_path
    }

    /// `path` must already be normalized.
    pub fn is_main(&self, path: &str) -> bool {
        path == self.main_path
    }

    // In-memory mirror

    pub fn cached(&self, path: &str) -> Option<String> {
        self.files.read().get(path).cloned()
    }

    pub fn set_cached(&self, path: &str, content: &str) {
        self.files
            .write()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove_cached(&self, path: &str) -> Option<String> {
        self.files.write().remove(path)
    }

    /// Sorted paths of every cached file
    pub fn cached_paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    pub fn cached_files(&self) -> BTreeMap<String, String> {
        self.files.read().clone()
    }

    /// Replace the mirror wholesale, normalizing every path.
    pub fn load_files<I>(&self, files: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let loaded: BTreeMap<String, String> = files
            .into_iter()
            .map(|(path, content)| (normalize_path(&path), content))
            .collect();
        *self.files.write() = loaded;
    }

    // Expected writes

    /// Register a write about to be issued; supersedes any older one for
    /// the same path.
    pub fn expect_write(&self, path: &str, content: &str) {
        let now = self.time.now();
        let mut expected = self.expected.lock();
        self.sweep_expired(&mut expected, now);
        expected.insert(
            path.to_string(),
            ExpectedWrite {
                path: path.to_string(),
                content: content.to_string(),
                timestamp: now,
            },
        );
    }

    /// Consume the expected write for `path` if its content matches.
    pub fn consume_expected(&self, path: &str, content: &str) -> bool {
        let now = self.time.now();
        let mut expected = self.expected.lock();
        self.sweep_expired(&mut expected, now);
        match expected.get(path) {
            Some(entry) if entry.content == content => {
                expected.remove(path);
                true
            }
            _ => false,
        }
    }

    pub fn clear_expected(&self, path: &str) {
        self.expected.lock().remove(path);
    }

    pub fn expected_write(&self, path: &str) -> Option<ExpectedWrite> {
        let now = self.time.now();
        let mut expected = self.expected.lock();
        self.sweep_expired(&mut expected, now);
        expected.get(path).cloned()
    }

    pub fn expected_count(&self) -> usize {
        let now = self.time.now();
        let mut expected = self.expected.lock();
        self.sweep_expired(&mut expected, now);
        expected.len()
    }

    fn sweep_expired(&self, expected: &mut HashMap<String, ExpectedWrite>, now: Instant) {
        let ttl = self.config.expected_write_ttl();
        let before = expected.len();
        expected.retain(|_, entry| now.saturating_duration_since(entry.timestamp) < ttl);
        let swept = before - expected.len();
        if swept > 0 {
            tracing::debug!("expired {} stale expected writes", swept);
        }
    }

    // Pending tabs

    /// Queue an externally changed path. The main file is never queued.
    pub fn enqueue_pending(&self, path: &str) -> bool {
        if self.is_main(path) {
            return false;
        }
        self.pending.lock().push(path)
    }

    pub fn pending_tabs(&self) -> Vec<String> {
        self.pending.lock().paths().to_vec()
    }

    pub fn take_pending(&self) -> Vec<String> {
        self.pending.lock().drain()
    }

    // Debounce and suppression

    /// False if `path` was accepted less than a debounce window ago.
    pub fn debounce_accept(&self, path: &str) -> bool {
        let now = self.time.now();
        self.debouncer.lock().accept(path, now)
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }
}
