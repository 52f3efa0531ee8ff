//! VFS client
//!
//! Wires a primary backend, the key/value file mirror, the echo controller
//! and the file manager around one [`VfsSession`], and tracks when the tree
//! has finished loading.
//!
//! Initialization:
//! - list the primary backend; if it reports `BackendUnavailable`, log it and
//!   serve everything from the key/value mirror instead
//! - if the primary is reachable but empty while the mirror has files, copy
//!   the mirror into the primary
//! - load the tree into the session and signal readiness
//!
//! Consumers wait on [`VfsReady`] before issuing file operations.

pub mod debounce;
pub mod echo;
pub mod session;

pub use debounce::{within_window, Debouncer};
pub use echo::{EchoController, NotifyOutcome};
pub use session::{ExpectedWrite, PendingTabQueue, VfsSession};

use crate::error::{Result, StorageError};
use crate::services::fs::{FileManager, VfsBackend};
use crate::services::report::SharedReporter;
use crate::services::storage::{FileMirror, StorageManager};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Initialization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Pending,
    /// Loaded; `fallback` is true when serving from the key/value mirror
    Ready { fallback: bool },
    Failed,
}

/// Handle that resolves once the VFS has finished initializing
#[derive(Debug, Clone)]
pub struct VfsReady {
    rx: watch::Receiver<InitState>,
}

impl VfsReady {
    /// Wait for initialization to finish. Returns `true` if the tree is
    /// usable.
    pub async fn wait(&mut self) -> bool {
        match self.rx.wait_for(|s| *s != InitState::Pending).await {
            Ok(state) => matches!(*state, InitState::Ready { .. }),
            Err(_) => false,
        }
    }

    pub fn state(&self) -> InitState {
        *self.rx.borrow()
    }
}

pub struct Vfs {
    session: Arc<VfsSession>,
    echo: Arc<EchoController>,
    files: Arc<FileManager>,
    storage: Arc<StorageManager>,
    mirror: FileMirror,
    primary: Arc<dyn VfsBackend>,
    reporter: SharedReporter,
    state: watch::Sender<InitState>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("primary", &self.primary.name())
            .field("state", &*self.state.borrow())
            .field("files", &self.files)
            .finish()
    }
}

impl Vfs {
    pub fn new(
        primary: Arc<dyn VfsBackend>,
        storage: Arc<StorageManager>,
        reporter: SharedReporter,
    ) -> Self {
        let session = Arc::new(VfsSession::new(
            storage.config().clone(),
            Arc::clone(storage.time_source()),
        ));
        let mirror = FileMirror::new(Arc::clone(&storage));
        let echo = Arc::new(EchoController::new(
            Arc::clone(&session),
            Some(mirror.clone()),
        ));
        let files = Arc::new(FileManager::new(
            Arc::clone(&primary),
            Arc::clone(&echo),
            Arc::clone(&reporter),
        ));
        let (state, _) = watch::channel(InitState::Pending);

        Self {
            session,
            echo,
            files,
            storage,
            mirror,
            primary,
            reporter,
            state,
        }
    }

    /// Load the file tree and pick the active backend.
    ///
    /// # Errors
    ///
    /// Store errors other than an unavailable primary are returned and the
    /// ready handle resolves to `false`.
    pub async fn init(&self) -> Result<InitState> {
        match self.load().await {
            Ok(state) => {
                self.state.send_replace(state);
                Ok(state)
            }
            Err(e) => {
                tracing::error!("VFS initialization failed: {}", e);
                self.state.send_replace(InitState::Failed);
                Err(e)
            }
        }
    }

    async fn load(&self) -> Result<InitState> {
        let (files, fallback) = match self.load_primary().await {
            Ok(files) => (files, false),
            Err(StorageError::BackendUnavailable(reason)) => {
                tracing::warn!(
                    "{} unavailable ({}), falling back to '{}'",
                    self.primary.name(),
                    reason,
                    self.mirror.key()
                );
                self.reporter.append_terminal(
                    "Persistent file storage is unavailable; using local storage instead.",
                    "warning",
                );
                self.files.use_backend(Arc::new(self.mirror.clone()));
                (self.mirror.load_map()?, true)
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            "VFS ready with {} files ({})",
            files.len(),
            if fallback { "fallback" } else { self.primary.name() }
        );
        self.session.load_files(files);
        Ok(InitState::Ready { fallback })
    }

    async fn load_primary(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        for path in self.primary.list().await? {
            if let Some(content) = self.primary.read(&path).await? {
                files.insert(path, content);
            }
        }

        if files.is_empty() {
            let mirrored = self.mirror.load_map()?;
            if !mirrored.is_empty() {
                tracing::info!(
                    "migrating {} files from '{}' into {}",
                    mirrored.len(),
                    self.mirror.key(),
                    self.primary.name()
                );
                for (path, content) in &mirrored {
                    self.primary.write(path, content).await?;
                }
                files = mirrored;
            }
        }
        Ok(files)
    }

    pub fn ready(&self) -> VfsReady {
        VfsReady {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> InitState {
        *self.state.borrow()
    }

    pub fn files(&self) -> &Arc<FileManager> {
        &self.files
    }

    pub fn echo(&self) -> &Arc<EchoController> {
        &self.echo
    }

    pub fn session(&self) -> &Arc<VfsSession> {
        &self.session
    }

    pub fn storage(&self) -> &Arc<StorageManager> {
        &self.storage
    }

    pub fn mirror(&self) -> &FileMirror {
        &self.mirror
    }
}
