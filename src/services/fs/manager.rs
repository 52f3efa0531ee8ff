use super::backend::VfsBackend;
use super::path::normalize_path;
use super::runtime::RuntimeFs;
use crate::error::Result;
use crate::services::report::SharedReporter;
use crate::services::vfs::{EchoController, VfsSession};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// CRUD over the virtual file tree
///
/// Reads are served from the session's in-memory mirror. Writes update the
/// mirror first, register an expected write, hand the content to the active
/// backend, and finally feed a self-notification through the echo controller
/// so the expectation is reconciled. Every successful write or delete is also
/// copied to the key/value file mirror when one is attached.
///
/// The main file is protected: deleting it, or writing empty content to it,
/// is a logged no-op.
///
/// A failed backend write leaves the mirror ahead of durable storage; the
/// mirror is not rolled back. Writes to the same path are not serialized
/// here.
pub struct FileManager {
    session: Arc<VfsSession>,
    echo: Arc<EchoController>,
    backend: RwLock<Arc<dyn VfsBackend>>,
    reporter: SharedReporter,
}

impl fmt::Debug for FileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileManager")
            .field("backend", &self.backend.read().name())
            .field("session", &self.session)
            .finish()
    }
}

impl FileManager {
    pub fn new(
        backend: Arc<dyn VfsBackend>,
        echo: Arc<EchoController>,
        reporter: SharedReporter,
    ) -> Self {
        Self {
            session: Arc::clone(echo.session()),
            echo,
            backend: RwLock::new(backend),
            reporter,
        }
    }

    pub fn session(&self) -> &Arc<VfsSession> {
        &self.session
    }

    /// The backend currently receiving writes
    pub fn backend(&self) -> Arc<dyn VfsBackend> {
        Arc::clone(&self.backend.read())
    }

    /// Switch backends, e.g. to the key/value mirror after the primary store
    /// turned out to be unavailable.
    pub fn use_backend(&self, backend: Arc<dyn VfsBackend>) {
        tracing::info!("file manager now using '{}' backend", backend.name());
        *self.backend.write() = backend;
    }

    /// Sorted paths of every known file
    pub fn list(&self) -> Vec<String> {
        self.session.cached_paths()
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.session.cached(&normalize_path(path))
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path);

        if self.session.is_main(&path) && content.is_empty() {
            self.warn_protected(&format!("Refusing to clear {}", path));
            return Ok(());
        }

        if self.session.cached(&path).as_deref() == Some(content) {
            return Ok(());
        }

        self.session.set_cached(&path, content);
        self.session.expect_write(&path, content);

        let backend = self.backend();
        backend.write(&path, content).await.map_err(|e| {
            tracing::error!("{} write to {} failed: {}", backend.name(), path, e);
            e
        })?;

        self.echo.notify(&path, content);
        if let Some(mirror) = self.echo.mirror() {
            mirror.mirror_best_effort(&path, content);
        }
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize_path(path);

        if self.session.is_main(&path) {
            self.warn_protected(&format!("Refusing to delete {}", path));
            return Ok(());
        }

        self.session.remove_cached(&path);
        self.session.clear_expected(&path);
        self.backend().delete(&path).await?;
        if let Some(mirror) = self.echo.mirror() {
            mirror.forget_best_effort(&path);
        }
        Ok(())
    }

    /// Push every known file into the runtime filesystem.
    ///
    /// Each push is registered as an expected write first, so the runtime's
    /// notifications for them are recognised as echoes.
    pub async fn mount_to_runtime(&self, runtime: &dyn RuntimeFs) -> Result<usize> {
        let files = self.session.cached_files();
        for (path, content) in &files {
            self.session.expect_write(path, content);
            runtime.write_file(path, content)?;
        }
        tracing::debug!("mounted {} files into runtime", files.len());
        Ok(files.len())
    }

    /// Pull files the runtime wrote behind our back.
    ///
    /// Changed files are persisted by the backend and routed through the
    /// echo controller. The in-memory tree always takes the synced content,
    /// even when the notification is debounced, so it never lags the backend.
    /// Returns the paths that changed.
    pub async fn sync_from_runtime(&self, runtime: &dyn RuntimeFs) -> Result<Vec<String>> {
        let changed = self
            .backend()
            .sync_from_runtime(runtime, self.session.main_path())
            .await?;
        let mut paths = Vec::with_capacity(changed.len());
        for (path, content) in changed {
            let outcome = self.echo.notify(&path, &content);
            tracing::trace!("runtime sync of {}: {:?}", path, outcome);
            self.session.set_cached(&path, &content);
            if let Some(mirror) = self.echo.mirror() {
                mirror.mirror_best_effort(&path, &content);
            }
            paths.push(path);
        }
        Ok(paths)
    }

    fn warn_protected(&self, message: &str) {
        tracing::warn!("{}", message);
        self.reporter.append_terminal(message, "warning");
    }
}
