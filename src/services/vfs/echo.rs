//! Write-notification filtering
//!
//! The execution runtime reports every file write it sees, including the
//! ones this layer just asked it to perform. Each notification goes through,
//! in order:
//!
//! 1. the session suppression flag
//! 2. the main-file guard (empty content for it is dropped)
//! 3. per-path debounce
//! 4. the expected-write table (a content match is our own echo)
//!
//! Whatever survives is an external change: it updates the in-memory mirror,
//! is copied to the key/value mirror on a best-effort basis, and (unless it
//! is the main file) lands in the pending-tab queue.
//!
//! Matching is by content equality. An external write that happens to carry
//! byte-identical content to an outstanding expected write is swallowed as
//! an echo.

use super::session::VfsSession;
use crate::services::fs::normalize_path;
use crate::services::storage::FileMirror;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happened to a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Session-wide suppression was on
    Suppressed,
    /// Empty content for the main file; dropped
    Protected,
    /// Same path seen within the debounce window
    Debounced,
    /// Matched an expected write and was consumed
    Echo,
    /// Treated as an external change; `queued` is false for the main file
    /// and for paths already waiting in the queue
    External { queued: bool },
}

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<Vec<String>>>>>;

pub struct EchoController {
    session: Arc<VfsSession>,
    mirror: Option<FileMirror>,
    subscribers: Subscribers,
    flush_scheduled: Arc<AtomicBool>,
}

impl std::fmt::Debug for EchoController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoController")
            .field("session", &self.session)
            .field("mirror", &self.mirror.as_ref().map(|m| m.key().to_string()))
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EchoController {
    pub fn new(session: Arc<VfsSession>, mirror: Option<FileMirror>) -> Self {
        Self {
            session,
            mirror,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            flush_scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> &Arc<VfsSession> {
        &self.session
    }

    /// Key/value mirror that external changes are copied to, if any
    pub fn mirror(&self) -> Option<&FileMirror> {
        self.mirror.as_ref()
    }

    /// Handle one write-completion notification.
    pub fn notify(&self, path: &str, content: &str) -> NotifyOutcome {
        if self.session.is_suppressed() {
            return NotifyOutcome::Suppressed;
        }

        let path = normalize_path(path);
        if self.session.is_main(&path) && content.is_empty() {
            tracing::warn!("ignoring notification that would clear {}", path);
            return NotifyOutcome::Protected;
        }

        if !self.session.debounce_accept(&path) {
            tracing::trace!("debounced notification for {}", path);
            return NotifyOutcome::Debounced;
        }

        if self.session.consume_expected(&path, content) {
            tracing::trace!("consumed echo for {}", path);
            return NotifyOutcome::Echo;
        }

        tracing::debug!("external change to {}", path);
        self.session.set_cached(&path, content);
        if let Some(mirror) = &self.mirror {
            mirror.mirror_best_effort(&path, content);
        }

        let queued = self.session.enqueue_pending(&path);
        if queued {
            self.schedule_flush();
        }
        NotifyOutcome::External { queued }
    }

    /// Receive batches of externally changed paths.
    ///
    /// Batches are delivered by a flush that runs shortly after a path is
    /// queued; while nobody is subscribed, paths stay in the queue.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Vec<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Drain the pending-tab queue directly.
    pub fn take_pending_tabs(&self) -> Vec<String> {
        self.session.take_pending()
    }

    pub fn pending_tabs(&self) -> Vec<String> {
        self.session.pending_tabs()
    }

    fn schedule_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.subscribers.lock().is_empty() {
            return;
        }
        if self.flush_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let session = Arc::clone(&self.session);
        let subscribers = Arc::clone(&self.subscribers);
        let scheduled = Arc::clone(&self.flush_scheduled);
        let delay = session.config().pending_flush_delay();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            scheduled.store(false, Ordering::SeqCst);
            flush_pending(&session, &subscribers);
        });
    }
}

fn flush_pending(session: &VfsSession, subscribers: &Subscribers) {
    let mut subscribers = subscribers.lock();
    subscribers.retain(|tx| !tx.is_closed());
    if subscribers.is_empty() {
        return;
    }

    let paths = session.take_pending();
    if paths.is_empty() {
        return;
    }
    tracing::debug!("flushing {} pending tabs", paths.len());
    for tx in subscribers.iter() {
        let _ = tx.send(paths.clone());
    }
}
