//! Confirmation prompts.
//!
//! When the key/value store runs out of space the user picks how to free
//! room. The host application owns the dialog; this module only defines the
//! question/answer contract.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Remediation the user can pick after a capacity failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupAction {
    /// Keep only the newest snapshots of the current configuration
    CleanupOldSnapshots,
    /// Drop snapshot collections of every other configuration
    CleanupOtherConfigs,
    /// Drop all snapshots, the file mirror and the autosave slot
    CleanupAll,
    Cancel,
}

impl CleanupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupAction::CleanupOldSnapshots => "cleanup-old-snapshots",
            CleanupAction::CleanupOtherConfigs => "cleanup-other-configs",
            CleanupAction::CleanupAll => "cleanup-all",
            CleanupAction::Cancel => "cancel",
        }
    }
}

/// What a prompt answered.
///
/// Simple yes/no dialogs answer with `Bool`; richer dialogs pick an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReply {
    Bool(bool),
    Action(CleanupAction),
}

impl ConfirmReply {
    /// Map the reply onto a remediation. A plain "yes" means the least
    /// destructive cleanup.
    pub fn into_action(self) -> CleanupAction {
        match self {
            ConfirmReply::Bool(true) => CleanupAction::CleanupOldSnapshots,
            ConfirmReply::Bool(false) => CleanupAction::Cancel,
            ConfirmReply::Action(action) => action,
        }
    }

    pub fn is_affirmative(self) -> bool {
        !matches!(
            self,
            ConfirmReply::Bool(false) | ConfirmReply::Action(CleanupAction::Cancel)
        )
    }
}

/// A modal confirmation dialog.
///
/// There is no timeout: the future resolves only when the user answers or
/// dismisses the dialog.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Returns `None` when no dialog can be shown at all.
    async fn show_confirm_modal(&self, title: &str, message: &str) -> Option<ConfirmReply>;
}

pub type SharedConfirmPrompt = Arc<dyn ConfirmPrompt>;

/// Prompt used when the host has no dialog support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

#[async_trait]
impl ConfirmPrompt for NoPrompt {
    async fn show_confirm_modal(&self, title: &str, _message: &str) -> Option<ConfirmReply> {
        tracing::debug!("no confirmation dialog available for '{}'", title);
        None
    }
}

/// Prompt that answers from a fixed script and records every question.
///
/// Once the script runs out it keeps repeating its last answer.
#[derive(Debug)]
pub struct ScriptedPrompt {
    replies: Mutex<Vec<ConfirmReply>>,
    asked: Mutex<Vec<(String, String)>>,
}

impl ScriptedPrompt {
    pub fn new(replies: Vec<ConfirmReply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: ConfirmReply) -> Self {
        Self::new(vec![reply])
    }

    /// Titles and messages shown so far
    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl ConfirmPrompt for ScriptedPrompt {
    async fn show_confirm_modal(&self, title: &str, message: &str) -> Option<ConfirmReply> {
        self.asked
            .lock()
            .push((title.to_string(), message.to_string()));

        let mut replies = self.replies.lock();
        if replies.len() > 1 {
            Some(replies.remove(0))
        } else {
            replies.first().copied()
        }
    }
}
