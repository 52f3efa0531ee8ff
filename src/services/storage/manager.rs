use super::kv::KvStore;
use super::snapshots::{SnapshotConfigInfo, SnapshotRegistry};
use super::usage::{format_bytes, HealthStatus, StorageHealth, UsageBreakdown};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::services::confirm::{CleanupAction, ConfirmReply, SharedConfirmPrompt};
use crate::services::report::SharedReporter;
use crate::services::time_source::SharedTimeSource;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Why a quota-guarded write did not land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeWriteFailure {
    /// The user declined cleanup, or no dialog could be shown
    Cancelled,
    /// One cleanup ran but the retry hit the quota again
    StillExceeded,
}

impl fmt::Display for SafeWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeWriteFailure::Cancelled => write!(f, "storage quota exceeded: cleanup cancelled"),
            SafeWriteFailure::StillExceeded => {
                write!(f, "storage quota still exceeded after cleanup")
            }
        }
    }
}

/// Result of [`StorageManager::safe_set_item`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeWriteOutcome {
    pub success: bool,
    /// The write only succeeded after a cleanup
    pub recovered: bool,
    pub error: Option<SafeWriteFailure>,
}

impl SafeWriteOutcome {
    fn written() -> Self {
        Self {
            success: true,
            recovered: false,
            error: None,
        }
    }

    fn recovered() -> Self {
        Self {
            success: true,
            recovered: true,
            error: None,
        }
    }

    fn failed(reason: SafeWriteFailure) -> Self {
        Self {
            success: false,
            recovered: false,
            error: Some(reason),
        }
    }
}

/// Quota-aware front end to the key/value store.
///
/// All writes the storage layer makes to the key/value store go through
/// [`safe_set_item`](Self::safe_set_item). A capacity failure is turned into
/// a conversation with the user:
///
/// ```text
/// write ──ok──▶ done
///   │
///   └─quota─▶ usage computed ─▶ prompt ─cancel──────────▶ Cancelled
///                                  │
///                                  └─action─▶ cleanup ─▶ retry ─ok──▶ recovered
///                                                          └─quota─▶ StillExceeded
/// ```
///
/// At most one cleanup and one retry happen per call. A cleanup that itself
/// runs into the quota ends the call as `StillExceeded`. Errors other than
/// capacity exhaustion are returned untouched.
pub struct StorageManager {
    store: Arc<dyn KvStore>,
    config: StorageConfig,
    registry: SnapshotRegistry,
    prompt: SharedConfirmPrompt,
    reporter: SharedReporter,
    time: SharedTimeSource,
    /// Configuration identity whose snapshots count as "current"
    current_config: RwLock<Option<String>>,
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field("store", &"<dyn KvStore>")
            .field("config", &self.config)
            .field("current_config", &*self.current_config.read())
            .finish()
    }
}

impl StorageManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        config: StorageConfig,
        prompt: SharedConfirmPrompt,
        reporter: SharedReporter,
        time: SharedTimeSource,
    ) -> Self {
        let registry =
            SnapshotRegistry::new(Arc::clone(&store), config.layout.clone(), config.keep_snapshots);
        Self {
            store,
            config,
            registry,
            prompt,
            reporter,
            time,
            current_config: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn registry(&self) -> &SnapshotRegistry {
        &self.registry
    }

    pub fn reporter(&self) -> &SharedReporter {
        &self.reporter
    }

    pub fn time_source(&self) -> &SharedTimeSource {
        &self.time
    }

    pub fn set_current_config(&self, config_id: Option<&str>) {
        *self.current_config.write() = config_id.map(str::to_string);
    }

    pub fn current_config(&self) -> Option<String> {
        self.current_config.read().clone()
    }

    /// Storage key of the current configuration's snapshot collection
    pub fn current_snapshot_key(&self) -> Option<String> {
        self.current_config
            .read()
            .as_deref()
            .map(|id| self.config.layout.snapshot_key(id))
    }

    // ========================================================================
    // Usage and health
    // ========================================================================

    pub fn get_storage_usage(&self) -> Result<UsageBreakdown> {
        let entries = self.store.entries()?;
        Ok(UsageBreakdown::compute(
            &self.config.layout,
            entries.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    /// Classify usage against the capacity ceiling, reporting anything above "ok"
    pub fn check_storage_health(&self) -> Result<StorageHealth> {
        let health = StorageHealth::classify(&self.config, self.get_storage_usage()?);

        match health.status {
            HealthStatus::Ok => {
                self.reporter.append_terminal_debug(&format!(
                    "Storage usage {:.1}% of {}",
                    health.percent,
                    format_bytes(health.capacity_bytes)
                ));
            }
            HealthStatus::Warning | HealthStatus::Critical => {
                tracing::warn!(
                    "storage usage {} at {:.1}%",
                    health.status.as_str(),
                    health.percent
                );
                self.reporter.append_terminal(
                    &format!(
                        "Storage is {:.1}% full ({} of {}). Consider cleaning up old snapshots.",
                        health.percent,
                        format_bytes(health.used_bytes),
                        format_bytes(health.capacity_bytes)
                    ),
                    if health.status == HealthStatus::Critical {
                        "error"
                    } else {
                        "warning"
                    },
                );
            }
        }

        Ok(health)
    }

    /// Render a full usage report, send it to the terminal and return it
    pub fn show_storage_info(&self) -> Result<String> {
        let health = StorageHealth::classify(&self.config, self.get_storage_usage()?);
        let configs = self.registry.get_all_snapshot_configs()?;

        let mut report = format!(
            "Storage: {} of {} ({:.1}%, {})\n{}",
            format_bytes(health.used_bytes),
            format_bytes(health.capacity_bytes),
            health.percent,
            health.status.as_str(),
            health.usage
        );

        if configs.is_empty() {
            report.push_str("\nNo snapshot collections");
        } else {
            report.push_str("\nSnapshot collections:");
            let current = self.current_config();
            for info in &configs {
                let marker = if current.as_deref() == Some(info.config_id.as_str()) {
                    " (current)"
                } else {
                    ""
                };
                report.push_str(&format!(
                    "\n  {}{}: {} snapshots, {}",
                    info.config_id,
                    marker,
                    info.snapshot_count,
                    format_bytes(info.size)
                ));
            }
        }

        self.reporter.append_terminal(&report, "info");
        Ok(report)
    }

    pub fn get_all_snapshot_configs(&self) -> Result<Vec<SnapshotConfigInfo>> {
        self.registry.get_all_snapshot_configs()
    }

    // ========================================================================
    // Quota-guarded writes
    // ========================================================================

    /// Write `value` under `key`, negotiating a cleanup with the user if the
    /// store is full.
    ///
    /// # Errors
    ///
    /// Only non-capacity store errors are returned as `Err`; quota outcomes
    /// are reported through [`SafeWriteOutcome`].
    pub async fn safe_set_item(&self, key: &str, value: &str) -> Result<SafeWriteOutcome> {
        match self.store.set(key, value) {
            Ok(()) => return Ok(SafeWriteOutcome::written()),
            Err(e) if e.is_capacity_exceeded() => {}
            Err(e) => return Err(e),
        }

        let usage = self.get_storage_usage()?;
        tracing::warn!(
            "quota exceeded writing '{}' ({} bytes in use)",
            key,
            usage.total
        );
        self.reporter.append_terminal(
            &format!("Storage quota exceeded while saving '{}'.\n{}", key, usage),
            "warning",
        );

        let action = self.ask_cleanup_action(&usage).await;
        if action == CleanupAction::Cancel {
            tracing::info!("quota cleanup cancelled for '{}'", key);
            self.reporter
                .append_terminal("Save cancelled: storage is still full.", "warning");
            return Ok(SafeWriteOutcome::failed(SafeWriteFailure::Cancelled));
        }

        let removed = match self.apply_cleanup(action) {
            Ok(removed) => removed,
            Err(e) if e.is_capacity_exceeded() => {
                // The store is already past its ceiling; even shrinking writes fail
                tracing::warn!("{} could not run for '{}': {}", action.as_str(), key, e);
                self.reporter.append_terminal(
                    "Storage is too full to clean up. Free more space and try again.",
                    "error",
                );
                return Ok(SafeWriteOutcome::failed(SafeWriteFailure::StillExceeded));
            }
            Err(e) => return Err(e),
        };
        self.reporter.append_terminal_debug(&format!(
            "{} removed {} item(s)",
            action.as_str(),
            removed
        ));

        match self.store.set(key, value) {
            Ok(()) => {
                tracing::info!("write to '{}' recovered after {}", key, action.as_str());
                self.reporter
                    .append_terminal("Storage cleaned up, save completed.", "info");
                Ok(SafeWriteOutcome::recovered())
            }
            Err(e) if e.is_capacity_exceeded() => {
                tracing::warn!("quota still exceeded for '{}' after {}", key, action.as_str());
                self.reporter.append_terminal(
                    "Storage is still full after cleanup. Free more space and try again.",
                    "error",
                );
                Ok(SafeWriteOutcome::failed(SafeWriteFailure::StillExceeded))
            }
            Err(e) => Err(e),
        }
    }

    async fn ask_cleanup_action(&self, usage: &UsageBreakdown) -> CleanupAction {
        let current = self
            .current_config()
            .unwrap_or_else(|| "(none)".to_string());
        let message = format!(
            "Browser storage is full.\n\n{}\n\nChoose how to free space:\n\
             - {}: keep the {} newest snapshots of '{}'\n\
             - {}: delete snapshots of every other configuration\n\
             - {}: delete all snapshots, saved files and autosave\n\
             - {}: keep everything and abandon this save",
            usage,
            CleanupAction::CleanupOldSnapshots.as_str(),
            self.config.keep_snapshots,
            current,
            CleanupAction::CleanupOtherConfigs.as_str(),
            CleanupAction::CleanupAll.as_str(),
            CleanupAction::Cancel.as_str(),
        );

        match self.prompt.show_confirm_modal("Storage Full", &message).await {
            Some(reply) => reply.into_action(),
            None => {
                tracing::warn!("no confirmation dialog available, cancelling cleanup");
                CleanupAction::Cancel
            }
        }
    }

    /// Run one remediation. Returns how many records or keys were removed.
    ///
    /// Without a current configuration, "old snapshots" prunes every
    /// collection and "other configs" deletes all of them.
    pub fn apply_cleanup(&self, action: CleanupAction) -> Result<usize> {
        let current_key = self.current_snapshot_key();
        let removed = match action {
            CleanupAction::CleanupOldSnapshots => match current_key {
                Some(key) => self.registry.cleanup_old_snapshots(&key)?,
                None => self.registry.cleanup_all_collections()?,
            },
            CleanupAction::CleanupOtherConfigs => self
                .registry
                .cleanup_other_configs(current_key.as_deref().unwrap_or(""))?,
            CleanupAction::CleanupAll => self.registry.purge_all()?,
            CleanupAction::Cancel => 0,
        };
        tracing::info!("{} removed {} item(s)", action.as_str(), removed);
        Ok(removed)
    }

    pub fn cleanup_old_snapshots(&self, current_key: &str) -> Result<usize> {
        self.registry.cleanup_old_snapshots(current_key)
    }

    pub fn cleanup_other_configs(&self, current_key: &str) -> Result<usize> {
        self.registry.cleanup_other_configs(current_key)
    }

    /// Delete every snapshot, the file mirror and the autosave slot after the
    /// user confirms. Returns whether anything was deleted.
    pub async fn cleanup_all_storage_data(&self) -> Result<bool> {
        let reply = self
            .prompt
            .show_confirm_modal(
                "Delete all stored data?",
                "This permanently deletes every snapshot, the saved files and the autosave.",
            )
            .await;

        if !reply.is_some_and(ConfirmReply::is_affirmative) {
            tracing::info!("full storage cleanup declined");
            return Ok(false);
        }

        let removed = self.registry.purge_all()?;
        self.reporter.append_terminal(
            &format!("Deleted {} stored item(s).", removed),
            "info",
        );
        Ok(true)
    }

    // ========================================================================
    // Snapshot and autosave persistence
    // ========================================================================

    /// Append a snapshot to `config_id`'s collection.
    ///
    /// Object payloads are stored as-is with a `timestamp` field added;
    /// other payloads are wrapped as `{"timestamp", "data"}`.
    pub async fn save_snapshot(&self, config_id: &str, payload: Value) -> Result<SafeWriteOutcome> {
        let mut record = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        record.insert(
            "timestamp".to_string(),
            Value::from(self.time.unix_millis()),
        );

        let (key, value) = self.registry.appended(config_id, Value::Object(record))?;
        self.safe_set_item(&key, &value).await
    }

    pub fn load_snapshots(&self, config_id: &str) -> Result<Vec<Value>> {
        self.registry.load(config_id)
    }

    pub async fn save_autosave(&self, payload: &str) -> Result<SafeWriteOutcome> {
        let key = self.config.layout.autosave_key.clone();
        self.safe_set_item(&key, payload).await
    }

    pub fn load_autosave(&self) -> Result<Option<String>> {
        self.store.get(&self.config.layout.autosave_key)
    }
}
