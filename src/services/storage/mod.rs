//! Quota-aware key/value persistence
//!
//! - `kv` / `file_kv`: the key/value store seam and its implementations
//! - `usage`: UTF-16 cost accounting and health classification
//! - `snapshots`: snapshot collections keyed by configuration identity
//! - `manager`: the quota manager wrapping every write
//! - `mirror`: the file tree serialized under one key

pub mod file_kv;
pub mod kv;
pub mod manager;
pub mod mirror;
pub mod snapshots;
pub mod usage;

pub use file_kv::FileKvStore;
pub use kv::{entry_cost, KvStore, MemoryKvStore};
pub use manager::{SafeWriteFailure, SafeWriteOutcome, StorageManager};
pub use mirror::FileMirror;
pub use snapshots::{SnapshotConfigInfo, SnapshotRegistry};
pub use usage::{HealthStatus, StorageHealth, UsageBreakdown};
