// Virtual file tree: backend contract, adapters and the file manager
//
// Backends persist a flat `path -> content` mapping. The file manager sits
// in front of whichever backend is active and keeps the in-memory mirror,
// the protected main file and echo bookkeeping consistent.

pub mod backend;
pub mod manager;
pub mod memory;
pub mod path;
pub mod runtime;
pub mod slow;

pub use backend::VfsBackend;
pub use manager::FileManager;
pub use memory::MemoryBackend;
pub use path::normalize_path;
pub use runtime::{MemoryRuntimeFs, RuntimeFs};
pub use slow::{BackendMetrics, InjectedFailure, SlowBackend, SlowBackendConfig};
