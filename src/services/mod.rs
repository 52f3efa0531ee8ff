//! Storage services

pub mod confirm;
pub mod fs;
pub mod report;
pub mod storage;
pub mod time_source;
pub mod tracing_setup;
pub mod vfs;
