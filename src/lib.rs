// Storage core for the browser code pad - exposes all modules for testing

pub mod config;
pub mod error;
pub mod services;

pub use config::StorageConfig;
pub use error::{Result, StorageError};
