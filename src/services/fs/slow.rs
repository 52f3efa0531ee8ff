//! Slow backend for testing
//!
//! Decorator around any [`VfsBackend`] that adds configurable delays and can
//! be told to fail, to exercise the fallback path and the ordering between
//! expected-write registration and backend acknowledgement.

use super::backend::VfsBackend;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Per-operation delays
#[derive(Debug, Clone)]
pub struct SlowBackendConfig {
    pub list_delay: Duration,
    pub read_delay: Duration,
    pub write_delay: Duration,
    pub delete_delay: Duration,
}

impl SlowBackendConfig {
    /// Same delay for every operation
    pub fn uniform(delay: Duration) -> Self {
        Self {
            list_delay: delay,
            read_delay: delay,
            write_delay: delay,
            delete_delay: delay,
        }
    }

    pub fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }
}

impl Default for SlowBackendConfig {
    fn default() -> Self {
        Self::none()
    }
}

/// Failure the wrapper should report instead of calling the inner backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Behave like a store that cannot be opened
    Unavailable,
    /// Reject with a generic store error
    Store(String),
}

impl InjectedFailure {
    fn to_error(&self, backend: &str) -> StorageError {
        match self {
            InjectedFailure::Unavailable => {
                StorageError::BackendUnavailable(format!("{} is not available", backend))
            }
            InjectedFailure::Store(msg) => StorageError::store(msg.clone()),
        }
    }
}

/// Call counters
#[derive(Debug, Clone, Default)]
pub struct BackendMetrics {
    pub list_calls: usize,
    pub read_calls: usize,
    pub write_calls: usize,
    pub delete_calls: usize,
    /// Total time spent in artificial delays
    pub total_delay_time: Duration,
}

impl BackendMetrics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls + self.read_calls + self.write_calls + self.delete_calls
    }
}

pub struct SlowBackend {
    inner: Arc<dyn VfsBackend>,
    config: SlowBackendConfig,
    metrics: Arc<Mutex<BackendMetrics>>,
    failure: parking_lot::Mutex<Option<InjectedFailure>>,
}

impl SlowBackend {
    pub fn new(inner: Arc<dyn VfsBackend>, config: SlowBackendConfig) -> Self {
        Self {
            inner,
            config,
            metrics: Arc::new(Mutex::new(BackendMetrics::default())),
            failure: parking_lot::Mutex::new(None),
        }
    }

    pub fn with_uniform_delay(inner: Arc<dyn VfsBackend>, delay: Duration) -> Self {
        Self::new(inner, SlowBackendConfig::uniform(delay))
    }

    /// Make every following call fail (or succeed again with `None`)
    pub fn inject_failure(&self, failure: Option<InjectedFailure>) {
        *self.failure.lock() = failure;
    }

    pub async fn metrics(&self) -> BackendMetrics {
        self.metrics.lock().await.clone()
    }

    pub async fn reset_metrics(&self) {
        self.metrics.lock().await.reset();
    }

    async fn add_delay(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
            self.metrics.lock().await.total_delay_time += delay;
        }
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().as_ref() {
            Some(failure) => Err(failure.to_error(self.inner.name())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SlowBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlowBackend")
            .field("inner", &self.inner.name())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl VfsBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn list(&self) -> Result<Vec<String>> {
        self.add_delay(self.config.list_delay).await;
        self.metrics.lock().await.list_calls += 1;
        self.check_failure()?;
        self.inner.list().await
    }

    async fn read(&self, path: &str) -> Result<Option<String>> {
        self.add_delay(self.config.read_delay).await;
        self.metrics.lock().await.read_calls += 1;
        self.check_failure()?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.add_delay(self.config.write_delay).await;
        self.metrics.lock().await.write_calls += 1;
        self.check_failure()?;
        self.inner.write(path, content).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.add_delay(self.config.delete_delay).await;
        self.metrics.lock().await.delete_calls += 1;
        self.check_failure()?;
        self.inner.delete(path).await
    }
}
