//! Time source abstraction for testability.
//!
//! Debounce windows, expected-write expiry and snapshot timestamps all read
//! the clock through `TimeSource`, so production code uses real time while
//! tests advance a logical clock instead of sleeping.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Abstraction over time-related operations.
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Get the current instant for measuring elapsed time.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch.
    ///
    /// Used for persisted timestamps (snapshot records).
    fn unix_millis(&self) -> i64;

    /// Calculate elapsed time since an earlier instant.
    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Type alias for shared time source.
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Production implementation using actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeSource;

impl RealTimeSource {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedTimeSource {
        Arc::new(Self)
    }
}

impl TimeSource for RealTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Test implementation with controllable time.
///
/// - `now()` returns a logical instant based on an internal counter
/// - `unix_millis()` is a fixed base plus the same logical offset
/// - Time only moves when `advance()` is called
///
/// # Example
///
/// ```
/// use webpad::services::time_source::{TimeSource, TestTimeSource};
/// use std::time::Duration;
///
/// let time = TestTimeSource::new();
/// let start = time.now();
/// time.advance(Duration::from_millis(150));
///
/// assert_eq!(time.elapsed_since(start), Duration::from_millis(150));
/// ```
#[derive(Debug)]
pub struct TestTimeSource {
    /// Logical time in nanoseconds since creation.
    logical_nanos: AtomicU64,
    /// Base instant (real time at creation, used for Instant arithmetic).
    base_instant: Instant,
    /// Wall-clock milliseconds reported at logical time zero.
    base_unix_millis: i64,
}

impl Default for TestTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTimeSource {
    /// Logical time starts at zero; the wall clock starts at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::with_unix_millis(1_704_067_200_000)
    }

    pub fn with_unix_millis(base_unix_millis: i64) -> Self {
        Self {
            logical_nanos: AtomicU64::new(0),
            base_instant: Instant::now(),
            base_unix_millis,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Advance logical time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.logical_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Get the logical elapsed time since creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.logical_nanos.load(Ordering::SeqCst))
    }
}

impl TimeSource for TestTimeSource {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn unix_millis(&self) -> i64 {
        self.base_unix_millis + self.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_time_source_now_advances() {
        let ts = RealTimeSource::new();
        let t1 = ts.now();
        std::thread::sleep(Duration::from_millis(1));
        let t2 = ts.now();
        assert!(t2 > t1);
        assert!(ts.unix_millis() > 1_600_000_000_000);
    }

    #[test]
    fn test_time_source_advance() {
        let ts = TestTimeSource::new();
        let start = ts.now();
        let wall = ts.unix_millis();

        ts.advance(Duration::from_millis(120));

        assert_eq!(ts.elapsed_since(start), Duration::from_millis(120));
        assert_eq!(ts.unix_millis() - wall, 120);
    }

    #[test]
    fn test_time_source_does_not_move_on_its_own() {
        let ts = TestTimeSource::new();
        let a = ts.now();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(ts.now(), a);
    }

    #[test]
    fn test_time_source_thread_safe() {
        use std::thread;

        let ts = Arc::new(TestTimeSource::new());
        let ts_clone = ts.clone();

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                ts_clone.advance(Duration::from_millis(1));
            }
        });

        for _ in 0..100 {
            ts.advance(Duration::from_millis(1));
        }

        handle.join().unwrap();

        assert_eq!(ts.elapsed(), Duration::from_millis(200));
    }
}
