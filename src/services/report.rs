//! User-facing terminal reporting.
//!
//! The storage layer reports quota problems and cleanup results to whatever
//! terminal pane the host application shows. Reporting is fire-and-forget:
//! implementations must not block and must swallow their own failures.

use parking_lot::Mutex;
use std::sync::Arc;

/// Sink for messages shown in the application's terminal pane.
pub trait Reporter: Send + Sync {
    /// Append a tagged line (tags such as "warning", "error", "info").
    fn append_terminal(&self, message: &str, tag: &str);

    /// Append a line only shown when debug output is enabled.
    fn append_terminal_debug(&self, message: &str);
}

pub type SharedReporter = Arc<dyn Reporter>;

/// Forwards every message to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn append_terminal(&self, message: &str, tag: &str) {
        match tag {
            "error" => tracing::error!(target: "webpad::terminal", "{}", message),
            "warning" | "warn" => tracing::warn!(target: "webpad::terminal", "{}", message),
            _ => tracing::info!(target: "webpad::terminal", tag, "{}", message),
        }
    }

    fn append_terminal_debug(&self, message: &str) {
        tracing::debug!(target: "webpad::terminal", "{}", message);
    }
}

/// A reported line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub message: String,
    /// `None` for debug lines
    pub tag: Option<String>,
}

/// Collects reported lines in memory.
#[derive(Debug, Default)]
pub struct BufferReporter {
    lines: Mutex<Vec<ReportLine>>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ReportLine> {
        self.lines.lock().clone()
    }

    /// Non-debug lines carrying `tag`
    pub fn tagged(&self, tag: &str) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.tag.as_deref() == Some(tag))
            .map(|l| l.message.clone())
            .collect()
    }

    pub fn take(&self) -> Vec<ReportLine> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl Reporter for BufferReporter {
    fn append_terminal(&self, message: &str, tag: &str) {
        self.lines.lock().push(ReportLine {
            message: message.to_string(),
            tag: Some(tag.to_string()),
        });
    }

    fn append_terminal_debug(&self, message: &str) {
        self.lines.lock().push(ReportLine {
            message: message.to_string(),
            tag: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_reporter_keeps_order_and_tags() {
        let reporter = BufferReporter::new();
        reporter.append_terminal("quota exceeded", "warning");
        reporter.append_terminal_debug("usage computed");
        reporter.append_terminal("cleanup done", "info");

        let lines = reporter.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].tag, None);
        assert_eq!(reporter.tagged("warning"), vec!["quota exceeded".to_string()]);

        assert_eq!(reporter.take().len(), 3);
        assert!(reporter.lines().is_empty());
    }
}
