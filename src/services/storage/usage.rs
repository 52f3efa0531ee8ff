//! Storage usage accounting and health classification

use super::kv::entry_cost;
use crate::config::{StorageConfig, StorageLayout};
use serde::Serialize;
use std::fmt;

/// Byte totals per category, using the UTF-16 cost model of [`entry_cost`].
///
/// Every key lands in exactly one bucket, so the buckets always add up to
/// `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageBreakdown {
    pub snapshots: u64,
    pub file_mirror: u64,
    pub autosave: u64,
    pub other: u64,
    pub total: u64,
}

/// Bucket a single key falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageCategory {
    Snapshots,
    FileMirror,
    Autosave,
    Other,
}

impl UsageCategory {
    pub fn of(layout: &StorageLayout, key: &str) -> Self {
        if key == layout.file_mirror_key {
            UsageCategory::FileMirror
        } else if key == layout.autosave_key {
            UsageCategory::Autosave
        } else if layout.is_snapshot_key(key) {
            UsageCategory::Snapshots
        } else {
            UsageCategory::Other
        }
    }
}

impl UsageBreakdown {
    pub fn compute<'a, I>(layout: &StorageLayout, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut usage = UsageBreakdown::default();
        for (key, value) in entries {
            let cost = entry_cost(key, value);
            match UsageCategory::of(layout, key) {
                UsageCategory::Snapshots => usage.snapshots += cost,
                UsageCategory::FileMirror => usage.file_mirror += cost,
                UsageCategory::Autosave => usage.autosave += cost,
                UsageCategory::Other => usage.other += cost,
            }
            usage.total += cost;
        }
        usage
    }

    pub fn categories_sum(&self) -> u64 {
        self.snapshots + self.file_mirror + self.autosave + self.other
    }
}

/// Format a byte count the way the terminal report shows it
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

impl fmt::Display for UsageBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Snapshots:   {}", format_bytes(self.snapshots))?;
        writeln!(f, "  File mirror: {}", format_bytes(self.file_mirror))?;
        writeln!(f, "  Autosave:    {}", format_bytes(self.autosave))?;
        writeln!(f, "  Other:       {}", format_bytes(self.other))?;
        write!(f, "  Total:       {}", format_bytes(self.total))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

/// Usage measured against the configured capacity ceiling
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageHealth {
    pub status: HealthStatus,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    /// 0.0 - 100.0 (may exceed 100 when the ceiling is set below real usage)
    pub percent: f64,
    pub usage: UsageBreakdown,
}

impl StorageHealth {
    pub fn classify(config: &StorageConfig, usage: UsageBreakdown) -> Self {
        let ratio = usage.total as f64 / config.capacity_bytes as f64;
        let status = if ratio >= config.critical_ratio {
            HealthStatus::Critical
        } else if ratio >= config.warning_ratio {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };

        Self {
            status,
            used_bytes: usage.total,
            capacity_bytes: config.capacity_bytes,
            percent: ratio * 100.0,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compute(entries: &[(&str, &str)]) -> UsageBreakdown {
        UsageBreakdown::compute(&StorageLayout::default(), entries.iter().copied())
    }

    #[test]
    fn test_categories() {
        let usage = compute(&[
            ("snapshots_a", "[]"),
            ("snapshots_b", "[1]"),
            ("vfs_files_v1", "{}"),
            ("autosave_v1", "x"),
            ("theme", "dark"),
        ]);

        assert_eq!(usage.snapshots, (11 + 2) * 2 + (11 + 3) * 2);
        assert_eq!(usage.file_mirror, (12 + 2) * 2);
        assert_eq!(usage.autosave, (11 + 1) * 2);
        assert_eq!(usage.other, (5 + 4) * 2);
        assert_eq!(usage.total, usage.categories_sum());
    }

    #[test]
    fn test_health_thresholds() {
        let config = StorageConfig {
            capacity_bytes: 100,
            ..StorageConfig::default()
        };
        let at = |total| {
            StorageHealth::classify(
                &config,
                UsageBreakdown {
                    other: total,
                    total,
                    ..Default::default()
                },
            )
            .status
        };

        assert_eq!(at(79), HealthStatus::Ok);
        assert_eq!(at(80), HealthStatus::Warning);
        assert_eq!(at(89), HealthStatus::Warning);
        assert_eq!(at(90), HealthStatus::Critical);
        assert_eq!(at(150), HealthStatus::Critical);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    proptest! {
        #[test]
        fn prop_buckets_sum_to_total(
            entries in proptest::collection::btree_map(
                prop_oneof![
                    "snapshots_[a-z0-9]{0,8}",
                    Just("vfs_files_v1".to_string()),
                    Just("autosave_v1".to_string()),
                    "[a-z_]{0,12}",
                ],
                ".{0,40}",
                0..20,
            )
        ) {
            let usage = UsageBreakdown::compute(
                &StorageLayout::default(),
                entries.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            let whole: u64 = entries.iter().map(|(k, v)| entry_cost(k, v)).sum();
            prop_assert_eq!(usage.total, whole);
            prop_assert_eq!(usage.categories_sum(), whole);
        }
    }
}
