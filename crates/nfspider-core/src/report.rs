//! Per-export and whole-run reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::error::CrawlWarning;
use crate::export::Export;

/// Traversal statistics for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Directories encountered below the root.
    pub dirs_seen: u64,
    /// Directories not descended because of name filters.
    pub dirs_pruned: u64,
    /// Directories not descended because they were already visited.
    pub dirs_revisited: u64,
    /// Regular files yielded as candidates.
    pub files_yielded: u64,
    /// Bytes across yielded candidates.
    pub bytes_yielded: u64,
    /// Sockets, devices, fifos and unfollowed links.
    pub special_skipped: u64,
    /// Per-path errors recorded and skipped.
    pub errors: u64,
    /// Deepest candidate depth seen.
    pub max_depth: u32,
}

impl CrawlStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a yielded file.
    pub fn record_file(&mut self, size: u64, depth: u32) {
        self.files_yielded += 1;
        self.bytes_yielded += size;
        self.max_depth = self.max_depth.max(depth);
    }
}

/// How an export unit ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    /// The crawl ran to completion.
    Completed,
    /// Mount, root traversal or worker failure.
    Failed { reason: String },
    /// The per-export wall-clock budget expired.
    TimedOut,
    /// The run was cancelled before or while the export was processed.
    Cancelled,
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one export unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    /// The export processed.
    pub export: Export,
    /// How the unit ended.
    pub status: ExportStatus,
    /// Candidates evaluated by the filter engine.
    pub candidates: u64,
    /// Files accepted by the filter engine.
    pub matches: u64,
    /// Files copied into the loot directory.
    pub extracted: u64,
    /// Files skipped because the loot copy already existed.
    pub already_present: u64,
    /// Extraction attempts that failed.
    pub copy_failures: u64,
    /// Traversal statistics, absent when the crawl never finished.
    pub crawl: Option<CrawlStats>,
    /// Non-fatal warnings recorded during the crawl.
    pub warnings: Vec<CrawlWarning>,
    /// Wall-clock time spent on the unit.
    pub elapsed: Duration,
}

impl ExportReport {
    /// A report with no activity and the given status.
    pub fn new(export: Export, status: ExportStatus) -> Self {
        Self {
            export,
            status,
            candidates: 0,
            matches: 0,
            extracted: 0,
            already_present: 0,
            copy_failures: 0,
            crawl: None,
            warnings: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether the unit completed its crawl.
    pub fn is_complete(&self) -> bool {
        self.status == ExportStatus::Completed
    }
}

/// A host whose export list could not be obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryFailure {
    /// Target host.
    pub host: CompactString,
    /// Why discovery failed.
    pub reason: String,
}

/// Aggregated outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock time.
    pub elapsed: Duration,
    /// Hosts that failed discovery.
    pub discovery_failures: Vec<DiscoveryFailure>,
    /// One report per export, in scheduling order.
    pub exports: Vec<ExportReport>,
}

impl RunReport {
    /// An empty report starting now.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            discovery_failures: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Zero exports were discovered: the only run-level failure condition.
    pub fn nothing_discovered(&self) -> bool {
        self.exports.is_empty()
    }

    /// Total matched files across exports.
    pub fn total_matches(&self) -> u64 {
        self.exports.iter().map(|r| r.matches).sum()
    }

    /// Total files copied across exports.
    pub fn total_extracted(&self) -> u64 {
        self.exports.iter().map(|r| r.extracted).sum()
    }

    /// Total copies skipped as already present.
    pub fn total_already_present(&self) -> u64 {
        self.exports.iter().map(|r| r.already_present).sum()
    }

    /// Exports that did not complete, plus hosts that failed discovery.
    pub fn total_errors(&self) -> usize {
        self.discovery_failures.len() + self.exports.iter().filter(|r| !r.is_complete()).count()
    }

    /// Count of exports with a given status discriminant.
    pub fn count_where(&self, predicate: impl Fn(&ExportStatus) -> bool) -> usize {
        self.exports.iter().filter(|r| predicate(&r.status)).count()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_report_totals() {
        let mut run = RunReport::new();
        assert!(run.nothing_discovered());

        let mut ok = ExportReport::new(Export::new("a", "/x"), ExportStatus::Completed);
        ok.matches = 3;
        ok.extracted = 2;
        ok.already_present = 1;
        let failed = ExportReport::new(
            Export::new("a", "/y"),
            ExportStatus::Failed {
                reason: "mount refused".to_string(),
            },
        );
        run.exports = vec![ok, failed];
        run.discovery_failures.push(DiscoveryFailure {
            host: "b".into(),
            reason: "unreachable".to_string(),
        });

        assert!(!run.nothing_discovered());
        assert_eq!(run.total_matches(), 3);
        assert_eq!(run.total_extracted(), 2);
        assert_eq!(run.total_already_present(), 1);
        assert_eq!(run.total_errors(), 2);
        assert_eq!(
            run.count_where(|s| matches!(s, ExportStatus::Failed { .. })),
            1
        );
    }

    #[test]
    fn test_crawl_stats_record() {
        let mut stats = CrawlStats::new();
        stats.record_file(100, 2);
        stats.record_file(50, 1);
        assert_eq!(stats.files_yielded, 2);
        assert_eq!(stats.bytes_yielded, 150);
        assert_eq!(stats.max_depth, 2);
    }
}
