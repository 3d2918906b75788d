//! Aggregated extraction counts for one export.

use serde::{Deserialize, Serialize};

use nfspider_core::{LootEntry, LootOutcome};

/// Tally of extraction attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Files written.
    pub copied: u64,
    /// Destinations that already existed.
    pub already_present: u64,
    /// Dry-run entries.
    pub dry_run: u64,
    /// Failed attempts.
    pub failed: u64,
    /// Bytes written across copied files.
    pub bytes_copied: u64,
}

impl ExtractionSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one entry.
    pub fn record(&mut self, entry: &LootEntry) {
        match entry.outcome {
            LootOutcome::Copied => {
                self.copied += 1;
                self.bytes_copied += entry.bytes_copied;
            }
            LootOutcome::AlreadyPresent => self.already_present += 1,
            LootOutcome::DryRun => self.dry_run += 1,
            LootOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Total attempts recorded.
    pub fn attempts(&self) -> u64 {
        self.copied + self.already_present + self.dry_run + self.failed
    }

    /// Check if any attempt failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl<'a> FromIterator<&'a LootEntry> for ExtractionSummary {
    fn from_iter<I: IntoIterator<Item = &'a LootEntry>>(iter: I) -> Self {
        let mut summary = Self::new();
        for entry in iter {
            summary.record(entry);
        }
        summary
    }
}
