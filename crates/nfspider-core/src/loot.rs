//! Loot extraction records.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::export::Export;

/// Terminal result of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LootOutcome {
    /// The file was copied into place.
    Copied,
    /// The destination already existed; nothing was written.
    AlreadyPresent,
    /// Dry run: the destination was computed but nothing was written.
    DryRun,
    /// The copy failed.
    Failed { reason: String },
}

impl LootOutcome {
    /// Whether the attempt failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl std::fmt::Display for LootOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copied => write!(f, "copied"),
            Self::AlreadyPresent => write!(f, "already present"),
            Self::DryRun => write!(f, "dry run"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Record of one extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootEntry {
    /// Where the file was (or would be) written.
    pub destination: PathBuf,
    /// Export the file came from.
    pub export: Export,
    /// Source path relative to the export root.
    pub relative_path: PathBuf,
    /// Bytes written (0 unless copied).
    pub bytes_copied: u64,
    /// What happened.
    pub outcome: LootOutcome,
}
