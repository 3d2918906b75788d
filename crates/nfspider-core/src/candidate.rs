//! Crawl candidates and filter match results.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::export::Export;

/// A regular file discovered during traversal, not yet filter-evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCandidate {
    /// Export the file belongs to.
    pub export: Export,
    /// Path relative to the export root.
    pub relative_path: PathBuf,
    /// Path under the local mount point.
    pub absolute_path: PathBuf,
    /// Size in bytes at crawl time.
    pub size: u64,
    /// Depth below the export root (entries of the root are depth 0).
    pub depth: u32,
}

impl FileCandidate {
    /// The file's base name.
    pub fn file_name(&self) -> Cow<'_, str> {
        self.relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default()
    }

    /// Lowercased substring after the last `.` of the base name.
    ///
    /// Names without a dot have the empty extension.
    pub fn extension(&self) -> String {
        let name = self.file_name();
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }

    /// `host:export/relative` form used in reports.
    pub fn remote_path(&self) -> String {
        let export_path = self.export.path.trim_end_matches('/');
        format!(
            "{}:{}/{}",
            self.export.host,
            export_path,
            self.relative_path.display()
        )
    }
}

/// A predicate category that can vote on a candidate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MatchCategory {
    /// Filename pattern.
    Name,
    /// File extension.
    Ext,
    /// File content pattern.
    Content,
    /// Directory-name gate. Applied at traversal time, never part of the per-file vote.
    Dir,
}

/// One content pattern that matched, with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHit {
    /// Index of the pattern in the filter spec's content list.
    pub pattern_index: usize,
    /// Bounded context around the first match of the pattern.
    pub snippet: String,
}

/// A candidate accepted by the filter engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// The matched file.
    pub candidate: FileCandidate,
    /// Categories that accepted the file.
    pub matched: BTreeSet<MatchCategory>,
    /// Content pattern hits, in pattern order.
    pub content_hits: Vec<ContentHit>,
    /// Content scanning was skipped because the file exceeded the size ceiling.
    pub content_skipped: bool,
}

impl MatchResult {
    /// Snippet of the first content hit, if any.
    pub fn snippet(&self) -> Option<&str> {
        self.content_hits.first().map(|hit| hit.snippet.as_str())
    }

    /// Whether a category accepted this file.
    pub fn matched_by(&self, category: MatchCategory) -> bool {
        self.matched.contains(&category)
    }
}
