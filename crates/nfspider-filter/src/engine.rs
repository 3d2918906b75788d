//! Per-file accept/reject decisions.
//!
//! Each category (NAME, EXT, CONTENT) produces a [`Verdict`]; the verdicts
//! are folded according to the filter's [`CombineMode`]. Evaluation runs in
//! two phases so the content read happens only when it can change the
//! outcome.

use std::collections::{BTreeSet, HashSet};

use regex::Regex;
use tracing::debug;

use nfspider_core::{
    CombineMode, CrawlWarning, FileCandidate, FilterError, FilterSpec, MatchCategory, MatchResult,
    compile_patterns,
};

use crate::content::{ContentScan, ContentScanner, ScanMode};

/// One category's vote on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The category's predicate holds.
    Accept,
    /// The category's predicate fails.
    Reject,
    /// The category has no predicates configured; it does not vote.
    Unconfigured,
    /// The category is configured but could not be evaluated; it abstains.
    Skipped,
}

impl Verdict {
    fn from_match(matched: bool) -> Self {
        if matched { Self::Accept } else { Self::Reject }
    }

    /// Whether the category is configured at all.
    pub fn is_configured(self) -> bool {
        self != Self::Unconfigured
    }
}

/// Fold category verdicts into one decision.
///
/// With nothing configured every candidate is accepted. When every
/// configured category abstained the candidate is rejected. Otherwise
/// `All` requires every voting category to accept and `Any` requires one.
pub fn combine(mode: CombineMode, verdicts: impl IntoIterator<Item = Verdict>) -> bool {
    let mut configured = false;
    let mut voted = false;
    let mut any_accept = false;
    let mut any_reject = false;

    for verdict in verdicts {
        match verdict {
            Verdict::Unconfigured => continue,
            Verdict::Skipped => configured = true,
            Verdict::Accept => {
                configured = true;
                voted = true;
                any_accept = true;
            }
            Verdict::Reject => {
                configured = true;
                voted = true;
                any_reject = true;
            }
        }
    }

    if !configured {
        return true;
    }
    if !voted {
        return false;
    }
    match mode {
        CombineMode::All => !any_reject,
        CombineMode::Any => any_accept,
    }
}

/// Outcome of the pre-content phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precheck {
    /// NAME verdict.
    pub name: Verdict,
    /// EXT verdict.
    pub ext: Verdict,
    /// How to scan content, or `None` if the content read can be skipped.
    pub content_scan: Option<ScanMode>,
}

/// Outcome of evaluating one candidate.
#[derive(Debug)]
pub struct Evaluation {
    /// The match, if the candidate was accepted.
    pub matched: Option<MatchResult>,
    /// Size skip or read failure noted during the content phase.
    pub note: Option<CrawlWarning>,
    /// Whether the file's bytes were read.
    pub content_read: bool,
}

impl Evaluation {
    /// Whether the candidate was accepted.
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Compiled filter predicates, shared read-only across workers.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    mode: CombineMode,
    filenames: Vec<Regex>,
    include_extensions: HashSet<String>,
    exclude_extensions: HashSet<String>,
    content: ContentScanner,
}

impl FilterEngine {
    /// Compile a filter spec. Content is scanned only for files up to `max_filesize` bytes.
    pub fn new(spec: &FilterSpec, max_filesize: u64) -> Result<Self, FilterError> {
        let spec = spec.clone().normalized();
        Ok(Self {
            mode: spec.mode,
            filenames: compile_patterns(&spec.filenames, spec.case_insensitive, "filename")?,
            include_extensions: spec.extensions.iter().cloned().collect(),
            exclude_extensions: spec.exclude_extensions.iter().cloned().collect(),
            content: ContentScanner::from_spec(&spec, max_filesize)?,
        })
    }

    /// Combination mode.
    pub fn mode(&self) -> CombineMode {
        self.mode
    }

    /// The content scanner.
    pub fn content_scanner(&self) -> &ContentScanner {
        &self.content
    }

    /// NAME verdict for a base name.
    pub fn name_verdict(&self, file_name: &str) -> Verdict {
        if self.filenames.is_empty() {
            return Verdict::Unconfigured;
        }
        Verdict::from_match(self.filenames.iter().any(|re| re.is_match(file_name)))
    }

    /// EXT verdict for a lowercased extension (empty for none).
    ///
    /// An empty include set with a non-empty exclude set accepts every
    /// extension that is not excluded.
    pub fn extension_verdict(&self, extension: &str) -> Verdict {
        if self.include_extensions.is_empty() && self.exclude_extensions.is_empty() {
            return Verdict::Unconfigured;
        }
        if self.exclude_extensions.contains(extension) {
            return Verdict::Reject;
        }
        Verdict::from_match(
            self.include_extensions.is_empty() || self.include_extensions.contains(extension),
        )
    }

    /// First phase: NAME and EXT, plus whether content must be read.
    pub fn precheck(&self, candidate: &FileCandidate) -> Precheck {
        let name = self.name_verdict(&candidate.file_name());
        let ext = self.extension_verdict(&candidate.extension());

        let content_scan = if self.content.is_empty() {
            None
        } else {
            match self.mode {
                CombineMode::All if name == Verdict::Reject || ext == Verdict::Reject => None,
                CombineMode::All => Some(ScanMode::Exhaustive),
                CombineMode::Any if name == Verdict::Accept || ext == Verdict::Accept => {
                    Some(ScanMode::Exhaustive)
                }
                CombineMode::Any => Some(ScanMode::FirstMatch),
            }
        };

        Precheck {
            name,
            ext,
            content_scan,
        }
    }

    /// Evaluate a candidate, reading its content if the decision needs it.
    pub fn evaluate(&self, candidate: FileCandidate) -> Evaluation {
        let precheck = self.precheck(&candidate);

        let (content, scan) = match precheck.content_scan {
            Some(mode) => {
                let scan = self
                    .content
                    .scan_path(&candidate.absolute_path, candidate.size, mode);
                let verdict = match &scan {
                    ContentScan::Scanned { hits } => Verdict::from_match(!hits.is_empty()),
                    ContentScan::SizeExceeded { .. } => Verdict::Skipped,
                    ContentScan::Unreadable { .. } => Verdict::Reject,
                };
                (verdict, Some(scan))
            }
            None if self.content.is_empty() => (Verdict::Unconfigured, None),
            // ALL mode already rejected on NAME or EXT.
            None => (Verdict::Reject, None),
        };

        let content_read = matches!(scan, Some(ContentScan::Scanned { .. }));
        let (hits, content_skipped, note) = match scan {
            Some(ContentScan::Scanned { hits }) => (hits, false, None),
            Some(ContentScan::SizeExceeded { size, limit }) => (
                Vec::new(),
                true,
                Some(CrawlWarning::size_exceeded(&candidate.absolute_path, size, limit)),
            ),
            Some(ContentScan::Unreadable { error }) => (
                Vec::new(),
                false,
                Some(CrawlWarning::from_io(&candidate.absolute_path, &error)),
            ),
            None => (Vec::new(), false, None),
        };

        let verdicts = [
            (MatchCategory::Name, precheck.name),
            (MatchCategory::Ext, precheck.ext),
            (MatchCategory::Content, content),
        ];
        let accepted = combine(self.mode, verdicts.iter().map(|(_, v)| *v));

        let matched = accepted.then(|| {
            let categories: BTreeSet<MatchCategory> = verdicts
                .iter()
                .filter(|(_, v)| *v == Verdict::Accept)
                .map(|(c, _)| *c)
                .collect();
            debug!(
                path = %candidate.relative_path.display(),
                categories = ?categories,
                "candidate matched"
            );
            MatchResult {
                candidate,
                matched: categories,
                content_hits: hits,
                content_skipped,
            }
        });

        Evaluation {
            matched,
            note,
            content_read,
        }
    }
}
