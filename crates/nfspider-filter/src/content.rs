//! Size-bounded content pattern scanning.
//!
//! Files larger than the ceiling are never read. Smaller files are read
//! into memory once and every pattern runs over the raw bytes, so binary
//! files are searched as-is and invalid UTF-8 simply fails to match text
//! patterns.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use regex::bytes::Regex;
use tracing::debug;

use nfspider_core::{ContentHit, FilterError, FilterSpec, compile_byte_patterns};

/// Bytes of context kept on each side of a match.
pub const SNIPPET_CONTEXT: usize = 50;

/// Maximum snippet length in characters.
pub const SNIPPET_MAX_CHARS: usize = 200;

/// How many patterns to evaluate per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Run every pattern so each one that matches gets a snippet.
    Exhaustive,
    /// Stop at the first pattern that matches.
    FirstMatch,
}

/// Result of scanning one file.
#[derive(Debug)]
pub enum ContentScan {
    /// File was read; `hits` holds one entry per matching pattern, in pattern order.
    Scanned { hits: Vec<ContentHit> },
    /// File is larger than the ceiling and was not read.
    SizeExceeded { size: u64, limit: u64 },
    /// File could not be opened or read.
    Unreadable { error: io::Error },
}

impl ContentScan {
    /// Whether at least one pattern matched.
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Scanned { hits } if !hits.is_empty())
    }
}

/// Applies content regexes to files no larger than a size ceiling.
#[derive(Debug, Clone)]
pub struct ContentScanner {
    patterns: Vec<Regex>,
    max_filesize: u64,
}

impl ContentScanner {
    /// Create a scanner from compiled byte patterns.
    pub fn new(patterns: Vec<Regex>, max_filesize: u64) -> Self {
        Self {
            patterns,
            max_filesize,
        }
    }

    /// Compile the content patterns of a filter spec.
    pub fn from_spec(spec: &FilterSpec, max_filesize: u64) -> Result<Self, FilterError> {
        let patterns = compile_byte_patterns(&spec.content, spec.case_insensitive, "content")?;
        Ok(Self::new(patterns, max_filesize))
    }

    /// No content patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of configured patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Size ceiling in bytes.
    pub fn max_filesize(&self) -> u64 {
        self.max_filesize
    }

    /// Scan a file whose size was observed as `size` at crawl time.
    pub fn scan_path(&self, path: &Path, size: u64, mode: ScanMode) -> ContentScan {
        if size > self.max_filesize {
            debug!(path = %path.display(), size, limit = self.max_filesize, "content scan skipped");
            return ContentScan::SizeExceeded {
                size,
                limit: self.max_filesize,
            };
        }

        match self.read_bounded(path) {
            Ok(Some(buffer)) => ContentScan::Scanned {
                hits: self.scan_bytes(&buffer, mode),
            },
            // The file grew past the ceiling after it was crawled.
            Ok(None) => ContentScan::SizeExceeded {
                size: self.max_filesize.saturating_add(1),
                limit: self.max_filesize,
            },
            Err(error) => {
                debug!(path = %path.display(), %error, "content scan failed");
                ContentScan::Unreadable { error }
            }
        }
    }

    /// Run the patterns over an in-memory buffer.
    pub fn scan_bytes(&self, haystack: &[u8], mode: ScanMode) -> Vec<ContentHit> {
        let mut hits = Vec::new();
        for (pattern_index, regex) in self.patterns.iter().enumerate() {
            let Some(found) = regex.find(haystack) else {
                continue;
            };
            hits.push(ContentHit {
                pattern_index,
                snippet: snippet(haystack, found.start(), found.end()),
            });
            if mode == ScanMode::FirstMatch {
                break;
            }
        }
        hits
    }

    /// Read at most the ceiling. `None` if the file holds more than that.
    fn read_bounded(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        let file = File::open(path)?;
        let mut buffer = Vec::new();
        file.take(self.max_filesize.saturating_add(1))
            .read_to_end(&mut buffer)?;
        if buffer.len() as u64 > self.max_filesize {
            return Ok(None);
        }
        Ok(Some(buffer))
    }
}

/// Context around `haystack[start..end]`, decoded lossily on one line.
pub fn snippet(haystack: &[u8], start: usize, end: usize) -> String {
    let from = start.saturating_sub(SNIPPET_CONTEXT);
    let to = end.saturating_add(SNIPPET_CONTEXT).min(haystack.len());
    let text = String::from_utf8_lossy(&haystack[from..to]);

    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(SNIPPET_MAX_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}
