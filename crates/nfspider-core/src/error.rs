//! Error and warning types for crawling, filtering and extraction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that stop a crawl before it yields anything.
///
/// Per-path failures during a crawl never surface as this type; they are
/// recorded as [`CrawlWarning`]s and the traversal continues.
#[derive(Debug, Error)]
pub enum TraversalError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Export root is not a directory.
    #[error("Export root is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

impl TraversalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// A filter pattern that failed to compile.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Regex compilation failed.
    #[error("Invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure while extracting one matched file.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Relative path would escape the export's loot directory.
    #[error("Refusing unsafe relative path: {path}")]
    UnsafePath { path: PathBuf },

    /// I/O failure reading the source or writing the destination.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CopyError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Kind of crawl warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Symbolic link target does not exist.
    BrokenSymlink,
    /// Error reading a directory or file.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Directory identity already visited (link cycle or bind mount).
    DirectoryCycle,
    /// File too large for content scanning.
    SizeExceeded,
}

/// Non-fatal warning encountered during a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl CrawlWarning {
    /// Create a new crawl warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from an I/O error, classifying permission failures.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self {
                message: format!("Permission denied: {}", path.display()),
                path,
                kind: WarningKind::PermissionDenied,
            },
            _ => Self {
                message: format!("Read error: {error}"),
                path,
                kind: WarningKind::ReadError,
            },
        }
    }

    /// Create a broken symlink warning.
    pub fn broken_symlink(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Broken symlink: {}", path.display()),
            path,
            kind: WarningKind::BrokenSymlink,
        }
    }

    /// Create a revisited-directory warning.
    pub fn directory_cycle(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Directory already visited: {}", path.display()),
            path,
            kind: WarningKind::DirectoryCycle,
        }
    }

    /// Create a content-scan size skip note.
    pub fn size_exceeded(path: impl Into<PathBuf>, size: u64, limit: u64) -> Self {
        Self {
            path: path.into(),
            message: format!("{size} bytes exceeds content scan limit of {limit} bytes"),
            kind: WarningKind::SizeExceeded,
        }
    }
}
