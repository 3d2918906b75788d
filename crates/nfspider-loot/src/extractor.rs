//! Copies matched files into the loot directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::Builder;
use tracing::{debug, warn};

use nfspider_core::{CopyError, LootEntry, LootOutcome, MatchResult};

use crate::layout::LootLayout;

const TEMP_PREFIX: &str = ".nfspider-";
const TEMP_SUFFIX: &str = ".part";

/// Result of copying one file into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Written; holds the byte count.
    Copied(u64),
    /// The destination existed; nothing was written.
    AlreadyPresent,
}

/// Writes matched files under a [`LootLayout`].
///
/// Concurrent extractors may share a loot root: destinations never
/// collide across exports, and a file is only ever moved into place
/// without clobbering.
#[derive(Debug, Clone)]
pub struct LootExtractor {
    layout: LootLayout,
    dry_run: bool,
    preserve_mtime: bool,
}

impl LootExtractor {
    /// Create an extractor writing below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: LootLayout::new(root),
            dry_run: false,
            preserve_mtime: true,
        }
    }

    /// Only compute destinations; never write.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Carry the source modification time onto copies.
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }

    /// The layout in use.
    pub fn layout(&self) -> &LootLayout {
        &self.layout
    }

    /// Whether this extractor writes nothing.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Extract one match. Failures are reported in the entry, never raised.
    pub fn extract(&self, found: &MatchResult) -> LootEntry {
        let candidate = &found.candidate;
        let mut entry = LootEntry {
            destination: PathBuf::new(),
            export: candidate.export.clone(),
            relative_path: candidate.relative_path.clone(),
            bytes_copied: 0,
            outcome: LootOutcome::DryRun,
        };

        let destination = match self
            .layout
            .destination(&candidate.export, &candidate.relative_path)
        {
            Ok(destination) => destination,
            Err(err) => {
                warn!(export = %candidate.export, "{err}");
                entry.outcome = LootOutcome::Failed {
                    reason: err.to_string(),
                };
                return entry;
            }
        };
        entry.destination = destination;

        if self.dry_run {
            return entry;
        }

        match self.copy_into_place(&candidate.absolute_path, &entry.destination) {
            Ok(CopyOutcome::Copied(bytes)) => {
                debug!(dest = %entry.destination.display(), bytes, "extracted");
                entry.bytes_copied = bytes;
                entry.outcome = LootOutcome::Copied;
            }
            Ok(CopyOutcome::AlreadyPresent) => {
                debug!(dest = %entry.destination.display(), "already present");
                entry.outcome = LootOutcome::AlreadyPresent;
            }
            Err(err) => {
                warn!(export = %candidate.export, "copy failed: {err}");
                entry.outcome = LootOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        }
        entry
    }

    /// Copy `source` to `destination` through a temporary sibling file.
    ///
    /// The destination appears complete or not at all, and an existing
    /// destination is never overwritten.
    pub fn copy_into_place(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<CopyOutcome, CopyError> {
        if fs::symlink_metadata(destination).is_ok() {
            return Ok(CopyOutcome::AlreadyPresent);
        }

        let parent = destination.parent().ok_or_else(|| CopyError::UnsafePath {
            path: destination.to_path_buf(),
        })?;
        fs::create_dir_all(parent).map_err(|e| CopyError::io(parent, e))?;

        let mut reader = File::open(source).map_err(|e| CopyError::io(source, e))?;
        let mtime = self
            .preserve_mtime
            .then(|| reader.metadata().and_then(|m| m.modified()).ok())
            .flatten();

        let mut temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| CopyError::io(parent, e))?;

        let bytes = io::copy(&mut reader, temp.as_file_mut()).map_err(|e| CopyError::io(source, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| CopyError::io(temp.path(), e))?;
        if let Some(mtime) = mtime {
            set_mtime(temp.as_file(), mtime);
        }

        match temp.persist_noclobber(destination) {
            Ok(_) => Ok(CopyOutcome::Copied(bytes)),
            // Another worker or an earlier run got there first.
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                Ok(CopyOutcome::AlreadyPresent)
            }
            Err(err) => Err(CopyError::io(destination, err.error)),
        }
    }
}

fn set_mtime(file: &File, mtime: SystemTime) {
    if let Err(err) = file.set_modified(mtime) {
        debug!("could not preserve mtime: {err}");
    }
}
