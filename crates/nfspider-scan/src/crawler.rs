//! Lazy, depth-bounded export crawler built on jwalk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::{DirEntryIter, Parallelism, WalkDir};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nfspider_core::{
    CrawlStats, CrawlWarning, Export, FileCandidate, TraversalError, WarningKind,
};

use crate::dirfilter::DirectoryFilter;
use crate::progress::CrawlCounters;
use crate::tracker::{DirIdentity, DirectoryTracker};

/// Crawl settings for one mounted export.
///
/// Consumed by [`Crawler::crawl`]; a crawl cannot be restarted.
#[derive(Debug, Clone)]
pub struct Crawler {
    export: Export,
    root: PathBuf,
    max_depth: u32,
    dir_filter: Arc<DirectoryFilter>,
    follow_symlinks: bool,
    cancel: CancellationToken,
}

impl Crawler {
    /// Create a crawler for an export mounted at `root`.
    pub fn new(export: Export, root: impl Into<PathBuf>) -> Self {
        Self {
            export,
            root: root.into(),
            max_depth: u32::MAX,
            dir_filter: Arc::new(DirectoryFilter::allow_all()),
            follow_symlinks: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Directories at this depth are listed but not descended.
    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Gate descent by directory name.
    pub fn dir_filter(mut self, dir_filter: Arc<DirectoryFilter>) -> Self {
        self.dir_filter = dir_filter;
        self
    }

    /// Follow symbolic links to files and directories.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Stop yielding candidates once this token is cancelled.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start the crawl. Fails only if the root itself is unusable.
    pub fn crawl(self) -> Result<Crawl, TraversalError> {
        let root_metadata =
            std::fs::metadata(&self.root).map_err(|e| TraversalError::io(&self.root, e))?;
        if !root_metadata.is_dir() {
            return Err(TraversalError::NotADirectory { path: self.root });
        }

        let tracker = Arc::new(DirectoryTracker::new());
        if let Some(identity) = DirIdentity::from_metadata(&root_metadata) {
            tracker.visit(identity);
        }
        let counters = Arc::new(CrawlCounters::default());

        let walker = WalkDir::new(&self.root)
            .parallelism(Parallelism::Serial)
            .sort(true)
            .skip_hidden(false)
            .follow_links(self.follow_symlinks)
            .min_depth(1)
            // jwalk counts the root as depth 0, export depth is one less
            .max_depth((self.max_depth as usize).saturating_add(1))
            .process_read_dir({
                let dir_filter = Arc::clone(&self.dir_filter);
                let tracker = Arc::clone(&tracker);
                let counters = Arc::clone(&counters);
                let cancel = self.cancel.clone();
                let max_depth = self.max_depth as usize;
                move |_depth, _path, _state, children| {
                    if cancel.is_cancelled() {
                        children.clear();
                        return;
                    }
                    for entry in children.iter_mut().flatten() {
                        if !entry.file_type.is_dir() || entry.read_children_path.is_none() {
                            continue;
                        }
                        if entry.depth.saturating_sub(1) >= max_depth {
                            entry.read_children_path = None;
                            continue;
                        }

                        let name = entry.file_name.to_string_lossy();
                        if !dir_filter.allows(&name) {
                            debug!(dir = %entry.path().display(), "directory filtered");
                            counters.record_pruned();
                            entry.read_children_path = None;
                            continue;
                        }

                        let path = entry.path();
                        match std::fs::metadata(&path) {
                            Ok(metadata) => {
                                let first_visit = DirIdentity::from_metadata(&metadata)
                                    .is_none_or(|identity| tracker.visit(identity));
                                if !first_visit {
                                    debug!(dir = %path.display(), "directory already visited");
                                    counters.record_revisit(CrawlWarning::directory_cycle(&path));
                                    entry.read_children_path = None;
                                }
                            }
                            Err(err) => {
                                counters.push_warning(CrawlWarning::from_io(&path, &err));
                                entry.read_children_path = None;
                            }
                        }
                    }
                }
            });

        Ok(Crawl {
            entries: walker.into_iter(),
            export: self.export,
            root: self.root,
            max_depth: self.max_depth,
            cancel: self.cancel,
            counters,
            stats: CrawlStats::new(),
            warnings: Vec::new(),
        })
    }
}

/// Lazy sequence of regular-file candidates under an export root.
pub struct Crawl {
    entries: DirEntryIter<((), ())>,
    export: Export,
    root: PathBuf,
    max_depth: u32,
    cancel: CancellationToken,
    counters: Arc<CrawlCounters>,
    stats: CrawlStats,
    warnings: Vec<CrawlWarning>,
}

impl Crawl {
    /// Export root being crawled.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Statistics so far.
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// Finish the crawl, returning statistics and every recorded warning.
    pub fn finish(mut self) -> (CrawlStats, Vec<CrawlWarning>) {
        let mut warnings = self.counters.drain_into(&mut self.stats);
        warnings.append(&mut self.warnings);
        self.stats.errors = warnings
            .iter()
            .filter(|w| w.kind != WarningKind::DirectoryCycle)
            .count() as u64;
        (self.stats, warnings)
    }

    fn record(&mut self, warning: CrawlWarning) {
        debug!(path = %warning.path.display(), "{}", warning.message);
        self.warnings.push(warning);
    }

    fn candidate(&self, path: PathBuf, size: u64, depth: u32) -> Option<FileCandidate> {
        let relative_path = path.strip_prefix(&self.root).ok()?.to_path_buf();
        Some(FileCandidate {
            export: self.export.clone(),
            relative_path,
            absolute_path: path,
            size,
            depth,
        })
    }
}

impl Iterator for Crawl {
    type Item = FileCandidate;

    fn next(&mut self) -> Option<FileCandidate> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => CrawlWarning::from_io(path, io),
                        None => CrawlWarning::new(
                            path,
                            err.to_string(),
                            WarningKind::ReadError,
                        ),
                    };
                    self.record(warning);
                    continue;
                }
            };

            if entry.depth == 0 {
                continue;
            }
            let depth = (entry.depth - 1) as u32;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.stats.dirs_seen += 1;
                if let Some(err) = &entry.read_children_error {
                    let path = entry.path();
                    let warning = match err.io_error() {
                        Some(io) => CrawlWarning::from_io(&path, io),
                        None => CrawlWarning::new(
                            &path,
                            err.to_string(),
                            WarningKind::ReadError,
                        ),
                    };
                    self.record(warning);
                }
                continue;
            }

            if depth > self.max_depth {
                continue;
            }

            let path = entry.path();
            if file_type.is_symlink() {
                self.stats.special_skipped += 1;
                if std::fs::metadata(&path).is_err() {
                    self.record(CrawlWarning::broken_symlink(&path));
                }
                continue;
            }

            if !file_type.is_file() {
                debug!(path = %path.display(), "skipping special file");
                self.stats.special_skipped += 1;
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    let warning = match err.io_error() {
                        Some(io) => CrawlWarning::from_io(&path, io),
                        None => CrawlWarning::new(
                            &path,
                            err.to_string(),
                            WarningKind::MetadataError,
                        ),
                    };
                    self.record(warning);
                    continue;
                }
            };
            if !metadata.is_file() {
                self.stats.special_skipped += 1;
                continue;
            }

            let size = metadata.len();
            if let Some(candidate) = self.candidate(path, size, depth) {
                self.stats.record_file(size, depth);
                return Some(candidate);
            }
        }
    }
}
