//! Export crawling for nfspider.
//!
//! This crate walks a mounted export and yields regular-file candidates
//! lazily, so filtering and extraction can start before the walk ends.
//!
//! # Overview
//!
//! - **Depth bound** measured from the export root (root entries are depth 0)
//! - **Directory gating** by name, applied before descent
//! - **Cycle safety** via (device, inode) tracking of visited directories
//! - **Cancellation** through a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!
//! Unreadable paths never abort a crawl; they are collected as
//! [`CrawlWarning`]s and returned from [`Crawl::finish`].
//!
//! # Example
//!
//! ```rust,no_run
//! use nfspider_scan::{Crawler, Export};
//!
//! let export = Export::new("10.0.0.5", "/srv/share");
//! let mut crawl = Crawler::new(export, "/tmp/nfspider_mnt")
//!     .max_depth(3)
//!     .crawl()
//!     .unwrap();
//!
//! for candidate in crawl.by_ref() {
//!     println!("{} ({} bytes)", candidate.relative_path.display(), candidate.size);
//! }
//! let (stats, warnings) = crawl.finish();
//! println!("{} files, {} warnings", stats.files_yielded, warnings.len());
//! ```

mod crawler;
mod dirfilter;
mod progress;
mod tracker;

pub use crawler::{Crawl, Crawler};
pub use dirfilter::DirectoryFilter;
pub use tracker::{DirIdentity, DirectoryTracker};

// Re-export core types for convenience
pub use nfspider_core::{
    CrawlStats, CrawlWarning, Export, FileCandidate, TraversalError, WarningKind,
};
