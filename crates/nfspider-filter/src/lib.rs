//! Filter evaluation for nfspider.
//!
//! This crate decides which crawled files are interesting:
//!
//! - **Name and extension** checks run first and cost nothing but a string match
//! - **Content** patterns run over at most `max_filesize` bytes of the file,
//!   and only when the outcome still depends on them
//!
//! # Combination
//!
//! Every category that has patterns configured casts a [`Verdict`]. In
//! `All` mode each voting category must accept; in `Any` mode one is
//! enough. A file too large for content scanning abstains on CONTENT and
//! can still match on NAME or EXT.
//!
//! ```rust,ignore
//! use nfspider_filter::{FilterEngine, FilterSpec};
//!
//! let spec = FilterSpec::builder()
//!     .extensions(vec!["conf".to_string()])
//!     .content(vec!["password".to_string()])
//!     .build()
//!     .unwrap();
//! let engine = FilterEngine::new(&spec, 10 * 1024 * 1024).unwrap();
//!
//! for candidate in crawl {
//!     if let Some(found) = engine.evaluate(candidate).matched {
//!         println!("{} {:?}", found.candidate.remote_path(), found.snippet());
//!     }
//! }
//! ```

mod content;
mod engine;

pub use content::{
    ContentScan, ContentScanner, SNIPPET_CONTEXT, SNIPPET_MAX_CHARS, ScanMode, snippet,
};
pub use engine::{Evaluation, FilterEngine, Precheck, Verdict, combine};

// Re-export core types
pub use nfspider_core::{CombineMode, FileCandidate, FilterSpec, MatchCategory, MatchResult};
