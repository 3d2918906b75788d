//! Core types and configuration for nfspider.
//!
//! This crate provides the fundamental data structures shared by the
//! crawler, filter engine, loot extractor and scheduler: exports, file
//! candidates, match results, loot entries, per-export reports, and the
//! filter/run configuration.

mod candidate;
mod config;
mod error;
mod export;
mod filter;
mod loot;
mod report;

pub use candidate::{ContentHit, FileCandidate, MatchCategory, MatchResult};
pub use config::{
    SpiderConfig, SpiderConfigBuilder, SpiderConfigBuilderError, default_log_dir, default_loot_dir,
};
pub use error::{CopyError, CrawlWarning, FilterError, TraversalError, WarningKind};
pub use export::{Export, MountOptions, NfsVersion};
pub use filter::{
    CombineMode, FilterSpec, FilterSpecBuilder, FilterSpecBuilderError, SENSITIVE_EXTENSIONS,
    SENSITIVE_PATTERNS, compile_byte_patterns, compile_patterns, normalize_extension,
};
pub use loot::{LootEntry, LootOutcome};
pub use report::{CrawlStats, DiscoveryFailure, ExportReport, ExportStatus, RunReport};
