//! Loot extraction for nfspider.
//!
//! Matched files are copied to
//! `<loot root>/<host>/<flattened export>/<relative path>`. Each export
//! gets its own directory so same-named files from different exports of
//! one host never collide.
//!
//! Extraction is idempotent: an existing destination is reported as
//! already present and left untouched. Copies go through a temporary file
//! in the destination directory and are moved into place only once
//! complete, so a crash never leaves a truncated file under its real name.

mod extractor;
mod layout;
mod summary;

pub use extractor::{CopyOutcome, LootExtractor};
pub use layout::{
    LootLayout, ROOT_EXPORT_SEGMENT, flatten_export_path, sanitize_host, validate_relative,
};
pub use summary::ExtractionSummary;

// Re-export core types
pub use nfspider_core::{CopyError, LootEntry, LootOutcome};
