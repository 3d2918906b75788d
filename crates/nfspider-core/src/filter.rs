//! Filter specification shared read-only by every worker.

use derive_builder::Builder;
use indexmap::IndexSet;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::FilterError;

/// How per-category verdicts combine into one decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Every configured category must accept (AND).
    #[default]
    All,
    /// At least one configured category must accept (OR).
    Any,
}

/// Commonly sensitive file extensions.
pub const SENSITIVE_EXTENSIONS: &[&str] = &[
    // Password databases
    "kdbx", "kdb", "1pif", "agilekeychain", "opvault", "lpd", "dashlane", "psafe3", "enpass",
    "bwdb", "msecure", "stickypass", "pwm", "rdb", "safe", "zps", "pmvault", "mywallet", "jpass",
    "pwmdb",
    // Keys and certificates
    "pem", "key", "pfx", "p12", "pkcs12", "crt", "cer", "csr", "jks", "keystore", "ppk", "rsa",
    "der", "pub",
    // Config files
    "conf", "config", "cfg", "ini", "env", "yml", "yaml", "json", "xml",
    // Scripts
    "sh", "bash", "ps1", "psm1", "psd1", "bat", "cmd", "vbs",
    // Documents
    "doc", "docx", "xls", "xlsx", "pdf", "txt", "csv", "rtf",
    // Databases
    "sql", "db", "sqlite", "sqlite3", "mdb", "accdb",
    // Backups and disk images
    "bak", "backup", "vmdk", "vhd", "vdi", "dit",
    // Misc
    "htpasswd", "shadow", "passwd",
];

/// Commonly sensitive filename patterns.
pub const SENSITIVE_PATTERNS: &[&str] = &[
    r"passw", r"secret", r"credential", r"private", r"\.env", r"config", r"backup", r"id_rsa",
    r"id_dsa", r"id_ed25519", r"\.pem$", r"\.key$", r"\.ppk$", r"shadow", r"htpasswd",
    r"database", r"dump", r"export", r"user", r"admin", r"login", r"auth", r"token",
    r"api.?key", r"aws", r"azure", r"gcp", r"kube",
];

/// The full set of configured predicates for a run.
///
/// Pattern lists keep their configured order with duplicates removed.
/// Extensions are stored lowercased without a leading dot. Use
/// [`FilterSpec::builder`] to get validated, normalized values.
#[derive(Debug, Clone, Default, Builder, Serialize, Deserialize)]
#[builder(
    setter(into),
    build_fn(private, name = "build_unnormalized", validate = "Self::validate")
)]
pub struct FilterSpec {
    /// Filename regexes, searched (unanchored) in the base name.
    #[builder(default)]
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Extensions to include.
    #[builder(default)]
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Extensions to exclude. Wins over `extensions`.
    #[builder(default)]
    #[serde(default)]
    pub exclude_extensions: Vec<String>,

    /// Content regexes applied to the size-bounded file bytes.
    #[builder(default)]
    #[serde(default)]
    pub content: Vec<String>,

    /// Only descend into directories whose name matches one of these.
    #[builder(default)]
    #[serde(default)]
    pub dirnames: Vec<String>,

    /// Never descend into directories whose name matches one of these.
    #[builder(default)]
    #[serde(default)]
    pub exclude_dirnames: Vec<String>,

    /// Category combination mode.
    #[builder(default)]
    #[serde(default)]
    pub mode: CombineMode,

    /// Make filename and content patterns case-insensitive.
    #[builder(default = "false")]
    #[serde(default)]
    pub case_insensitive: bool,
}

impl FilterSpecBuilder {
    /// Validate patterns and build a normalized spec.
    pub fn build(&self) -> Result<FilterSpec, FilterSpecBuilderError> {
        self.build_unnormalized().map(FilterSpec::normalized)
    }

    fn validate(&self) -> Result<(), String> {
        let case_insensitive = self.case_insensitive.unwrap_or(false);
        let empty = Vec::new();

        compile_patterns(
            self.filenames.as_ref().unwrap_or(&empty),
            case_insensitive,
            "filename",
        )
        .map_err(|e| e.to_string())?;
        compile_byte_patterns(
            self.content.as_ref().unwrap_or(&empty),
            case_insensitive,
            "content",
        )
        .map_err(|e| e.to_string())?;
        compile_patterns(self.dirnames.as_ref().unwrap_or(&empty), true, "dirname")
            .map_err(|e| e.to_string())?;
        compile_patterns(
            self.exclude_dirnames.as_ref().unwrap_or(&empty),
            true,
            "exclude dirname",
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl FilterSpec {
    /// Create a new filter spec builder.
    pub fn builder() -> FilterSpecBuilder {
        FilterSpecBuilder::default()
    }

    /// Deduplicate pattern lists and canonicalize extensions.
    pub fn normalized(self) -> Self {
        Self {
            filenames: dedup(self.filenames),
            extensions: dedup(self.extensions.iter().filter_map(|e| normalize_extension(e))),
            exclude_extensions: dedup(
                self.exclude_extensions
                    .iter()
                    .filter_map(|e| normalize_extension(e)),
            ),
            content: dedup(self.content),
            dirnames: dedup(self.dirnames),
            exclude_dirnames: dedup(self.exclude_dirnames),
            mode: self.mode,
            case_insensitive: self.case_insensitive,
        }
    }

    /// NAME category is configured.
    pub fn has_name_filter(&self) -> bool {
        !self.filenames.is_empty()
    }

    /// EXT category is configured (include or exclude set non-empty).
    pub fn has_extension_filter(&self) -> bool {
        !self.extensions.is_empty() || !self.exclude_extensions.is_empty()
    }

    /// CONTENT category is configured.
    pub fn has_content_filter(&self) -> bool {
        !self.content.is_empty()
    }

    /// No per-file category is configured; every candidate is accepted.
    pub fn is_unfiltered(&self) -> bool {
        !self.has_name_filter() && !self.has_extension_filter() && !self.has_content_filter()
    }
}

/// Lowercase an extension and strip a leading dot. Empty input yields `None`.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// Compile text regexes, optionally forcing case-insensitivity.
pub fn compile_patterns(
    patterns: &[String],
    case_insensitive: bool,
    kind: &'static str,
) -> Result<Vec<Regex>, FilterError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|source| FilterError::InvalidPattern {
                    kind,
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

/// Compile byte regexes for content matching.
pub fn compile_byte_patterns(
    patterns: &[String],
    case_insensitive: bool,
    kind: &'static str,
) -> Result<Vec<regex::bytes::Regex>, FilterError> {
    patterns
        .iter()
        .map(|pattern| {
            regex::bytes::RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|source| FilterError::InvalidPattern {
                    kind,
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    items
        .into_iter()
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}
