//! Directory-name gate applied while descending.

use regex::Regex;

use nfspider_core::{FilterError, FilterSpec, compile_patterns};

/// Decides whether the crawler descends into a directory by its name.
///
/// Include patterns restrict descent to matching names when non-empty;
/// exclude patterns always win. Both are case-insensitive searches.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl DirectoryFilter {
    /// Compile include and exclude name patterns.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FilterError> {
        Ok(Self {
            include: compile_patterns(include, true, "dirname")?,
            exclude: compile_patterns(exclude, true, "exclude dirname")?,
        })
    }

    /// Directory gates from a filter spec.
    pub fn from_spec(spec: &FilterSpec) -> Result<Self, FilterError> {
        Self::new(&spec.dirnames, &spec.exclude_dirnames)
    }

    /// A filter that descends everywhere.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether a directory with this name may be descended into.
    pub fn allows(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(name));
        included && !self.exclude.iter().any(|re| re.is_match(name))
    }
}
