//! Export discovery collaborators.

use std::collections::BTreeMap;
use std::time::Duration;

use indexmap::IndexSet;
use tracing::debug;

use nfspider_core::Export;

use crate::command;
use crate::error::DiscoveryError;

/// Lists the exports a host publishes.
///
/// Implementations block; the scheduler calls them from blocking tasks.
pub trait ExportDiscovery: Send + Sync {
    /// Exports of `host`, in the order the host reports them.
    fn discover(&self, host: &str) -> Result<Vec<Export>, DiscoveryError>;
}

/// Discovery through `showmount -e <host> --no-headers`.
#[derive(Debug, Clone)]
pub struct ShowmountDiscovery {
    program: String,
    timeout: Duration,
}

impl ShowmountDiscovery {
    /// Create a discovery using `showmount` from `PATH`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "showmount".to_string(),
            timeout,
        }
    }

    /// Use a different `showmount` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl ExportDiscovery for ShowmountDiscovery {
    fn discover(&self, host: &str) -> Result<Vec<Export>, DiscoveryError> {
        let args = vec!["-e".to_string(), host.to_string(), "--no-headers".to_string()];
        let output = command::run(&self.program, &args, self.timeout).map_err(|source| {
            DiscoveryError::Unreachable {
                host: host.to_string(),
                source,
            }
        })?;

        let exports = parse_showmount(host, &output.stdout);
        debug!(host, count = exports.len(), "showmount finished");
        if exports.is_empty() {
            return Err(DiscoveryError::NoExports {
                host: host.to_string(),
            });
        }
        Ok(exports)
    }
}

/// Parse `showmount -e --no-headers` output: the first column of each line.
///
/// Blank lines and any `Export list for` header are ignored; repeated
/// paths are kept once.
pub fn parse_showmount(host: &str, output: &str) -> Vec<Export> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Export list for"))
        .filter_map(|line| line.split_whitespace().next())
        .collect::<IndexSet<&str>>()
        .into_iter()
        .map(|path| Export::new(host, path))
        .collect()
}

/// Discovery from a fixed host-to-exports table.
///
/// Used for pre-mounted local directories and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    exports: BTreeMap<String, Vec<String>>,
}

impl StaticDiscovery {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an export path for a host.
    pub fn with_export(mut self, host: impl Into<String>, path: impl Into<String>) -> Self {
        self.exports.entry(host.into()).or_default().push(path.into());
        self
    }
}

impl ExportDiscovery for StaticDiscovery {
    fn discover(&self, host: &str) -> Result<Vec<Export>, DiscoveryError> {
        match self.exports.get(host) {
            Some(paths) if !paths.is_empty() => {
                Ok(paths.iter().map(|path| Export::new(host, path.as_str())).collect())
            }
            _ => Err(DiscoveryError::NoExports {
                host: host.to_string(),
            }),
        }
    }
}
