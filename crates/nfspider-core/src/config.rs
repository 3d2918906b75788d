//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::export::{MountOptions, NfsVersion};

/// Default content scan ceiling: 10 MiB.
const DEFAULT_MAX_FILESIZE: u64 = 10 * 1024 * 1024;

/// Configuration for a spider run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct SpiderConfig {
    /// Root of the loot directory tree.
    #[builder(default = "default_loot_dir()")]
    pub loot_dir: PathBuf,

    /// Maximum directory depth below an export root.
    #[builder(default = "10")]
    pub max_depth: u32,

    /// Exports processed concurrently.
    #[builder(default = "5")]
    pub threads: usize,

    /// Files larger than this are not content-scanned.
    #[builder(default = "DEFAULT_MAX_FILESIZE")]
    pub max_filesize: u64,

    /// Report matches without copying them.
    #[builder(default = "false")]
    pub dry_run: bool,

    /// Follow symbolic links during traversal.
    #[builder(default = "false")]
    pub follow_symlinks: bool,

    /// NFS protocol version for mounts.
    #[builder(default)]
    pub nfs_version: NfsVersion,

    /// Extra mount options.
    #[builder(default)]
    pub mount_options: Option<String>,

    /// Timeout for discovery and mount operations, in seconds.
    #[builder(default = "30")]
    pub timeout_secs: u64,

    /// Wall-clock budget for one export unit, in seconds.
    #[builder(default = "3600")]
    pub export_timeout_secs: u64,
}

/// `~/.nfspider/loot`, or `./loot` when no home directory is known.
pub fn default_loot_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".nfspider").join("loot"))
        .unwrap_or_else(|| PathBuf::from("loot"))
}

/// `~/.nfspider/logs`, or `./logs` when no home directory is known.
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".nfspider").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl SpiderConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref loot_dir) = self.loot_dir {
            if loot_dir.as_os_str().is_empty() {
                return Err("Loot directory cannot be empty".to_string());
            }
        }
        if self.threads == Some(0) {
            return Err("Thread count must be at least 1".to_string());
        }
        if self.export_timeout_secs == Some(0) {
            return Err("Export timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

impl SpiderConfig {
    /// Create a new config builder.
    pub fn builder() -> SpiderConfigBuilder {
        SpiderConfigBuilder::default()
    }

    /// Options for the mount collaborator.
    pub fn mount_options(&self) -> MountOptions {
        MountOptions {
            version: self.nfs_version,
            extra: self.mount_options.clone(),
            timeout: self.operation_timeout(),
        }
    }

    /// Discovery and mount timeout.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Per-export wall-clock budget.
    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            loot_dir: default_loot_dir(),
            max_depth: 10,
            threads: 5,
            max_filesize: DEFAULT_MAX_FILESIZE,
            dry_run: false,
            follow_symlinks: false,
            nfs_version: NfsVersion::Auto,
            mount_options: None,
            timeout_secs: 30,
            export_timeout_secs: 3600,
        }
    }
}
