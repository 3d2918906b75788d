//! Optional TOML configuration file.
//!
//! ```toml
//! [spider]
//! threads = 8
//! max_depth = 6
//! loot_dir = "/srv/loot"
//!
//! [filter]
//! extensions = ["kdbx", "pem"]
//! exclude_dirnames = ["^proc$"]
//!
//! [log]
//! dir = "/var/log/nfspider"
//! ```
//!
//! Every key is optional. Command line flags override these values; list
//! flags are appended to the lists given here.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, bail};
use serde::Deserialize;

use nfspider_core::{FilterSpec, SpiderConfig, default_log_dir};

/// Contents of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    /// Run defaults.
    pub spider: SpiderConfig,
    /// Filter defaults.
    pub filter: FilterSpec,
    /// Run log file.
    pub log: LogSettings,
}

/// Where each run's log file is written.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// Write a log file at all.
    pub enabled: bool,
    /// Directory holding `nfspider_<timestamp>.log` files.
    pub dir: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
        }
    }
}

impl FileSettings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse config file")
    }

    /// Load `explicit` if given, otherwise the default location if it exists.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings =
            Self::from_toml(&text).with_context(|| format!("In {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(settings)
    }
}

/// `<config_dir>/nfspider/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nfspider").join("config.toml"))
}
