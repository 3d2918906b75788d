//! Export identity and mount parameters.

use std::fmt;
use std::time::Duration;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One mountable filesystem published by a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Export {
    /// Host the export was discovered on (address or name).
    pub host: CompactString,
    /// Remote path of the export on the host.
    pub path: CompactString,
}

impl Export {
    /// Create a new export.
    pub fn new(host: impl Into<CompactString>, path: impl Into<CompactString>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.path)
    }
}

/// NFS protocol version requested at mount time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum NfsVersion {
    /// Let the mount helper negotiate.
    #[default]
    #[strum(serialize = "auto")]
    #[serde(rename = "auto")]
    Auto,
    #[strum(serialize = "3")]
    #[serde(rename = "3")]
    V3,
    #[strum(serialize = "4")]
    #[serde(rename = "4")]
    V4,
    #[strum(serialize = "4.1")]
    #[serde(rename = "4.1")]
    V4_1,
    #[strum(serialize = "4.2")]
    #[serde(rename = "4.2")]
    V4_2,
}

impl NfsVersion {
    /// The `vers=` mount option value, `None` for auto negotiation.
    pub fn mount_option(&self) -> Option<String> {
        match self {
            Self::Auto => None,
            other => Some(format!("vers={other}")),
        }
    }
}

/// Parameters handed to the mount collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Protocol version.
    pub version: NfsVersion,
    /// Extra comma-separated options appended verbatim.
    pub extra: Option<String>,
    /// Timeout for the mount operation itself.
    pub timeout: Duration,
}

impl MountOptions {
    /// Build the `-o` option list: version, soft mount, retransmit timeout, extras.
    pub fn option_list(&self) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(version) = self.version.mount_option() {
            options.push(version);
        }
        options.push("soft".to_string());
        // timeo is expressed in deciseconds
        options.push(format!("timeo={}", self.timeout.as_secs() * 10));
        if let Some(extra) = self.extra.as_deref().filter(|e| !e.trim().is_empty()) {
            options.push(extra.trim().to_string());
        }
        options
    }
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            version: NfsVersion::Auto,
            extra: None,
            timeout: Duration::from_secs(30),
        }
    }
}
