//! Export discovery, mounting and scheduling for nfspider.
//!
//! This crate ties the crawler, filter engine and loot extractor together
//! into a run over many NFS exports:
//!
//! - **Collaborators** behind traits: [`ExportDiscovery`] lists a host's
//!   exports, [`Mounter`] makes an export readable locally
//! - **Isolation**: each export is a unit with its own mount, time budget
//!   and cancellation token; failures are reported, never propagated
//! - **Events** for every match, extraction and unit outcome, delivered to
//!   an [`EventSink`]
//!
//! # Example
//!
//! ```rust,no_run
//! use nfspider_spider::{FilterSpec, Spider, SpiderConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpiderConfig::builder().threads(4usize).build()?;
//! let filter = FilterSpec::builder()
//!     .extensions(vec!["kdbx".to_string(), "pem".to_string()])
//!     .build()?;
//!
//! let spider = Spider::new(config, &filter)?;
//! let report = spider.run_targets(&["10.0.0.5".to_string()]).await;
//! println!("{} matches", report.total_matches());
//! # Ok(())
//! # }
//! ```
//!
//! The default collaborators shell out to `showmount`, `mount` and
//! `umount`; [`LocalMounter`] and [`StaticDiscovery`] serve directories
//! that are already mounted.

mod command;
mod discovery;
mod error;
mod events;
mod mount;
mod pipeline;
mod scheduler;

pub use command::{CommandOutput, run as run_command};
pub use discovery::{ExportDiscovery, ShowmountDiscovery, StaticDiscovery, parse_showmount};
pub use error::{CommandError, DiscoveryError, MountError, SpiderError};
pub use events::{ChannelSink, EventSink, FanoutSink, NullSink, SpiderEvent, TracingSink};
pub use mount::{LocalMounter, MountHandle, MountLease, Mounter, SystemMounter, mount_source};
pub use scheduler::Spider;

// Re-export core types
pub use nfspider_core::{
    CombineMode, Export, ExportReport, ExportStatus, FilterSpec, MountOptions, NfsVersion,
    RunReport, SpiderConfig,
};
