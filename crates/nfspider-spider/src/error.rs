//! Error types for collaborators and the scheduler.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use nfspider_core::{Export, FilterError};

/// Failure running an external helper command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program did not finish in time and was killed.
    #[error("{program} timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    /// The program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// No async runtime was available to drive the command.
    #[error("Failed to start a runtime for {program}: {source}")]
    Runtime {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure obtaining a host's export list.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The host did not answer or refused the query.
    #[error("Host {host} unreachable: {source}")]
    Unreachable {
        host: String,
        #[source]
        source: CommandError,
    },

    /// The host answered but publishes no exports.
    #[error("No exports found on {host}")]
    NoExports { host: String },
}

/// Failure mounting or unmounting an export.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount helper refused or failed.
    #[error("Mount of {export} failed: {source}")]
    Refused {
        export: Export,
        #[source]
        source: CommandError,
    },

    /// The unmount helper failed.
    #[error("Unmount of {path} failed: {source}")]
    Unmount {
        path: PathBuf,
        #[source]
        source: CommandError,
    },

    /// The local mount point could not be prepared.
    #[error("Mount point {path}: {source}")]
    MountPoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A pre-mounted export root is missing or not a directory.
    #[error("Export root {path} is not a directory")]
    NotADirectory { path: PathBuf },

    /// The lease was released before the mount completed.
    #[error("Mount of {export} abandoned: lease already released")]
    Abandoned { export: Export },
}

/// Errors constructing a [`Spider`](crate::Spider).
#[derive(Debug, Error)]
pub enum SpiderError {
    /// A filter pattern failed to compile.
    #[error(transparent)]
    Filter(#[from] FilterError),
}
