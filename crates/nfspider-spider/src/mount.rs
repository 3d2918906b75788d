//! Mount collaborators and the scoped mount lease.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use nfspider_core::{Export, MountOptions};

use crate::command;
use crate::error::{CommandError, MountError};

/// Upper bound for one `umount` call.
const UMOUNT_TIMEOUT: Duration = Duration::from_secs(30);

/// A mounted export, readable under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountHandle {
    export: Export,
    root: PathBuf,
}

impl MountHandle {
    /// Create a handle for an export mounted at `root`.
    pub fn new(export: Export, root: impl Into<PathBuf>) -> Self {
        Self {
            export,
            root: root.into(),
        }
    }

    /// The mounted export.
    pub fn export(&self) -> &Export {
        &self.export
    }

    /// Local directory the export is readable at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Makes exports readable on the local filesystem.
///
/// Implementations block; the scheduler calls them from blocking tasks.
pub trait Mounter: Send + Sync {
    /// Mount an export.
    fn acquire(&self, export: &Export, options: &MountOptions) -> Result<MountHandle, MountError>;

    /// Unmount a previously acquired export.
    fn release(&self, handle: &MountHandle) -> Result<(), MountError>;
}

/// Mounts with the system `mount` and `umount` helpers.
///
/// Each export gets a fresh directory under `base_dir`, removed again
/// after a successful unmount.
#[derive(Debug)]
pub struct SystemMounter {
    mount_program: String,
    umount_program: String,
    base_dir: PathBuf,
    counter: AtomicU64,
}

impl SystemMounter {
    /// Create a mounter placing mount points in the system temp directory.
    pub fn new() -> Self {
        Self {
            mount_program: "mount".to_string(),
            umount_program: "umount".to_string(),
            base_dir: std::env::temp_dir(),
            counter: AtomicU64::new(0),
        }
    }

    /// Place mount points under `base_dir`.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Use different `mount` and `umount` binaries.
    pub fn with_programs(mut self, mount: impl Into<String>, umount: impl Into<String>) -> Self {
        self.mount_program = mount.into();
        self.umount_program = umount.into();
        self
    }

    /// Lazily unmount `mount_point`, then remove the directory.
    ///
    /// The directory is removed even when `umount` fails, which it does
    /// for a point that was never mounted.
    fn detach(&self, mount_point: &Path) -> Result<(), MountError> {
        let args = vec!["-l".to_string(), mount_point.to_string_lossy().into_owned()];
        let unmounted = command::run(&self.umount_program, &args, UMOUNT_TIMEOUT)
            .map(|_| ())
            .map_err(|source| MountError::Unmount {
                path: mount_point.to_path_buf(),
                source,
            });
        if let Err(err) = std::fs::remove_dir(mount_point) {
            debug!(path = %mount_point.display(), "could not remove mount point: {err}");
        }
        unmounted
    }

    fn next_mount_point(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.base_dir
            .join(format!("nfspider_{}_{n}", std::process::id()))
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new()
    }
}

/// `host:/path`, bracketing IPv6 addresses.
pub fn mount_source(export: &Export) -> String {
    if export.host.contains(':') {
        format!("[{}]:{}", export.host, export.path)
    } else {
        format!("{}:{}", export.host, export.path)
    }
}

impl Mounter for SystemMounter {
    fn acquire(&self, export: &Export, options: &MountOptions) -> Result<MountHandle, MountError> {
        let mount_point = self.next_mount_point();
        std::fs::create_dir_all(&mount_point).map_err(|source| MountError::MountPoint {
            path: mount_point.clone(),
            source,
        })?;

        let source = mount_source(export);
        let target = mount_point.to_string_lossy().into_owned();
        let optioned = vec![
            "-t".to_string(),
            "nfs".to_string(),
            "-o".to_string(),
            options.option_list().join(","),
            source.clone(),
            target.clone(),
        ];

        let result = command::run(&self.mount_program, &optioned, options.timeout).or_else(|err| {
            debug!(%export, "mount with options failed, retrying bare: {err}");
            if matches!(err, CommandError::TimedOut { .. }) {
                // The kernel may have finished the mount the helper was killed in.
                let args = vec!["-l".to_string(), target.clone()];
                if let Err(err) = command::run(&self.umount_program, &args, UMOUNT_TIMEOUT) {
                    debug!(%export, "unmount before retry: {err}");
                }
            }
            let bare = vec!["-t".to_string(), "nfs".to_string(), source, target];
            command::run(&self.mount_program, &bare, options.timeout)
        });

        match result {
            Ok(_) => {
                debug!(%export, mount_point = %mount_point.display(), "mounted");
                Ok(MountHandle::new(export.clone(), mount_point))
            }
            Err(source) => {
                if let Err(err) = self.detach(&mount_point) {
                    debug!(%export, "cleanup after failed mount: {err}");
                }
                Err(MountError::Refused {
                    export: export.clone(),
                    source,
                })
            }
        }
    }

    fn release(&self, handle: &MountHandle) -> Result<(), MountError> {
        self.detach(handle.root())
    }
}

/// Treats local directories as already-mounted exports.
///
/// By default an export's path is used as its root; [`LocalMounter::with_root`]
/// maps specific exports elsewhere.
#[derive(Debug, Clone, Default)]
pub struct LocalMounter {
    roots: HashMap<Export, PathBuf>,
}

impl LocalMounter {
    /// Create a mounter using export paths as local roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `export` from `root`.
    pub fn with_root(mut self, export: Export, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(export, root.into());
        self
    }
}

impl Mounter for LocalMounter {
    fn acquire(&self, export: &Export, _options: &MountOptions) -> Result<MountHandle, MountError> {
        let root = self
            .roots
            .get(export)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(export.path.as_str()));
        if !root.is_dir() {
            return Err(MountError::NotADirectory { path: root });
        }
        Ok(MountHandle::new(export.clone(), root))
    }

    fn release(&self, _handle: &MountHandle) -> Result<(), MountError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LeaseState {
    handle: Option<MountHandle>,
    released: bool,
}

/// Holds at most one mount and guarantees it is released exactly once.
///
/// The supervisor and the worker both hold the lease. Whichever calls
/// [`release`](MountLease::release) first unmounts; later calls and the
/// drop are no-ops. A mount that completes after the lease was released
/// is undone immediately.
pub struct MountLease {
    mounter: Arc<dyn Mounter>,
    state: Mutex<LeaseState>,
}

impl MountLease {
    /// Create an empty lease.
    pub fn new(mounter: Arc<dyn Mounter>) -> Self {
        Self {
            mounter,
            state: Mutex::new(LeaseState::default()),
        }
    }

    /// Mount an export and keep its handle. Returns the local root.
    pub fn acquire(&self, export: &Export, options: &MountOptions) -> Result<PathBuf, MountError> {
        if self.is_released() {
            return Err(MountError::Abandoned {
                export: export.clone(),
            });
        }

        let handle = self.mounter.acquire(export, options)?;
        let root = handle.root().to_path_buf();

        let mut state = self.lock();
        if state.released {
            drop(state);
            self.unmount(&handle);
            return Err(MountError::Abandoned {
                export: export.clone(),
            });
        }
        state.handle = Some(handle);
        Ok(root)
    }

    /// Unmount if mounted. Safe to call any number of times.
    pub fn release(&self) {
        let handle = {
            let mut state = self.lock();
            state.released = true;
            state.handle.take()
        };
        if let Some(handle) = handle {
            self.unmount(&handle);
        }
    }

    /// Whether the lease has been released.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Whether a mount is currently held.
    pub fn is_mounted(&self) -> bool {
        self.lock().handle.is_some()
    }

    fn unmount(&self, handle: &MountHandle) {
        match self.mounter.release(handle) {
            Ok(()) => debug!(export = %handle.export(), "released mount"),
            Err(err) => warn!(export = %handle.export(), "{err}"),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MountLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MountLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountLease")
            .field("state", &*self.lock())
            .finish()
    }
}
