//! Directory identity tracking for cycle-free traversal.

use std::fs::Metadata;

use dashmap::DashSet;

/// Identity of a directory on its filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirIdentity {
    /// Device ID.
    pub device: u64,
    /// Inode number.
    pub inode: u64,
}

impl DirIdentity {
    /// Create a new identity.
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Identity from (link-followed) metadata.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self::new(metadata.dev(), metadata.ino()))
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None // No stable inode numbers; rely on link following being off
    }
}

/// Tracks visited directories so no directory is listed twice within an export.
///
/// A symlink loop or a bind mount presents the same (device, inode) pair
/// under a new path; the second sighting is refused.
#[derive(Debug, Default)]
pub struct DirectoryTracker {
    seen: DashSet<DirIdentity>,
}

impl DirectoryTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Mark a directory visited. Returns `true` if this is the first visit.
    pub fn visit(&self, identity: DirIdentity) -> bool {
        self.seen.insert(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_once() {
        let tracker = DirectoryTracker::new();
        let id = DirIdentity::new(1, 12345);

        assert!(tracker.visit(id));
        assert!(!tracker.visit(id));
    }

    #[test]
    fn test_same_inode_other_device() {
        let tracker = DirectoryTracker::new();

        assert!(tracker.visit(DirIdentity::new(1, 99)));
        assert!(tracker.visit(DirIdentity::new(2, 99)));
    }
}
