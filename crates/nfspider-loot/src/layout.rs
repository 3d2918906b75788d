//! On-disk loot directory layout.
//!
//! `<root>/<host>/<flattened export>/<relative path>`: one directory per
//! host, one flattened segment per export, then the file's path below the
//! export root unchanged.

use std::path::{Component, Path, PathBuf};

use nfspider_core::{CopyError, Export};

/// Segment used for the root export `/`.
pub const ROOT_EXPORT_SEGMENT: &str = "_root_";

/// Segment used for an empty host name.
const EMPTY_HOST_SEGMENT: &str = "%";

/// Make a host usable as one directory name. IPv6 `:` becomes `_`.
///
/// Distinct hosts always give distinct segments: a literal `_` is
/// written as `%5F`, so `fe80::1` and `fe80__1` stay apart.
pub fn sanitize_host(host: &str) -> String {
    if host.is_empty() {
        return EMPTY_HOST_SEGMENT.to_string();
    }
    encode_segment(host, ':')
}

/// Flatten an export path into one directory name.
///
/// `/srv/nfs/data` becomes `srv_nfs_data` and `/` becomes `_root_`.
/// A literal `_` is written as `%5F`, so `/srv/data` and `/srv_data` map to
/// `srv_data` and `srv%5Fdata`.
pub fn flatten_export_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return ROOT_EXPORT_SEGMENT.to_string();
    }
    encode_segment(trimmed, '/')
}

/// Encode `raw` as a single path segment.
///
/// `separator` becomes `_`. Every other character that is `_`, `%`, or not
/// allowed inside a segment is percent-encoded, so the mapping is
/// reversible. A segment of only dots is encoded entirely.
fn encode_segment(raw: &str, separator: char) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            c if c == separator => out.push('_'),
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            '\0' => out.push_str("%00"),
            c => out.push(c),
        }
    }
    if out.chars().all(|c| c == '.') {
        out.replace('.', "%2E")
    } else {
        out
    }
}

/// Check that a relative path stays below the directory it is joined to.
pub fn validate_relative(relative: &Path) -> Result<(), CopyError> {
    let mut has_normal = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(CopyError::UnsafePath {
                    path: relative.to_path_buf(),
                });
            }
        }
    }
    if !has_normal {
        return Err(CopyError::UnsafePath {
            path: relative.to_path_buf(),
        });
    }
    Ok(())
}

/// Maps exports and relative paths to loot destinations.
#[derive(Debug, Clone)]
pub struct LootLayout {
    root: PathBuf,
}

impl LootLayout {
    /// Create a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The loot root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything taken from a host.
    pub fn host_dir(&self, host: &str) -> PathBuf {
        self.root.join(sanitize_host(host))
    }

    /// Directory holding everything taken from one export.
    pub fn export_dir(&self, export: &Export) -> PathBuf {
        self.host_dir(&export.host)
            .join(flatten_export_path(&export.path))
    }

    /// Destination for a file of an export.
    pub fn destination(&self, export: &Export, relative: &Path) -> Result<PathBuf, CopyError> {
        validate_relative(relative)?;
        Ok(self.export_dir(export).join(relative))
    }
}
