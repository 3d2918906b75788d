use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use nfspider_core::{Export, FileCandidate, LootOutcome, MatchCategory, MatchResult};
use nfspider_loot::{ExtractionSummary, LootExtractor};
use tempfile::TempDir;

fn found(export: Export, mount: &Path, relative: &str) -> MatchResult {
    let absolute_path = mount.join(relative);
    let size = fs::metadata(&absolute_path).map(|m| m.len()).unwrap_or(0);
    MatchResult {
        candidate: FileCandidate {
            export,
            relative_path: relative.into(),
            absolute_path,
            size,
            depth: 1,
        },
        matched: BTreeSet::from([MatchCategory::Ext]),
        content_hits: Vec::new(),
        content_skipped: false,
    }
}

fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_extraction_is_idempotent() {
    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "data/notes.txt", b"first");

    let extractor = LootExtractor::new(loot.path());
    let m = found(Export::new("nas01", "/srv/a"), mount.path(), "data/notes.txt");

    let first = extractor.extract(&m);
    assert_eq!(first.outcome, LootOutcome::Copied);

    // Source changes between runs; the existing copy is left alone.
    write(mount.path(), "data/notes.txt", b"second");
    let second = extractor.extract(&m);
    assert_eq!(second.outcome, LootOutcome::AlreadyPresent);
    assert_eq!(second.destination, first.destination);
    assert_eq!(second.bytes_copied, 0);
    assert_eq!(fs::read(&first.destination).unwrap(), b"first");

    let files: Vec<_> = fs::read_dir(first.destination.parent().unwrap())
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn test_same_file_from_two_exports_kept_apart() {
    let mount_a = TempDir::new().unwrap();
    let mount_b = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount_a.path(), "data/notes.txt", b"from a");
    write(mount_b.path(), "data/notes.txt", b"from b");

    let extractor = LootExtractor::new(loot.path());
    let a = extractor.extract(&found(
        Export::new("nas01", "/srv/a"),
        mount_a.path(),
        "data/notes.txt",
    ));
    let b = extractor.extract(&found(
        Export::new("nas01", "/srv/b"),
        mount_b.path(),
        "data/notes.txt",
    ));

    assert_eq!(a.outcome, LootOutcome::Copied);
    assert_eq!(b.outcome, LootOutcome::Copied);
    assert_ne!(a.destination, b.destination);
    assert_eq!(a.destination, loot.path().join("nas01/srv_a/data/notes.txt"));
    assert_eq!(b.destination, loot.path().join("nas01/srv_b/data/notes.txt"));
    assert_eq!(fs::read(&a.destination).unwrap(), b"from a");
    assert_eq!(fs::read(&b.destination).unwrap(), b"from b");
}

#[test]
fn test_underscore_export_does_not_collide_with_nested_export() {
    let mount_a = TempDir::new().unwrap();
    let mount_b = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount_a.path(), "notes.txt", b"nested");
    write(mount_b.path(), "notes.txt", b"underscore");

    let extractor = LootExtractor::new(loot.path());
    let nested = extractor.extract(&found(
        Export::new("nas01", "/srv/data"),
        mount_a.path(),
        "notes.txt",
    ));
    let underscore = extractor.extract(&found(
        Export::new("nas01", "/srv_data"),
        mount_b.path(),
        "notes.txt",
    ));

    assert_eq!(nested.outcome, LootOutcome::Copied);
    assert_eq!(underscore.outcome, LootOutcome::Copied);
    assert_ne!(nested.destination, underscore.destination);
    assert_eq!(fs::read(&nested.destination).unwrap(), b"nested");
    assert_eq!(fs::read(&underscore.destination).unwrap(), b"underscore");
}

#[test]
fn test_ipv6_host_does_not_collide_with_underscore_host() {
    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "notes.txt", b"x");

    let extractor = LootExtractor::new(loot.path());
    let v6 = extractor.extract(&found(Export::new("fe80::1", "/e"), mount.path(), "notes.txt"));
    let named = extractor.extract(&found(Export::new("fe80__1", "/e"), mount.path(), "notes.txt"));

    assert_eq!(v6.outcome, LootOutcome::Copied);
    assert_eq!(named.outcome, LootOutcome::Copied);
    assert_ne!(v6.destination, named.destination);
}

#[test]
fn test_root_export_layout() {
    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "home/user/.ssh/id_rsa", b"key");

    let entry = LootExtractor::new(loot.path()).extract(&found(
        Export::new("10.0.0.9", "/"),
        mount.path(),
        "home/user/.ssh/id_rsa",
    ));
    assert_eq!(
        entry.destination,
        loot.path().join("10.0.0.9/_root_/home/user/.ssh/id_rsa")
    );
}

#[test]
fn test_dry_run_writes_nothing() {
    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "x.conf", b"x");

    let extractor = LootExtractor::new(loot.path()).dry_run(true);
    let entry = extractor.extract(&found(Export::new("h", "/e"), mount.path(), "x.conf"));

    assert_eq!(entry.outcome, LootOutcome::DryRun);
    assert_eq!(entry.destination, loot.path().join("h/e/x.conf"));
    assert_eq!(fs::read_dir(loot.path()).unwrap().count(), 0);
}

#[test]
fn test_one_failure_does_not_stop_others() {
    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "ok1.txt", b"1");
    write(mount.path(), "ok2.txt", b"22");

    let export = Export::new("h", "/e");
    let extractor = LootExtractor::new(loot.path());
    let entries: Vec<_> = ["ok1.txt", "missing.txt", "ok2.txt"]
        .iter()
        .map(|r| extractor.extract(&found(export.clone(), mount.path(), r)))
        .collect();

    let summary: ExtractionSummary = entries.iter().collect();
    assert_eq!(summary.copied, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.bytes_copied, 3);
    assert!(entries[1].outcome.is_failure());
}

#[cfg(unix)]
#[test]
fn test_unwritable_destination_reported() {
    use std::os::unix::fs::PermissionsExt;

    let mount = TempDir::new().unwrap();
    let loot = TempDir::new().unwrap();
    write(mount.path(), "a.txt", b"a");
    fs::create_dir_all(loot.path().join("h/e")).unwrap();
    fs::set_permissions(loot.path().join("h/e"), fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores directory permissions; nothing to check then.
    if fs::write(loot.path().join("h/e/write_check"), b"").is_ok() {
        return;
    }

    let entry =
        LootExtractor::new(loot.path()).extract(&found(Export::new("h", "/e"), mount.path(), "a.txt"));
    assert!(entry.outcome.is_failure());
    fs::set_permissions(loot.path().join("h/e"), fs::Permissions::from_mode(0o755)).unwrap();
}
