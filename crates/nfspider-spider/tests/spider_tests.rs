use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use nfspider_core::{
    CombineMode, Export, ExportStatus, FilterSpec, LootOutcome, MatchCategory, MountOptions,
    SpiderConfig,
};
use nfspider_spider::{
    ChannelSink, EventSink, FanoutSink, LocalMounter, MountError, MountHandle, Mounter, Spider,
    SpiderEvent, StaticDiscovery,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn tree(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (relative, contents) in files {
        let path = temp.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    temp
}

fn config(loot: &Path) -> SpiderConfig {
    SpiderConfig::builder()
        .loot_dir(loot)
        .threads(2usize)
        .build()
        .unwrap()
}

fn txt_filter() -> FilterSpec {
    FilterSpec::builder()
        .extensions(vec!["txt".to_string()])
        .build()
        .unwrap()
}

/// Wraps a mounter, counting calls and optionally failing, stalling or panicking.
#[derive(Default)]
struct ScriptedMounter {
    inner: LocalMounter,
    fail: Option<Export>,
    panic_on: Option<Export>,
    acquire_delay: Duration,
    acquired: AtomicUsize,
    released: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedMounter {
    fn new(inner: LocalMounter) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

impl Mounter for ScriptedMounter {
    fn acquire(&self, export: &Export, options: &MountOptions) -> Result<MountHandle, MountError> {
        if self.panic_on.as_ref() == Some(export) {
            panic!("mount helper crashed");
        }
        if self.fail.as_ref() == Some(export) {
            return Err(MountError::NotADirectory {
                path: export.path.as_str().into(),
            });
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.acquire_delay);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire(export, options)
    }

    fn release(&self, handle: &MountHandle) -> Result<(), MountError> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(handle)
    }
}

/// Blocks the pipeline the first time a file matches.
struct StallingSink {
    stall: Duration,
    stalled: AtomicBool,
}

impl EventSink for StallingSink {
    fn emit(&self, event: SpiderEvent) {
        if matches!(event, SpiderEvent::FileMatched(_)) && !self.stalled.swap(true, Ordering::SeqCst)
        {
            std::thread::sleep(self.stall);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_mount_does_not_affect_siblings() {
    let a = tree(&[("notes.txt", "a")]);
    let c = tree(&[("notes.txt", "c")]);
    let loot = TempDir::new().unwrap();

    let ok_a = Export::new("nas01", "/a");
    let broken = Export::new("nas01", "/b");
    let ok_c = Export::new("nas01", "/c");

    let mut mounter = ScriptedMounter::new(
        LocalMounter::new()
            .with_root(ok_a.clone(), a.path())
            .with_root(ok_c.clone(), c.path()),
    );
    mounter.fail = Some(broken.clone());

    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_mounter(Arc::new(mounter));
    let report = spider
        .run_exports(vec![ok_a.clone(), broken.clone(), ok_c.clone()])
        .await;

    assert_eq!(report.exports.len(), 3);
    assert_eq!(report.exports[0].export, ok_a);
    assert!(report.exports[0].is_complete());
    assert!(matches!(
        report.exports[1].status,
        ExportStatus::Failed { .. }
    ));
    assert!(report.exports[2].is_complete());
    assert_eq!(report.total_matches(), 2);
    assert_eq!(report.total_extracted(), 2);
    assert_eq!(report.total_errors(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panicking_unit_reported_as_failed() {
    let a = tree(&[("notes.txt", "a")]);
    let loot = TempDir::new().unwrap();
    let ok = Export::new("nas01", "/a");
    let crashing = Export::new("nas01", "/crash");

    let mut mounter = ScriptedMounter::new(LocalMounter::new().with_root(ok.clone(), a.path()));
    mounter.panic_on = Some(crashing.clone());

    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_mounter(Arc::new(mounter));
    let report = spider.run_exports(vec![crashing, ok]).await;

    match &report.exports[0].status {
        ExportStatus::Failed { reason } => assert!(reason.contains("panicked")),
        other => panic!("unexpected status: {other}"),
    }
    assert!(report.exports[1].is_complete());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timed_out_unit_releases_mount_once() {
    let a = tree(&[("one.txt", "1"), ("two.txt", "2")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/slow");

    let mounter = Arc::new(ScriptedMounter::new(
        LocalMounter::new().with_root(export.clone(), a.path()),
    ));
    let sink = Arc::new(StallingSink {
        stall: Duration::from_secs(3),
        stalled: AtomicBool::new(false),
    });
    let config = SpiderConfig::builder()
        .loot_dir(loot.path())
        .export_timeout_secs(1u64)
        .build()
        .unwrap();

    let spider = Spider::new(config, &txt_filter())
        .unwrap()
        .with_mounter(mounter.clone())
        .with_sink(sink)
        .with_release_grace(Duration::from_millis(100));
    let report = spider.run_exports(vec![export]).await;

    assert_eq!(report.exports[0].status, ExportStatus::TimedOut);
    assert_eq!(report.exports[0].matches, 1);
    assert_eq!(mounter.released.load(Ordering::SeqCst), 1);

    // The stalled worker wakes up, sees the cancellation and stops.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(mounter.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(mounter.released.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mount_finishing_after_timeout_is_undone() {
    let a = tree(&[("one.txt", "1")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/hung");

    let mut mounter = ScriptedMounter::new(LocalMounter::new().with_root(export.clone(), a.path()));
    mounter.acquire_delay = Duration::from_millis(1500);
    let mounter = Arc::new(mounter);
    let config = SpiderConfig::builder()
        .loot_dir(loot.path())
        .export_timeout_secs(1u64)
        .build()
        .unwrap();

    let spider = Spider::new(config, &txt_filter())
        .unwrap()
        .with_mounter(mounter.clone())
        .with_release_grace(Duration::from_millis(50));
    let report = spider.run_exports(vec![export]).await;

    assert_eq!(report.exports[0].status, ExportStatus::TimedOut);
    assert_eq!(report.exports[0].candidates, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(mounter.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(mounter.released.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(loot.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrency_bounded_by_threads() {
    let loot = TempDir::new().unwrap();
    let dirs: Vec<TempDir> = (0..6).map(|_| tree(&[("f.txt", "x")])).collect();

    let mut local = LocalMounter::new();
    let mut exports = Vec::new();
    for (i, dir) in dirs.iter().enumerate() {
        let export = Export::new("nas01", format!("/e{i}"));
        local = local.with_root(export.clone(), dir.path());
        exports.push(export);
    }
    let mut mounter = ScriptedMounter::new(local);
    mounter.acquire_delay = Duration::from_millis(100);
    let mounter = Arc::new(mounter);

    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_mounter(mounter.clone());
    let report = spider.run_exports(exports).await;

    assert_eq!(report.count_where(|s| *s == ExportStatus::Completed), 6);
    let peak = mounter.peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency {peak}");
    assert_eq!(mounter.released.load(Ordering::SeqCst), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_same_path_on_two_exports_extracted_separately() {
    let a = tree(&[("data/notes.txt", "from a")]);
    let b = tree(&[("data/notes.txt", "from b")]);
    let loot = TempDir::new().unwrap();

    let export_a = Export::new("nas01", "/srv/a");
    let export_b = Export::new("nas01", "/srv/b");
    let discovery = StaticDiscovery::new()
        .with_export("nas01", "/srv/a")
        .with_export("nas01", "/srv/b");
    let mounter = LocalMounter::new()
        .with_root(export_a, a.path())
        .with_root(export_b, b.path());

    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_discovery(Arc::new(discovery))
        .with_mounter(Arc::new(mounter));
    let report = spider.run_targets(&["nas01".to_string()]).await;

    assert_eq!(report.total_extracted(), 2);
    let host_dir = loot.path().join("nas01");
    assert_eq!(
        fs::read_to_string(host_dir.join("srv_a/data/notes.txt")).unwrap(),
        "from a"
    );
    assert_eq!(
        fs::read_to_string(host_dir.join("srv_b/data/notes.txt")).unwrap(),
        "from b"
    );

    // Second run over the same loot root copies nothing new.
    let again = spider.run_targets(&["nas01".to_string()]).await;
    assert_eq!(again.total_extracted(), 0);
    assert_eq!(again.total_already_present(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_discovery_failure_is_reported_not_fatal() {
    let a = tree(&[("notes.txt", "a")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");

    let (channel, mut rx) = ChannelSink::channel();
    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_discovery(Arc::new(StaticDiscovery::new().with_export("nas01", "/a")))
        .with_mounter(Arc::new(LocalMounter::new().with_root(export, a.path())))
        .with_sink(Arc::new(channel));

    let report = spider
        .run_targets(&["nas01".to_string(), "offline".to_string()])
        .await;

    assert_eq!(report.discovery_failures.len(), 1);
    assert_eq!(report.discovery_failures[0].host, "offline");
    assert_eq!(report.exports.len(), 1);
    assert!(report.exports[0].is_complete());
    assert!(!report.nothing_discovered());

    let mut saw_failure = false;
    while let Ok(event) = rx.try_recv() {
        saw_failure |= matches!(event, SpiderEvent::DiscoveryFailed(_));
    }
    assert!(saw_failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nothing_discovered() {
    let loot = TempDir::new().unwrap();
    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_discovery(Arc::new(StaticDiscovery::new()));

    let report = spider.run_targets(&["a".to_string(), "b".to_string()]).await;
    assert!(report.nothing_discovered());
    assert_eq!(report.discovery_failures.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_in_order() {
    let a = tree(&[("secret.txt", "password=123"), ("x.conf", "listen 80")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");

    let filter = FilterSpec::builder()
        .content(vec!["password".to_string()])
        .extensions(vec!["conf".to_string()])
        .mode(CombineMode::Any)
        .build()
        .unwrap();
    let (channel, mut rx) = ChannelSink::channel();
    let sink = FanoutSink::new()
        .with(Arc::new(channel))
        .with(Arc::new(nfspider_spider::NullSink));

    let spider = Spider::new(config(loot.path()), &filter)
        .unwrap()
        .with_mounter(Arc::new(LocalMounter::new().with_root(export.clone(), a.path())))
        .with_sink(Arc::new(sink));
    let report = spider.run_exports(vec![export]).await;
    assert_eq!(report.total_matches(), 2);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(SpiderEvent::ExportStarted { .. })));
    assert!(matches!(events.last(), Some(SpiderEvent::ExportFinished(_))));

    let matched: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SpiderEvent::FileMatched(found) => Some(found),
            _ => None,
        })
        .collect();
    assert_eq!(matched.len(), 2);
    // Sorted traversal: secret.txt before x.conf.
    assert!(matched[0].matched_by(MatchCategory::Content));
    assert!(matched[1].matched_by(MatchCategory::Ext));

    let copied = events
        .iter()
        .filter(|e| matches!(e, SpiderEvent::LootExtracted(entry) if entry.outcome == LootOutcome::Copied))
        .count();
    assert_eq!(copied, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_copies_nothing() {
    let a = tree(&[("notes.txt", "a")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");
    let config = SpiderConfig::builder()
        .loot_dir(loot.path())
        .dry_run(true)
        .build()
        .unwrap();

    let spider = Spider::new(config, &txt_filter())
        .unwrap()
        .with_mounter(Arc::new(LocalMounter::new().with_root(export.clone(), a.path())));
    let report = spider.run_exports(vec![export]).await;

    assert_eq!(report.total_matches(), 1);
    assert_eq!(report.total_extracted(), 0);
    assert_eq!(fs::read_dir(loot.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelled_run_reports_cancelled() {
    let a = tree(&[("notes.txt", "a")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");
    let token = CancellationToken::new();
    token.cancel();

    let mounter = Arc::new(ScriptedMounter::new(
        LocalMounter::new().with_root(export.clone(), a.path()),
    ));
    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_mounter(mounter.clone())
        .with_cancel_token(token);
    let report = spider.run_exports(vec![export.clone(), export]).await;

    assert_eq!(report.count_where(|s| *s == ExportStatus::Cancelled), 2);
    assert_eq!(mounter.acquired.load(Ordering::SeqCst), 0);
}

/// Cancels the run as soon as the first file matches.
struct CancelOnMatchSink {
    token: CancellationToken,
    matched: AtomicUsize,
    extracted: AtomicUsize,
}

impl EventSink for CancelOnMatchSink {
    fn emit(&self, event: SpiderEvent) {
        match event {
            SpiderEvent::FileMatched(_) => {
                self.matched.fetch_add(1, Ordering::SeqCst);
                self.token.cancel();
            }
            SpiderEvent::LootExtracted(_) => {
                self.extracted.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_match_reported_after_cancel() {
    let a = tree(&[("a.txt", "a"), ("b.txt", "b"), ("c.txt", "c")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");
    let token = CancellationToken::new();
    let sink = Arc::new(CancelOnMatchSink {
        token: token.clone(),
        matched: AtomicUsize::new(0),
        extracted: AtomicUsize::new(0),
    });

    let spider = Spider::new(config(loot.path()), &txt_filter())
        .unwrap()
        .with_mounter(Arc::new(LocalMounter::new().with_root(export.clone(), a.path())))
        .with_sink(sink.clone())
        .with_cancel_token(token);
    spider.run_exports(vec![export]).await;

    assert_eq!(sink.matched.load(Ordering::SeqCst), 1);
    assert_eq!(sink.extracted.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crawl_stats_and_depth_limit() {
    let a = tree(&[("top.txt", "0"), ("a/b/c/deep.txt", "3")]);
    let loot = TempDir::new().unwrap();
    let export = Export::new("nas01", "/a");
    let config = SpiderConfig::builder()
        .loot_dir(loot.path())
        .max_depth(1u32)
        .build()
        .unwrap();

    let spider = Spider::new(config, &txt_filter())
        .unwrap()
        .with_mounter(Arc::new(LocalMounter::new().with_root(export.clone(), a.path())));
    let report = spider.run_exports(vec![export]).await;

    let unit = &report.exports[0];
    assert_eq!(unit.matches, 1);
    let crawl = unit.crawl.as_ref().unwrap();
    assert_eq!(crawl.files_yielded, 1);
    assert!(crawl.max_depth <= 1);
}
