//! Concurrent, isolated processing of export units.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use nfspider_core::{
    DiscoveryFailure, Export, ExportReport, ExportStatus, FilterSpec, RunReport, SpiderConfig,
};
use nfspider_filter::FilterEngine;
use nfspider_loot::LootExtractor;
use nfspider_scan::DirectoryFilter;

use crate::discovery::{ExportDiscovery, ShowmountDiscovery};
use crate::error::SpiderError;
use crate::events::{EventSink, SpiderEvent, TracingSink};
use crate::mount::{MountLease, Mounter, SystemMounter};
use crate::pipeline::{self, UnitContext, UnitOutput, UnitTally};

/// How long a cancelled unit gets to wind down before its mount is pulled.
const DEFAULT_RELEASE_GRACE: Duration = Duration::from_secs(5);

/// Runs the crawl, filter and extract pipeline over many exports.
///
/// At most `threads` exports are processed at once. Each export runs on
/// the blocking pool under its own wall-clock budget; a failure, panic or
/// timeout in one export never affects another.
pub struct Spider {
    config: Arc<SpiderConfig>,
    engine: Arc<FilterEngine>,
    dir_filter: Arc<DirectoryFilter>,
    extractor: Arc<LootExtractor>,
    discovery: Arc<dyn ExportDiscovery>,
    mounter: Arc<dyn Mounter>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
    release_grace: Duration,
}

impl Spider {
    /// Create a spider with the system `showmount` and `mount` helpers.
    pub fn new(config: SpiderConfig, filter: &FilterSpec) -> Result<Self, SpiderError> {
        let engine = FilterEngine::new(filter, config.max_filesize)?;
        let dir_filter = DirectoryFilter::from_spec(filter)?;
        let extractor = LootExtractor::new(&config.loot_dir).dry_run(config.dry_run);
        let discovery = ShowmountDiscovery::new(config.operation_timeout());

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            dir_filter: Arc::new(dir_filter),
            extractor: Arc::new(extractor),
            discovery: Arc::new(discovery),
            mounter: Arc::new(SystemMounter::new()),
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
            release_grace: DEFAULT_RELEASE_GRACE,
        })
    }

    /// Use a different export discovery.
    pub fn with_discovery(mut self, discovery: Arc<dyn ExportDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }

    /// Use a different mounter.
    pub fn with_mounter(mut self, mounter: Arc<dyn Mounter>) -> Self {
        self.mounter = mounter;
        self
    }

    /// Send events to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Cancel the whole run when `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Time a timed-out or cancelled unit gets before its mount is released.
    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Discover the exports of every host, then process them all.
    pub async fn run_targets(&self, hosts: &[String]) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new();

        let (exports, failures) = self.discover(hosts).await;
        info!(
            hosts = hosts.len(),
            exports = exports.len(),
            failed = failures.len(),
            "discovery finished"
        );

        let mut run = self.run_exports(exports).await;
        report.discovery_failures = failures;
        report.exports = std::mem::take(&mut run.exports);
        report.elapsed = started.elapsed();
        report
    }

    /// Query every host for its exports, at most `threads` at a time.
    ///
    /// Results keep host order. Failed hosts contribute no exports.
    pub async fn discover(&self, hosts: &[String]) -> (Vec<Export>, Vec<DiscoveryFailure>) {
        let semaphore = Arc::new(Semaphore::new(self.config.threads));
        let mut set = JoinSet::new();

        for (index, host) in hosts.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let discovery = Arc::clone(&self.discovery);
            let cancel = self.cancel.clone();
            let host = host.clone();

            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                if permit.is_none() {
                    return (index, host, Err("cancelled".to_string()));
                }
                let query = host.clone();
                let joined = tokio::task::spawn_blocking(move || discovery.discover(&query)).await;
                let result = match joined {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(err) => Err(join_failure(&err)),
                };
                (index, host, result)
            });
        }

        let mut slots: Vec<Option<(String, Result<Vec<Export>, String>)>> =
            (0..hosts.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, host, result)) => slots[index] = Some((host, result)),
                Err(err) => warn!("discovery task failed: {err}"),
            }
        }

        let mut exports = Vec::new();
        let mut failures = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let (host, result) = slot.unwrap_or_else(|| {
                (hosts[index].clone(), Err("discovery task aborted".to_string()))
            });
            match result {
                Ok(found) => {
                    debug!(%host, count = found.len(), "exports discovered");
                    exports.extend(found);
                }
                Err(reason) => {
                    let failure = DiscoveryFailure {
                        host: host.into(),
                        reason,
                    };
                    self.sink.emit(SpiderEvent::DiscoveryFailed(failure.clone()));
                    failures.push(failure);
                }
            }
        }
        (exports, failures)
    }

    /// Process exports, at most `threads` at a time.
    ///
    /// Returns one report per export, in input order.
    pub async fn run_exports(&self, exports: Vec<Export>) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new();
        let semaphore = Arc::new(Semaphore::new(self.config.threads));
        let mut set = JoinSet::new();

        let mut slots: Vec<ExportReport> = exports
            .iter()
            .map(|export| {
                ExportReport::new(
                    export.clone(),
                    ExportStatus::Failed {
                        reason: "worker task aborted".to_string(),
                    },
                )
            })
            .collect();

        for (index, export) in exports.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let unit = self.unit(export);

            set.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = unit.parent.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let report = match permit {
                    Some(_permit) => unit.supervise().await,
                    None => ExportReport::new(unit.export, ExportStatus::Cancelled),
                };
                (index, report)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, unit_report)) => slots[index] = unit_report,
                Err(err) => warn!("export task failed: {err}"),
            }
        }

        report.exports = slots;
        report.elapsed = started.elapsed();
        report
    }

    fn unit(&self, export: Export) -> Unit {
        Unit {
            export,
            config: Arc::clone(&self.config),
            engine: Arc::clone(&self.engine),
            dir_filter: Arc::clone(&self.dir_filter),
            extractor: Arc::clone(&self.extractor),
            mounter: Arc::clone(&self.mounter),
            sink: Arc::clone(&self.sink),
            parent: self.cancel.clone(),
            release_grace: self.release_grace,
        }
    }
}

/// One export's share of the run, owned by its supervising task.
struct Unit {
    export: Export,
    config: Arc<SpiderConfig>,
    engine: Arc<FilterEngine>,
    dir_filter: Arc<DirectoryFilter>,
    extractor: Arc<LootExtractor>,
    mounter: Arc<dyn Mounter>,
    sink: Arc<dyn EventSink>,
    parent: CancellationToken,
    release_grace: Duration,
}

impl Unit {
    /// Run the blocking pipeline under the export's time budget.
    async fn supervise(self) -> ExportReport {
        let started = Instant::now();
        self.sink.emit(SpiderEvent::ExportStarted {
            export: self.export.clone(),
        });

        let cancel = self.parent.child_token();
        let lease = Arc::new(MountLease::new(Arc::clone(&self.mounter)));
        let tally = Arc::new(UnitTally::default());
        let ctx = UnitContext {
            export: self.export.clone(),
            config: Arc::clone(&self.config),
            mount_options: self.config.mount_options(),
            engine: Arc::clone(&self.engine),
            dir_filter: Arc::clone(&self.dir_filter),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            lease: Arc::clone(&lease),
            tally: Arc::clone(&tally),
            cancel: cancel.clone(),
        };

        let mut handle = tokio::task::spawn_blocking(move || pipeline::run_unit(ctx));
        let budget = tokio::time::sleep(self.config.export_timeout());

        let (status, output) = tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(output)) => (ExportStatus::Completed, Some(output)),
                Ok(Err(reason)) => (ExportStatus::Failed { reason }, None),
                Err(err) => (ExportStatus::Failed { reason: join_failure(&err) }, None),
            },
            _ = budget => {
                warn!(export = %self.export, "export timed out");
                (ExportStatus::TimedOut, self.wind_down(&cancel, &lease, &mut handle).await)
            }
            _ = self.parent.cancelled() => {
                (ExportStatus::Cancelled, self.wind_down(&cancel, &lease, &mut handle).await)
            }
        };
        lease.release();

        let mut report = ExportReport::new(self.export.clone(), status);
        tally.apply_to(&mut report);
        if let Some(output) = output {
            report.crawl = Some(output.crawl);
            report.warnings = output.warnings;
        }
        report.elapsed = started.elapsed();

        match &report.status {
            ExportStatus::Failed { reason } => self.sink.emit(SpiderEvent::ExportFailed {
                export: self.export.clone(),
                reason: reason.clone(),
            }),
            _ => self.sink.emit(SpiderEvent::ExportFinished(report.clone())),
        }
        report
    }

    /// Cancel the pipeline, give it the grace period, then pull the mount.
    ///
    /// Returns the crawl output if the pipeline finished within the grace.
    async fn wind_down(
        &self,
        cancel: &CancellationToken,
        lease: &MountLease,
        handle: &mut tokio::task::JoinHandle<Result<UnitOutput, String>>,
    ) -> Option<UnitOutput> {
        cancel.cancel();
        let finished = tokio::time::timeout(self.release_grace, handle).await;
        lease.release();
        match finished {
            Ok(Ok(Ok(output))) => Some(output),
            Ok(_) => None,
            Err(_) => {
                debug!(export = %self.export, "worker still busy after release");
                None
            }
        }
    }
}

/// Describe a blocking task that did not return normally.
fn join_failure(err: &JoinError) -> String {
    if err.is_panic() {
        format!("worker panicked: {err}")
    } else {
        format!("worker task failed: {err}")
    }
}
