//! The blocking crawl, filter and extract pipeline for one export.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use nfspider_core::{
    CrawlStats, CrawlWarning, Export, ExportReport, LootOutcome, MountOptions, SpiderConfig,
};
use nfspider_filter::FilterEngine;
use nfspider_loot::LootExtractor;
use nfspider_scan::{Crawler, DirectoryFilter};

use crate::events::{EventSink, SpiderEvent};
use crate::mount::MountLease;

/// Counters a unit updates as it goes, readable after a timeout.
#[derive(Debug, Default)]
pub(crate) struct UnitTally {
    candidates: AtomicU64,
    matches: AtomicU64,
    extracted: AtomicU64,
    already_present: AtomicU64,
    copy_failures: AtomicU64,
}

impl UnitTally {
    fn record_outcome(&self, outcome: &LootOutcome) {
        let counter = match outcome {
            LootOutcome::Copied => &self.extracted,
            LootOutcome::AlreadyPresent => &self.already_present,
            LootOutcome::Failed { .. } => &self.copy_failures,
            LootOutcome::DryRun => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters into a report.
    pub fn apply_to(&self, report: &mut ExportReport) {
        report.candidates = self.candidates.load(Ordering::Relaxed);
        report.matches = self.matches.load(Ordering::Relaxed);
        report.extracted = self.extracted.load(Ordering::Relaxed);
        report.already_present = self.already_present.load(Ordering::Relaxed);
        report.copy_failures = self.copy_failures.load(Ordering::Relaxed);
    }
}

/// Everything a unit needs, shared with the rest of the run.
#[derive(Clone)]
pub(crate) struct UnitContext {
    pub export: Export,
    pub config: Arc<SpiderConfig>,
    pub mount_options: MountOptions,
    pub engine: Arc<FilterEngine>,
    pub dir_filter: Arc<DirectoryFilter>,
    pub extractor: Arc<LootExtractor>,
    pub sink: Arc<dyn EventSink>,
    pub lease: Arc<MountLease>,
    pub tally: Arc<UnitTally>,
    pub cancel: CancellationToken,
}

/// What a finished crawl leaves behind.
#[derive(Debug)]
pub(crate) struct UnitOutput {
    pub crawl: CrawlStats,
    pub warnings: Vec<CrawlWarning>,
}

/// Mount, crawl, filter and extract one export. Blocks.
///
/// Returns the failure reason if the export could not be mounted or its
/// root could not be read. Per-file problems never fail the unit.
pub(crate) fn run_unit(ctx: UnitContext) -> Result<UnitOutput, String> {
    let root = ctx
        .lease
        .acquire(&ctx.export, &ctx.mount_options)
        .map_err(|e| e.to_string())?;

    let crawl = Crawler::new(ctx.export.clone(), root)
        .max_depth(ctx.config.max_depth)
        .dir_filter(Arc::clone(&ctx.dir_filter))
        .follow_symlinks(ctx.config.follow_symlinks)
        .cancel_token(ctx.cancel.clone())
        .crawl();
    let mut crawl = match crawl {
        Ok(crawl) => crawl,
        Err(err) => {
            ctx.lease.release();
            return Err(err.to_string());
        }
    };

    let mut notes = Vec::new();
    for candidate in crawl.by_ref() {
        ctx.tally.candidates.fetch_add(1, Ordering::Relaxed);

        let evaluation = ctx.engine.evaluate(candidate);
        if let Some(note) = evaluation.note {
            notes.push(note);
        }
        let Some(found) = evaluation.matched else {
            continue;
        };

        // A reported match is always followed by its extraction.
        if ctx.cancel.is_cancelled() {
            break;
        }
        ctx.tally.matches.fetch_add(1, Ordering::Relaxed);
        ctx.sink.emit(SpiderEvent::FileMatched(found.clone()));

        let entry = ctx.extractor.extract(&found);
        ctx.tally.record_outcome(&entry.outcome);
        ctx.sink.emit(SpiderEvent::LootExtracted(entry));
    }

    let (crawl, mut warnings) = crawl.finish();
    warnings.append(&mut notes);
    ctx.lease.release();

    debug!(
        export = %ctx.export,
        files = crawl.files_yielded,
        warnings = warnings.len(),
        "crawl finished"
    );
    Ok(UnitOutput { crawl, warnings })
}
