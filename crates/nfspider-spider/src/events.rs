//! Structured run events and their sinks.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nfspider_core::{
    DiscoveryFailure, Export, ExportReport, ExportStatus, LootEntry, LootOutcome, MatchResult,
};

/// Something that happened during a run, in the order it happened.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpiderEvent {
    /// A host's export list could not be obtained.
    DiscoveryFailed(DiscoveryFailure),
    /// An export unit acquired a worker slot.
    ExportStarted { export: Export },
    /// A file was accepted by the filter engine.
    FileMatched(MatchResult),
    /// An extraction attempt finished.
    LootExtracted(LootEntry),
    /// An export unit ended without failing.
    ExportFinished(ExportReport),
    /// An export unit failed.
    ExportFailed { export: Export, reason: String },
}

/// Receives run events.
///
/// Called from worker threads; implementations must not block for long.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: SpiderEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: SpiderEvent) {
        match event {
            SpiderEvent::DiscoveryFailed(failure) => {
                warn!(host = %failure.host, "discovery failed: {}", failure.reason);
            }
            SpiderEvent::ExportStarted { export } => info!(%export, "spidering export"),
            SpiderEvent::FileMatched(found) => {
                let categories: Vec<String> = found.matched.iter().map(|c| c.to_string()).collect();
                info!(
                    path = %found.candidate.remote_path(),
                    size = found.candidate.size,
                    matched = %categories.join(","),
                    snippet = found.snippet().unwrap_or_default(),
                    "match"
                );
            }
            SpiderEvent::LootExtracted(entry) => match &entry.outcome {
                LootOutcome::Failed { reason } => {
                    warn!(dest = %entry.destination.display(), "extraction failed: {reason}");
                }
                outcome => debug!(dest = %entry.destination.display(), %outcome, "loot"),
            },
            SpiderEvent::ExportFinished(report) => match report.status {
                ExportStatus::Completed => info!(
                    export = %report.export,
                    matches = report.matches,
                    extracted = report.extracted,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "export finished"
                ),
                ref status => warn!(export = %report.export, %status, "export stopped early"),
            },
            SpiderEvent::ExportFailed { export, reason } => {
                warn!(%export, "export failed: {reason}");
            }
        }
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SpiderEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SpiderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: SpiderEvent) {
        // Receiver gone: nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Sends every event to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if there are no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: SpiderEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: SpiderEvent) {}
}
