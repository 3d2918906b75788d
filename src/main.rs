//! nfspider - Spider NFS exports for sensitive files.
//!
//! Usage:
//!   nfspider 192.168.1.100 -c 'passw|secret'    Search file contents
//!   nfspider hosts.txt -e pem key pfx kdbx       Search by extension
//!   nfspider --local /mnt/share -f id_rsa        Spider a local directory
//!   nfspider --help                              Show help

mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use itertools::Itertools;
use serde::Serialize;
use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use nfspider_core::{
    CombineMode, ExportStatus, FilterSpec, NfsVersion, RunReport, SENSITIVE_EXTENSIONS,
    SENSITIVE_PATTERNS, SpiderConfig,
};
use nfspider_loot::ExtractionSummary;
use nfspider_spider::{
    EventSink, FanoutSink, LocalMounter, Spider, SpiderEvent, StaticDiscovery, TracingSink,
};

use settings::{FileSettings, LogSettings};

/// Host name given to exports spidered with `--local`.
const LOCAL_HOST: &str = "local";

/// Crates whose log level follows `-v`.
const LOG_TARGETS: &[&str] = &[
    "nfspider",
    "nfspider_core",
    "nfspider_scan",
    "nfspider_filter",
    "nfspider_loot",
    "nfspider_spider",
];

#[derive(Parser)]
#[command(
    name = "nfspider",
    version,
    about = "Spider NFS exports for sensitive files",
    long_about = "nfspider enumerates the exports of NFS servers, mounts each one, \
                  crawls it and copies files that match the configured filters \
                  into a local loot directory.\n\n\
                  At least one of --filenames, --extensions, --exclude-extensions, \
                  --content or --preset is required.",
    after_help = "Examples:\n  \
                  nfspider 192.168.1.100 -c 'passw|secret|credential'\n  \
                  nfspider hosts.txt -e pem key pfx kdbx\n  \
                  nfspider 10.0.0.5 -e pem ppk pub -f 'id_rsa|id_dsa|id_ed25519'\n  \
                  nfspider share.corp.local --dirnames bank financ -c '[0-9]{10,}'"
)]
struct Cli {
    /// IPs, hostnames, or files containing NFS targets (one per line)
    #[arg(required = true, value_name = "TARGET")]
    targets: Vec<String>,

    /// Loot directory (default: ~/.nfspider/loot)
    #[arg(short = 'l', long)]
    loot_dir: Option<PathBuf>,

    /// Report matches without copying them
    #[arg(short = 'n', long)]
    no_download: bool,

    /// Don't display content match snippets
    #[arg(short, long)]
    quiet: bool,

    /// Maximum directory depth to spider (default: 10)
    #[arg(short = 'm', long = "maxdepth", value_name = "DEPTH")]
    max_depth: Option<u32>,

    /// Number of exports processed concurrently (default: 5)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Maximum file size to content-scan, e.g. "10M", "512K", "1G" (default: 10M)
    #[arg(short = 's', long, value_parser = parse_size, value_name = "SIZE")]
    max_filesize: Option<u64>,

    /// Filename patterns to match (regex)
    #[arg(short = 'f', long, num_args = 1.., value_name = "REGEX")]
    filenames: Vec<String>,

    /// File extensions to match
    #[arg(short = 'e', long, num_args = 1.., value_name = "EXT")]
    extensions: Vec<String>,

    /// File extensions to exclude
    #[arg(long, num_args = 1.., value_name = "EXT")]
    exclude_extensions: Vec<String>,

    /// Content patterns to search (regex)
    #[arg(short = 'c', long, num_args = 1.., value_name = "REGEX")]
    content: Vec<String>,

    /// Only spider directories whose name matches one of these patterns
    #[arg(long, num_args = 1.., value_name = "DIR")]
    dirnames: Vec<String>,

    /// Never spider directories whose name matches one of these patterns
    #[arg(long, num_args = 1.., value_name = "DIR")]
    exclude_dirnames: Vec<String>,

    /// Match files accepted by any filter (default: all filters must accept)
    #[arg(short = 'o', long)]
    or_logic: bool,

    /// Make filename and content patterns case-insensitive
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Add a built-in list of sensitive extensions or filename patterns
    #[arg(long, value_enum)]
    preset: Vec<Preset>,

    /// NFS version to use: auto, 3, 4, 4.1, 4.2 (default: auto)
    #[arg(long, value_name = "VERSION")]
    nfs_version: Option<NfsVersion>,

    /// Additional mount options, comma separated
    #[arg(long, value_name = "OPTIONS")]
    mount_options: Option<String>,

    /// Timeout for discovery and mount operations in seconds (default: 30)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Wall-clock budget for one export in seconds (default: 3600)
    #[arg(long, value_name = "SECS")]
    export_timeout: Option<u64>,

    /// Follow symbolic links while crawling
    #[arg(long)]
    follow_symlinks: bool,

    /// Treat targets as already-mounted local directories
    #[arg(long)]
    local: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Config file (default: <config dir>/nfspider/config.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for the run log file (default: ~/.nfspider/logs)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Don't write a run log file
    #[arg(long)]
    no_log_file: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// Commonly sensitive file extensions
    Extensions,
    /// Commonly sensitive filename patterns
    Filenames,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let settings = FileSettings::load(cli.config.as_deref())?;
    let log_dir = run_log_dir(&cli, settings.log);
    let _log_guard = setup_logging(cli.verbose, log_dir.as_deref());

    let config = build_config(&cli, settings.spider)?;
    let filter = build_filter(&cli, settings.filter)?;

    if filter.is_unfiltered() {
        bail!(
            "Please specify at least one of --filenames, --content, --extensions, \
             --exclude-extensions or --preset"
        );
    }
    if filter.mode == CombineMode::Any && filter.has_content_filter() {
        warn!(
            "--or-logic causes files to be content-searched even if filename/extension \
             filters do not match"
        );
    }

    let targets = expand_targets(&cli.targets)?;
    if targets.is_empty() {
        bail!("No targets given");
    }

    let loot = Arc::new(LootTally::default());
    let console: Arc<dyn EventSink> = if cli.quiet {
        Arc::new(QuietSink(TracingSink))
    } else {
        Arc::new(TracingSink)
    };
    let sink = FanoutSink::new()
        .with(console)
        .with(Arc::clone(&loot) as Arc<dyn EventSink>);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, cancelling...");
            ctrl_c.cancel();
        }
    });

    eprintln!("Loot directory: {}", config.loot_dir.display());
    let format = cli.format;
    let mut spider = Spider::new(config, &filter)
        .context("Failed to build filters")?
        .with_sink(Arc::new(sink))
        .with_cancel_token(cancel);

    let hosts = if cli.local {
        let (discovery, mounter) = local_collaborators(&targets)?;
        spider = spider
            .with_discovery(Arc::new(discovery))
            .with_mounter(Arc::new(mounter));
        vec![LOCAL_HOST.to_string()]
    } else {
        targets
    };

    eprintln!(
        "Spidering {} target(s) with {} thread(s)...",
        hosts.len(),
        spider.config().threads
    );
    let report = spider.run_targets(&hosts).await;
    let loot = loot.snapshot();

    match format {
        OutputFormat::Text => print_summary(&report, &loot, spider.config()),
        OutputFormat::Json => {
            let output = JsonOutput {
                report: &report,
                loot: &loot,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if report.nothing_discovered() {
        eprintln!("No NFS exports found to spider");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .join(",");
        EnvFilter::new(format!("{directives},warn"))
    })
}

/// Log to stderr, and to a per-run file when `log_dir` is given.
///
/// The returned guard flushes the file when dropped.
fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let mut guard = None;
    let file_layer = match log_dir.map(open_run_log).transpose() {
        Ok(Some((appender, path))) => {
            eprintln!("Log file: {}", path.display());
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(worker);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(log_filter(verbose)),
            )
        }
        Ok(None) => None,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        }
    };

    let console_layer = fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(log_filter(verbose));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

/// The run log directory, or `None` when file logging is off.
fn run_log_dir(cli: &Cli, settings: LogSettings) -> Option<PathBuf> {
    if cli.no_log_file || !settings.enabled {
        return None;
    }
    Some(cli.log_dir.clone().unwrap_or(settings.dir))
}

/// `nfspider_<YYYYmmdd_HHMMSS>`.
fn run_log_name(started: DateTime<Local>) -> String {
    format!("nfspider_{}", started.format("%Y%m%d_%H%M%S"))
}

/// Create this run's log file in `dir`.
fn open_run_log(dir: &Path) -> Result<(RollingFileAppender, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let name = run_log_name(Local::now());
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.as_str())
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create log file in {}", dir.display()))?;
    Ok((appender, dir.join(format!("{name}.log"))))
}

/// Apply command line overrides on top of file settings.
fn build_config(cli: &Cli, base: SpiderConfig) -> Result<SpiderConfig> {
    SpiderConfig::builder()
        .loot_dir(cli.loot_dir.clone().unwrap_or(base.loot_dir))
        .max_depth(cli.max_depth.unwrap_or(base.max_depth))
        .threads(cli.threads.unwrap_or(base.threads))
        .max_filesize(cli.max_filesize.unwrap_or(base.max_filesize))
        .dry_run(cli.no_download || base.dry_run)
        .follow_symlinks(cli.follow_symlinks || base.follow_symlinks)
        .nfs_version(cli.nfs_version.unwrap_or(base.nfs_version))
        .mount_options(cli.mount_options.clone().or(base.mount_options))
        .timeout_secs(cli.timeout.unwrap_or(base.timeout_secs))
        .export_timeout_secs(cli.export_timeout.unwrap_or(base.export_timeout_secs))
        .build()
        .context("Invalid configuration")
}

/// Merge command line filters and presets into the file's filter.
fn build_filter(cli: &Cli, base: FilterSpec) -> Result<FilterSpec> {
    let mut filenames = base.filenames;
    let mut extensions = base.extensions;
    filenames.extend(cli.filenames.iter().cloned());
    extensions.extend(cli.extensions.iter().cloned());

    if cli.preset.contains(&Preset::Filenames) {
        filenames.extend(SENSITIVE_PATTERNS.iter().map(|p| p.to_string()));
    }
    if cli.preset.contains(&Preset::Extensions) {
        extensions.extend(SENSITIVE_EXTENSIONS.iter().map(|e| e.to_string()));
    }

    let mode = if cli.or_logic { CombineMode::Any } else { base.mode };

    FilterSpec::builder()
        .filenames(filenames)
        .extensions(extensions)
        .exclude_extensions(concat(base.exclude_extensions, &cli.exclude_extensions))
        .content(concat(base.content, &cli.content))
        .dirnames(concat(base.dirnames, &cli.dirnames))
        .exclude_dirnames(concat(base.exclude_dirnames, &cli.exclude_dirnames))
        .mode(mode)
        .case_insensitive(cli.ignore_case || base.case_insensitive)
        .build()
        .context("Invalid filter")
}

fn concat(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    base.extend(extra.iter().cloned());
    base
}

/// Expand target arguments: files are read one target per line.
///
/// Blank lines and lines starting with `#` are ignored. Duplicates are
/// dropped, keeping the first occurrence.
fn expand_targets(args: &[String]) -> Result<Vec<String>> {
    let mut targets = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        if path.is_file() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read targets from {arg}"))?;
            targets.extend(parse_target_lines(&text));
        } else {
            targets.push(arg.trim().to_string());
        }
    }
    Ok(targets
        .into_iter()
        .filter(|t| !t.is_empty())
        .unique()
        .collect())
}

fn parse_target_lines(text: &str) -> impl Iterator<Item = String> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

/// Serve local directories as exports of a single pseudo host.
fn local_collaborators(dirs: &[String]) -> Result<(StaticDiscovery, LocalMounter)> {
    let mut discovery = StaticDiscovery::new();
    for dir in dirs {
        let root = std::fs::canonicalize(dir)
            .with_context(|| format!("Failed to resolve local directory {dir}"))?;
        if !root.is_dir() {
            bail!("Not a directory: {}", root.display());
        }
        discovery = discovery.with_export(LOCAL_HOST, root.to_string_lossy());
    }
    Ok((discovery, LocalMounter::new()))
}

/// Forwards events with content snippets removed.
struct QuietSink<S>(S);

impl<S: EventSink> EventSink for QuietSink<S> {
    fn emit(&self, event: SpiderEvent) {
        match event {
            SpiderEvent::FileMatched(mut found) => {
                found.content_hits.clear();
                self.0.emit(SpiderEvent::FileMatched(found));
            }
            other => self.0.emit(other),
        }
    }
}

/// Counts extraction outcomes as they are reported.
#[derive(Default)]
struct LootTally {
    summary: Mutex<ExtractionSummary>,
}

impl LootTally {
    fn snapshot(&self) -> ExtractionSummary {
        self.summary
            .lock()
            .map(|summary| summary.clone())
            .unwrap_or_default()
    }
}

impl EventSink for LootTally {
    fn emit(&self, event: SpiderEvent) {
        if let SpiderEvent::LootExtracted(entry) = event {
            if let Ok(mut summary) = self.summary.lock() {
                summary.record(&entry);
            }
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    report: &'a RunReport,
    loot: &'a ExtractionSummary,
}

fn print_summary(report: &RunReport, loot: &ExtractionSummary, config: &SpiderConfig) {
    println!();
    println!("{}", "─".repeat(60));
    println!("nfspider summary");
    println!("{}", "─".repeat(60));

    for failure in &report.discovery_failures {
        println!("  {:<40} discovery failed: {}", failure.host, failure.reason);
    }
    for export in &report.exports {
        let status = match &export.status {
            ExportStatus::Completed => format!(
                "{} matched, {} files crawled",
                export.matches,
                export.crawl.as_ref().map_or(0, |c| c.files_yielded)
            ),
            other => other.to_string(),
        };
        println!("  {:<40} {}", export.export.to_string(), status);
    }

    let crawled: u64 = report
        .exports
        .iter()
        .filter_map(|r| r.crawl.as_ref())
        .map(|c| c.bytes_yielded)
        .sum();

    println!("{}", "─".repeat(60));
    println!("  Exports spidered: {}", report.exports.len());
    println!("  Data crawled:     {}", format_size(crawled));
    println!("  Files matched:    {}", report.total_matches());
    if config.dry_run {
        println!("  Not downloaded:   {} (dry run)", loot.dry_run);
    } else {
        println!(
            "  Files downloaded: {} ({})",
            loot.copied,
            format_size(loot.bytes_copied)
        );
        println!("  Already in loot:  {}", loot.already_present);
    }
    if loot.has_failures() {
        println!("  Copy failures:    {}", loot.failed);
    }
    let errors = report.total_errors();
    if errors > 0 {
        println!("  Errors:           {errors}");
    }
    println!("  Elapsed:          {:.1}s", report.elapsed.as_secs_f64());
    println!();
    println!("  Loot saved to: {}", config.loot_dir.display());
    println!("{}", "─".repeat(60));
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Parse a size string (e.g., "10M", "512K", "1G", "100").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = |s: &str| -> Result<f64> {
        let num = s.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
        num.parse().with_context(|| format!("Invalid size: {s}"))
    };

    let (num, multiplier) = if s.ends_with("GB") || s.ends_with('G') {
        (digits(&s)?, 1024 * 1024 * 1024)
    } else if s.ends_with("MB") || s.ends_with('M') {
        (digits(&s)?, 1024 * 1024)
    } else if s.ends_with("KB") || s.ends_with('K') {
        (digits(&s)?, 1024)
    } else {
        (digits(&s)?, 1)
    };

    if num < 0.0 {
        bail!("Size cannot be negative: {s}");
    }
    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10M").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("512k").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1.5KB").unwrap(), 1536);
        assert_eq!(parse_size("100").unwrap(), 100);
        assert_eq!(parse_size("100B").unwrap(), 100);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_target_lines() {
        let text = "# lab hosts\n10.0.0.5\n\n  nas01.corp.local  \n#10.0.0.6\n";
        let targets: Vec<String> = parse_target_lines(text).collect();
        assert_eq!(targets, vec!["10.0.0.5", "nas01.corp.local"]);
    }

    #[test]
    fn test_expand_targets_reads_files_and_dedups() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("hosts.txt");
        std::fs::write(&file, "10.0.0.5\n# skip\n10.0.0.6\n").unwrap();

        let args = vec![
            "10.0.0.6".to_string(),
            file.to_string_lossy().into_owned(),
        ];
        let targets = expand_targets(&args).unwrap();
        assert_eq!(targets, vec!["10.0.0.6", "10.0.0.5"]);
    }

    #[test]
    fn test_cli_overrides_file_settings() {
        let cli = Cli::parse_from([
            "nfspider", "-t", "2", "-s", "1M", "-e", "pem", "key", "-o", "--", "10.0.0.5",
        ]);
        let base = SpiderConfig {
            max_depth: 4,
            threads: 9,
            ..SpiderConfig::default()
        };

        let config = build_config(&cli, base).unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.max_filesize, 1024 * 1024);

        let filter = build_filter(&cli, FilterSpec::default()).unwrap();
        assert_eq!(filter.extensions, vec!["pem", "key"]);
        assert_eq!(filter.mode, CombineMode::Any);
        assert_eq!(cli.targets, vec!["10.0.0.5"]);
    }

    #[test]
    fn test_preset_counts_as_filter() {
        let cli = Cli::parse_from(["nfspider", "--preset", "extensions", "10.0.0.5"]);
        let filter = build_filter(&cli, FilterSpec::default()).unwrap();
        assert!(!filter.is_unfiltered());
        assert!(filter.extensions.iter().any(|e| e == "kdbx"));
        assert!(filter.filenames.is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let cli = Cli::parse_from(["nfspider", "-f", "(unclosed", "--", "10.0.0.5"]);
        assert!(build_filter(&cli, FilterSpec::default()).is_err());
    }

    #[test]
    fn test_run_log_name() {
        let started = Local.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        assert_eq!(run_log_name(started), "nfspider_20260307_140509");
    }

    #[test]
    fn test_open_run_log_creates_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let logs = dir.path().join("logs");

        let (_appender, path) = open_run_log(&logs).unwrap();
        assert!(path.is_file());
        assert_eq!(path.parent(), Some(logs.as_path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("nfspider_") && name.ends_with(".log"));
    }

    #[test]
    fn test_run_log_dir_overrides() {
        let settings = || LogSettings {
            enabled: true,
            dir: PathBuf::from("/from/config"),
        };

        let cli = Cli::parse_from(["nfspider", "-e", "pem", "--", "h"]);
        assert_eq!(run_log_dir(&cli, settings()), Some(PathBuf::from("/from/config")));

        let cli = Cli::parse_from(["nfspider", "--log-dir", "/from/cli", "-e", "pem", "--", "h"]);
        assert_eq!(run_log_dir(&cli, settings()), Some(PathBuf::from("/from/cli")));

        let cli = Cli::parse_from(["nfspider", "--no-log-file", "-e", "pem", "--", "h"]);
        assert_eq!(run_log_dir(&cli, settings()), None);

        let disabled = LogSettings {
            enabled: false,
            ..settings()
        };
        let cli = Cli::parse_from(["nfspider", "-e", "pem", "--", "h"]);
        assert_eq!(run_log_dir(&cli, disabled), None);
    }

    #[test]
    fn test_cli_requires_targets() {
        assert!(Cli::try_parse_from(["nfspider", "-e", "pem"]).is_err());
    }
}
