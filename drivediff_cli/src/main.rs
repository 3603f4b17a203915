use anyhow::Context;
use clap::{Parser, Subcommand};
use drivediff_common::{
    config_path, ensure_config, load_config, render_config, save_config, AppConfig,
    ComparisonEntry, ComparisonResult, ComparisonStatus, ComparisonSummary, ContentKind,
    DriveDiffError, FileEntry, LoadedConfig, ProgressPhase, RunOutcome, ScanConfiguration, Side,
    StructureResult, StructureStatus, StructureSummary, WalkError,
};
use drivediff_core::{spawn_compare, spawn_compare_structure, RunHandle, TextDiffEngine};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drivediff")]
#[command(version)]
#[command(about = "Compare two directory trees by content or by structure", long_about = None)]
struct Cli {
    /// Configuration file (defaults to drivediff.toml next to the binary or in the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare file contents of two directories
    Compare {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        /// Extra exclude patterns (can be specified multiple times)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Number of hashing workers (overrides the configuration)
        #[arg(short = 't', long)]
        threads: Option<usize>,

        /// Stop after this many files per side (0 = unlimited)
        #[arg(long)]
        max_files: Option<usize>,

        /// Show only differences (hide identical files)
        #[arg(short = 'd', long)]
        diff_only: bool,

        /// Print a unified diff for every modified text file
        #[arg(long)]
        show_diff: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Never draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Compare the directory layout of two trees (no file contents)
    Structure {
        /// Left directory path
        left: PathBuf,

        /// Right directory path
        right: PathBuf,

        /// Extra exclude patterns (can be specified multiple times)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Show only differences (hide common directories)
        #[arg(short = 'd', long)]
        diff_only: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Never draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Write the default configuration file if it does not exist
    InitConfig {
        /// Overwrite an existing file with the defaults
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration and where it was loaded from
    ShowConfig,
}

fn main() {
    let cli = Cli::parse();

    // The configured level is only known once the document is loaded
    let loaded = load_config(cli.config.as_deref());
    let level = loaded
        .as_ref()
        .map(|l| l.config.logging.level.to_ascii_lowercase())
        .unwrap_or_else(|_| "info".to_string());

    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let result = match cli.command {
        Commands::InitConfig { force } => run_init_config(cli.config.as_deref(), force),
        Commands::ShowConfig => require(loaded).and_then(|loaded| run_show_config(&loaded)),
        Commands::Compare {
            left,
            right,
            exclude,
            threads,
            max_files,
            diff_only,
            show_diff,
            json,
            no_progress,
        } => require(loaded).and_then(|loaded| {
            let mut scan = loaded.config.directory_config();
            scan.exclude_patterns.extend(exclude);
            if let Some(threads) = threads {
                scan.performance.worker_threads = threads;
            }
            if let Some(max_files) = max_files {
                scan.performance.max_files = max_files;
            }
            run_compare(left, right, scan, diff_only, show_diff, json, !no_progress && !json)
        }),
        Commands::Structure {
            left,
            right,
            exclude,
            diff_only,
            json,
            no_progress,
        } => require(loaded).and_then(|loaded| {
            let mut scan = loaded.config.structure_config();
            scan.exclude_patterns.extend(exclude);
            run_structure(left, right, scan, diff_only, json, !no_progress && !json)
        }),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn require(loaded: Result<LoadedConfig, DriveDiffError>) -> anyhow::Result<LoadedConfig> {
    let loaded = loaded.context("Failed to load configuration")?;
    info!(
        "Using configuration {}{}",
        loaded.path.display(),
        if loaded.exists { "" } else { " (defaults)" }
    );
    Ok(loaded)
}

fn run_init_config(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    if force {
        let (path, _) = config_path(path)?;
        save_config(&path, &AppConfig::default())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let loaded = ensure_config(path).context("Failed to initialize configuration")?;
    if loaded.exists {
        println!("Configuration already exists at {}", loaded.path.display());
    } else {
        println!("Wrote default configuration to {}", loaded.path.display());
    }
    Ok(())
}

fn run_show_config(loaded: &LoadedConfig) -> anyhow::Result<()> {
    println!(
        "# {}{}",
        loaded.path.display(),
        if loaded.exists { "" } else { " (not present, defaults shown)" }
    );
    print!("{}", render_config(&loaded.config)?);
    Ok(())
}

fn run_compare(
    left: PathBuf,
    right: PathBuf,
    config: ScanConfiguration,
    diff_only: bool,
    show_diff: bool,
    json: bool,
    progress: bool,
) -> anyhow::Result<()> {
    info!("Comparing:");
    info!("  Left:  {}", left.display());
    info!("  Right: {}", right.display());

    let handle = spawn_compare(&left, &right, config)?;
    drive_progress(&handle, progress);
    let result = handle.wait()?;

    if json {
        let report = build_json_report(&result, diff_only);
        let output = serde_json::to_string_pretty(&report)?;
        println!("{output}");
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!("Comparison Results");
    println!("{}", "=".repeat(80));

    for entry in &result.entries {
        if diff_only && entry.status == ComparisonStatus::Identical {
            continue;
        }
        match &entry.error {
            Some(err) => println!(
                "{} {}  [{} side: {}]",
                status_symbol(entry.status),
                entry.relative_path.display(),
                side_name(err.side),
                err.message
            ),
            None => println!("{} {}", status_symbol(entry.status), entry.relative_path.display()),
        }
    }

    if show_diff {
        print_diffs(&result);
    }

    print_summary(&result.summary, result.outcome(), result.partial);
    Ok(())
}

fn print_diffs(result: &ComparisonResult) {
    let engine = TextDiffEngine::new();
    for entry in result.entries.iter().filter(|e| e.is_diffable()) {
        let name = entry.relative_path.to_string_lossy().replace('\\', "/");
        match engine.diff_entry(entry) {
            Ok(Some(diff)) => {
                println!("\n{}", "-".repeat(80));
                print!("{}", diff.to_unified(&name));
            }
            Ok(None) => {}
            Err(e) => warn!("Cannot diff {}: {}", name, e),
        }
    }
}

fn print_summary(summary: &ComparisonSummary, outcome: RunOutcome, partial: bool) {
    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Total entries:   {}", summary.total());
    println!("  Identical:       {} (==)", summary.identical);
    println!("  Modified:        {} (!=)", summary.modified);
    println!("  Left only:       {} (<<)", summary.removed);
    println!("  Right only:      {} (>>)", summary.added);
    println!("  Errors:          {} (!!)", summary.errors);
    print_outcome(outcome, partial);
    println!("{}", "=".repeat(80));
}

fn print_outcome(outcome: RunOutcome, partial: bool) {
    match outcome {
        RunOutcome::Cancelled => println!("  Run was cancelled; results are incomplete"),
        RunOutcome::CompletedWithErrors(n) => println!("  Completed with {} error(s)", n),
        RunOutcome::Completed => {}
    }
    if partial {
        println!("  File limit reached; results are partial");
    }
}

fn run_structure(
    left: PathBuf,
    right: PathBuf,
    config: ScanConfiguration,
    diff_only: bool,
    json: bool,
    progress: bool,
) -> anyhow::Result<()> {
    info!("Comparing structure:");
    info!("  Left:  {}", left.display());
    info!("  Right: {}", right.display());

    let handle = spawn_compare_structure(&left, &right, config)?;
    drive_progress(&handle, progress);
    let result = handle.wait()?;

    if json {
        let output = serde_json::to_string_pretty(&build_structure_report(&result, diff_only))?;
        println!("{output}");
        return Ok(());
    }

    println!("\n{}", "=".repeat(80));
    println!("Structure Comparison Results");
    println!("{}", "=".repeat(80));

    for entry in &result.entries {
        if diff_only && entry.status == StructureStatus::Common {
            continue;
        }
        let symbol = match entry.status {
            StructureStatus::Common => "  ==  ",
            StructureStatus::Removed => "  <<  ",
            StructureStatus::Added => "  >>  ",
        };
        println!("{} {}/", symbol, entry.relative_path.display());
    }

    for (side, errors) in [(Side::Left, &result.left_errors), (Side::Right, &result.right_errors)] {
        for err in errors {
            println!(
                "  !!   {}  [{} side: {}]",
                err.relative_path.display(),
                side_name(side),
                err.message
            );
        }
    }

    let summary = &result.summary;
    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Total directories: {}", summary.total());
    println!("  Common:            {} (==)", summary.common);
    println!("  Left only:         {} (<<)", summary.removed);
    println!("  Right only:        {} (>>)", summary.added);
    print_outcome(result.outcome(), result.partial);
    println!("{}", "=".repeat(80));
    Ok(())
}

/// Feed progress snapshots into a bar until the run closes the stream.
fn drive_progress<T>(handle: &RunHandle<T>, enabled: bool) {
    let bar = (enabled && std::io::stderr().is_terminal()).then(|| {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        bar
    });

    for snapshot in handle.progress().iter() {
        let Some(bar) = &bar else { continue };
        match snapshot.phase {
            ProgressPhase::Scanning => bar.set_message("scanning..."),
            ProgressPhase::Comparing => {
                bar.set_length(snapshot.total as u64);
                bar.set_position(snapshot.processed as u64);
                bar.set_message(snapshot.current_path.display().to_string());
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn status_symbol(status: ComparisonStatus) -> &'static str {
    match status {
        ComparisonStatus::Identical => "  ==  ",
        ComparisonStatus::Modified => "  !=  ",
        ComparisonStatus::Removed => "  <<  ",
        ComparisonStatus::Added => "  >>  ",
        ComparisonStatus::Error => "  !!  ",
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Left => "left",
        Side::Right => "right",
    }
}

#[derive(Serialize)]
struct JsonReport {
    run_id: String,
    left: String,
    right: String,
    outcome: RunOutcome,
    partial: bool,
    summary: ComparisonSummary,
    entries: Vec<JsonEntry>,
}

#[derive(Serialize)]
struct JsonEntry {
    path: String,
    status: ComparisonStatus,
    left: Option<JsonFileSide>,
    right: Option<JsonFileSide>,
    left_hash: Option<String>,
    right_hash: Option<String>,
    content_kind: Option<ContentKind>,
    permissions_differ: bool,
    error: Option<JsonError>,
}

#[derive(Serialize)]
struct JsonFileSide {
    size: u64,
    modified_unix: Option<u64>,
    permissions: String,
}

#[derive(Serialize)]
struct JsonError {
    side: Side,
    message: String,
}

fn build_json_report(result: &ComparisonResult, diff_only: bool) -> JsonReport {
    let entries = result
        .entries
        .iter()
        .filter(|e| !(diff_only && e.status == ComparisonStatus::Identical))
        .map(json_entry)
        .collect();

    JsonReport {
        run_id: result.run_id.to_string(),
        left: result.left_root.to_string_lossy().to_string(),
        right: result.right_root.to_string_lossy().to_string(),
        outcome: result.outcome(),
        partial: result.partial,
        summary: result.summary,
        entries,
    }
}

fn json_entry(entry: &ComparisonEntry) -> JsonEntry {
    JsonEntry {
        path: entry.relative_path.to_string_lossy().replace('\\', "/"),
        status: entry.status,
        left: entry.left.as_ref().map(json_side),
        right: entry.right.as_ref().map(json_side),
        left_hash: entry.left_hash.map(|h| h.to_hex()),
        right_hash: entry.right_hash.map(|h| h.to_hex()),
        content_kind: entry.content_kind,
        permissions_differ: entry.permissions_differ(),
        error: entry.error.as_ref().map(|e| JsonError {
            side: e.side,
            message: e.message.clone(),
        }),
    }
}

fn json_side(entry: &FileEntry) -> JsonFileSide {
    JsonFileSide {
        size: entry.size,
        modified_unix: entry
            .modified
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs()),
        permissions: format!("{:o}", entry.permissions),
    }
}

#[derive(Serialize)]
struct JsonStructureReport<'a> {
    run_id: String,
    left: String,
    right: String,
    outcome: RunOutcome,
    partial: bool,
    summary: StructureSummary,
    entries: Vec<JsonStructureEntry>,
    left_errors: &'a [WalkError],
    right_errors: &'a [WalkError],
}

#[derive(Serialize)]
struct JsonStructureEntry {
    path: String,
    status: StructureStatus,
}

fn build_structure_report(result: &StructureResult, diff_only: bool) -> JsonStructureReport<'_> {
    JsonStructureReport {
        run_id: result.run_id.to_string(),
        left: result.left_root.to_string_lossy().to_string(),
        right: result.right_root.to_string_lossy().to_string(),
        outcome: result.outcome(),
        partial: result.partial,
        summary: result.summary,
        entries: result
            .entries
            .iter()
            .filter(|e| !(diff_only && e.status == StructureStatus::Common))
            .map(|e| JsonStructureEntry {
                path: e.relative_path.to_string_lossy().replace('\\', "/"),
                status: e.status,
            })
            .collect(),
        left_errors: &result.left_errors,
        right_errors: &result.right_errors,
    }
}
