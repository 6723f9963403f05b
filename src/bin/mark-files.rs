//! # mark-files CLI
//!
//! Records file hashes and timestamps of a directory into a JSON snapshot,
//! and restores timestamps that drifted on files whose content is unchanged.
//!
//! ## Usage
//! ```bash
//! # Record the baseline
//! mark-files --path ./photos --output photos.json
//!
//! # Later: restore drifted timestamps and refresh the baseline
//! mark-files --path ./photos --output photos.json --restore
//! ```

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use mark_files::utils::format_timestamp;
use mark_files::{MarkError, MarkerBuilder, ProgressInfo, Result, RunReport};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// mark-files - restore timestamps of unchanged files
#[derive(Parser)]
#[command(name = "mark-files")]
#[command(version)]
#[command(about = "Snapshot file hashes and timestamps, and restore timestamps of unmodified files")]
#[command(long_about = None)]
struct Cli {
    /// Directory that needs to be analyzed
    #[arg(short, long)]
    path: PathBuf,

    /// JSON file storing the extracted properties
    #[arg(short, long)]
    output: PathBuf,

    /// Restore the timestamps of all unmodified files
    #[arg(short, long)]
    restore: bool,

    /// Wait for Enter before exiting
    #[arg(short = 'i', long)]
    pause: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Maximum number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Ignore patterns (gitignore syntax)
    #[arg(long)]
    ignore: Vec<String>,

    /// Follow symbolic links
    #[arg(long)]
    follow_symlinks: bool,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let pause = cli.pause;
    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            println!("{}", "[KO]".red().bold());
            eprintln!("{} {}", "error:".red().bold(), e.user_message());
            1
        }
    };

    if pause {
        wait_for_enter();
    }
    std::process::exit(code);
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    if !cli.path.is_dir() {
        return Err(MarkError::Enumeration {
            path: cli.path.clone(),
            reason: "the directory doesn't exist".to_string(),
        });
    }

    let mut builder = MarkerBuilder::new()
        .ignore_patterns(cli.ignore)
        .follow_symlinks(cli.follow_symlinks);
    if let Some(workers) = cli.workers {
        builder = builder.parallel_workers(workers);
    }
    let marker = builder.build(cli.path, cli.output)?;

    print!("{:<45}", "extract infos for all files:".bold());
    io::stdout().flush().ok();

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:30.green}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let on_progress = |info: ProgressInfo| {
        progress.set_length(info.total as u64);
        progress.set_position(info.processed as u64);
        progress.set_message(info.operation);
    };

    let result = marker.run(cli.restore, Some(on_progress));
    progress.finish_and_clear();
    let report = result?;

    println!("{}", "[OK]".green().bold());
    print_summary(&report);
    if let Some(restore) = &report.restore {
        print_restored_table(restore);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("  Files: {}", report.files_recorded.to_string().cyan());
    println!("  Snapshot: {}", report.snapshot_path.display().to_string().cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    if let Some(restore) = &report.restore {
        println!(
            "  Restored: {} files",
            restore.files_restored().to_string().yellow()
        );
    }

    let warnings = report.warnings();
    if !warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for warning in &warnings {
            println!("  - {}", warning.yellow());
        }
    }
}

/// Show old and restored times of every file touched by the restore
fn print_restored_table(restore: &mark_files::RestoreReport) {
    let restored: Vec<_> = restore
        .actions
        .iter()
        .zip(&restore.outcomes)
        .filter(|(_, outcome)| outcome.ctime_restored || outcome.mtime_restored)
        .collect();
    if restored.is_empty() {
        return;
    }

    let cell = |done: bool, value: u64| if done { format_timestamp(value) } else { String::new() };
    let width = restored
        .iter()
        .map(|(action, _)| action.id.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max(4);

    println!();
    println!(
        "{:<width$}  {:^19}  {:^19}  {:^19}  {:^19}",
        "FILE".bold(),
        "CTIME".bold(),
        "RESTORED CTIME".bold(),
        "MTIME".bold(),
        "RESTORED MTIME".bold(),
        width = width
    );
    for (action, outcome) in restored {
        println!(
            "{:<width$}  {:^19}  {:^19}  {:^19}  {:^19}",
            action.id.as_str(),
            cell(outcome.ctime_restored, action.current_ctime),
            cell(outcome.ctime_restored, action.restore_ctime.unwrap_or_default()),
            cell(outcome.mtime_restored, action.current_mtime),
            cell(outcome.mtime_restored, action.restore_mtime.unwrap_or_default()),
            width = width
        );
    }
}

fn wait_for_enter() {
    print!("\nPress Enter to exit...");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok();
}
