use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use convert::{
    build_jobs,
    config::ConvertConfig,
    ffprobe::FFProbe,
    hierarchy::{path_list_to_string, Hierarchy},
    media::MediaCategory,
    runner::{failure_banner, JobRunner},
    scan_media, JobStatus,
};
use log::{error, info, warn};

/// Convert ripped DVD/Blu-Ray files with HandBrake, one at a time
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the HandBrake commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Only convert files from one media category
    #[arg(long, value_enum)]
    only: Option<CategoryArg>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    Movie,
    Show,
}

impl From<CategoryArg> for MediaCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Movie => MediaCategory::Movie,
            CategoryArg::Show => MediaCategory::Show,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = ConvertConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(only) = args.only {
        let keep = MediaCategory::from(only);
        cfg.category_folders.retain(|_, category| *category == keep);
    }

    info!("Routine convert starting");
    info!("Configuration loaded:");
    info!("  Media root: {}", cfg.root_dir.display());
    info!("  Disc folders: {:?}", cfg.disc_folders.keys().collect::<Vec<_>>());
    info!("  Category folders: {:?}", cfg.category_folders.keys().collect::<Vec<_>>());
    info!(
        "  Stages: {} -> {} (sources to {})",
        cfg.process_dirs.source, cfg.process_dirs.output, cfg.process_dirs.archive
    );
    info!("  HandBrake: {}", cfg.handbrake_bin.display());

    let scanned = scan_media(&cfg, &FFProbe::from_config(&cfg)).await;
    let mut had_errors = !scanned.failures.is_empty();

    for failure in &scanned.failures {
        eprintln!("{}", failure.banner());
    }

    if scanned.found_nothing() {
        println!("{}", no_files_message(&cfg));
        return Ok(exit_code(had_errors));
    }

    if scanned.records.is_empty() {
        error!(
            "None of the {} file(s) found could be probed; check ffprobe at {}",
            scanned.discovered,
            cfg.ffprobe_bin.display()
        );
        return Ok(exit_code(true));
    }

    let built = build_jobs(scanned.records, &cfg);
    for failure in &built.failures {
        eprintln!("{}", failure.banner());
        had_errors = true;
    }

    if args.dry_run {
        for job in &built.jobs {
            println!("{}", job.command.render());
        }
        return Ok(exit_code(had_errors));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; no further jobs will start");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let report = JobRunner::with_cancel_flag(cancel).run_all(built.jobs).await;

    for job in report.failures() {
        eprintln!("{}", failure_banner(job));
    }

    println!(
        "Converted {} file(s); {} failed, {} not archived, {} cancelled",
        report.count(JobStatus::Succeeded),
        report.count(JobStatus::Failed),
        report.count(JobStatus::ArchiveFailed),
        report.count(JobStatus::Cancelled)
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        info!("Run report written to {}", path.display());
    }

    had_errors |= !report.is_clean();
    Ok(exit_code(had_errors))
}

fn exit_code(had_errors: bool) -> ExitCode {
    if had_errors {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Operator hint printed when there is nothing to convert
fn no_files_message(cfg: &ConvertConfig) -> String {
    let hierarchy = Hierarchy::new(cfg);
    format!(
        "No media files found to convert.\n\
         >>> Place files you want TO CONVERT in:\n{}\
         >>> Your converted files will be put in:\n{}\
         >>> After converting, your original files will move to:\n{}",
        path_list_to_string(&hierarchy.source_paths()),
        path_list_to_string(&hierarchy.output_paths()),
        path_list_to_string(&hierarchy.archive_paths()),
    )
}
