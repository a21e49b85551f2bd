/// `planstore run` command implementation
///
/// Reuses the stored plan when its fingerprint still matches, otherwise
/// configures the build from the plan manifest, then executes the work items.
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

use super::Workspace;
use crate::cli::RunArgs;
use crate::cli_utils::planstore_prefix;
use crate::controller::{BuildOutcome, CacheController, CacheOutcome, Probe};
use crate::execution::WorkerPool;
use crate::manifest::PlanManifest;
use crate::problems::ProblemsReport;
use crate::start_parameter::StartParameter;

/// Where the machine-readable problems report lands, relative to the project
pub const REPORT_PATH: &str = "build/reports/configuration-cache/problems.json";

pub fn run(args: &RunArgs, workspace: &Workspace) -> Result<()> {
    let start_parameter = start_parameter(args, workspace)?;
    let manifest = PlanManifest::new(&workspace.project_dir, args.manifest.clone());

    if args.verbose {
        eprintln!(
            "{} Plan manifest: {}",
            planstore_prefix(),
            manifest.path().display()
        );
    }

    let controller = match workspace.store() {
        Ok(store) => CacheController::new(start_parameter, store, &workspace.project_dir),
        Err(e) => {
            warn!("Continuing without a plan store: {:#}", e);
            CacheController::without_store(
                start_parameter,
                format!("{:#}", e),
                &workspace.project_dir,
            )
        }
    };
    let mut controller = controller.with_refresh(args.refresh);

    if args.dry_run {
        print_probe(&controller.probe(&manifest), args.verbose);
        return Ok(());
    }

    let workers = match args.workers {
        Some(0) => num_cpus::get(),
        Some(n) => n as usize,
        None => workspace.config.workers(),
    };
    let pool = WorkerPool::with_process_runner(&workspace.project_dir)
        .with_workers(workers)
        .with_excluded(controller.start_parameter().excluded.clone());

    if args.verbose {
        eprintln!(
            "{} Cache key: {} ({} workers)",
            planstore_prefix(),
            controller.key(),
            pool.workers()
        );
    }

    let start = Instant::now();
    let outcome = controller.run(&manifest, &pool)?;
    let duration = start.elapsed();

    if !outcome.report.is_empty() {
        eprint!("{}", outcome.report.render());
        let report_path = write_report(&workspace.project_dir, &outcome.report)?;
        eprintln!(
            "{} See the complete report at {}",
            planstore_prefix(),
            report_path.display()
        );
    }

    print_outcome(&outcome, args.verbose);
    eprintln!(
        "Cache key: {} | {} | {:.2}s",
        outcome.key,
        outcome_label(&outcome.cache),
        duration.as_secs_f64()
    );

    if !outcome.success() {
        std::process::exit(1);
    }

    Ok(())
}

fn start_parameter(args: &RunArgs, workspace: &Workspace) -> Result<StartParameter> {
    let enabled = workspace.config.configuration_cache.enabled && !args.no_configuration_cache;
    let tolerance = match args.problems {
        Some(tolerance) => tolerance,
        None => workspace.config.tolerance()?,
    };

    Ok(StartParameter::new(enabled, tolerance)
        .with_requested(args.items.iter().map(String::as_str))
        .with_excluded(args.exclude.iter().map(String::as_str)))
}

fn outcome_label(cache: &CacheOutcome) -> &'static str {
    match cache {
        CacheOutcome::Hit => "HIT ✓",
        CacheOutcome::Miss(_) => "MISS ✗",
    }
}

fn print_probe(probe: &Probe, verbose: bool) {
    match &probe.outcome {
        CacheOutcome::Hit => eprintln!("Cache key: {} | HIT ✓", probe.key),
        CacheOutcome::Miss(reason) => {
            eprintln!("Cache key: {} | MISS ✗ ({})", probe.key, reason)
        }
    }

    if verbose {
        if let Some(fingerprint) = &probe.fingerprint {
            eprintln!("{} Fingerprint: {}", planstore_prefix(), fingerprint);
        }
        if let Some(stored) = &probe.stored_fingerprint {
            eprintln!("{} Stored fingerprint: {}", planstore_prefix(), stored);
        }
    }
}

fn print_outcome(outcome: &BuildOutcome, verbose: bool) {
    if let CacheOutcome::Miss(reason) = &outcome.cache {
        eprintln!(
            "{} Configuration cache miss: {}",
            planstore_prefix(),
            reason
        );
    } else {
        eprintln!("{} Reusing configuration cache.", planstore_prefix());
    }

    if let (true, Some(handle)) = (verbose, &outcome.stored) {
        eprintln!(
            "{} Stored plan {} ({} bytes)",
            planstore_prefix(),
            handle.path.display(),
            handle.size_bytes
        );
    }

    match &outcome.execution {
        Ok(summary) => {
            if verbose {
                for path in &summary.completed {
                    eprintln!("{}   ✓ {}", planstore_prefix(), path);
                }
                for path in &summary.skipped {
                    eprintln!("{}   - {} (excluded)", planstore_prefix(), path);
                }
            }
            eprintln!(
                "{} {} work items executed, {} skipped",
                planstore_prefix(),
                summary.completed.len(),
                summary.skipped.len()
            );
        }
        Err(e) => eprintln!("{} Execution failed: {:#}", planstore_prefix(), e),
    }

    if outcome.report.failed {
        eprintln!(
            "{} Configuration cache problems found and problems mode is fail",
            planstore_prefix()
        );
    }
}

fn write_report(project_dir: &Path, report: &ProblemsReport) -> Result<PathBuf> {
    let path = project_dir.join(REPORT_PATH);
    report.write_json(&path)?;
    Ok(path)
}
