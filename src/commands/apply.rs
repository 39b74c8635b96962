//! The `apply` subcommand: converge the host to the plan.
use anyhow::{Result, bail};

use crate::cli::{ApplyOpts, GlobalOpts};
use crate::config::Plan;
use crate::engine::{self, Run, RunContext, StepStatus};
use crate::lock::RunLock;
use crate::logging;

/// Run the apply command.
///
/// Loads and validates the plan, acquires the run lock (skipped for dry
/// runs, which never mutate), executes the selected steps, and prints the
/// run summary.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded or validated, the lock is
/// held by another run, or any non-best-effort step fails, so the process
/// exits non-zero exactly when the host did not converge.
pub fn run(global: &GlobalOpts, opts: &ApplyOpts) -> Result<()> {
    logging::stage("Loading plan");
    let plan = Plan::load(&global.plan)?;
    plan.validate()?;
    tracing::info!(
        "{} steps, {} vars ({})",
        plan.steps.len(),
        plan.vars.len(),
        global.plan.display()
    );

    // Dry runs only resolve state; mutating runs are serialized per host.
    let _lock = if global.dry_run {
        None
    } else {
        let lock_path = opts
            .lock_file
            .clone()
            .unwrap_or_else(RunLock::default_path);
        Some(RunLock::acquire(&lock_path)?)
    };

    let ctx = RunContext::system(global.dry_run);
    let run = engine::run(&plan, &global.tags, &ctx);

    print_summary(&run);

    if let Some(failure) = run.fatal_failure() {
        bail!(
            "step '{}' ({} {}) failed",
            failure.name,
            failure.kind,
            failure.identity
        );
    }
    Ok(())
}

/// Log the per-step outcome table and totals.
fn print_summary(run: &Run) {
    logging::stage("Summary");

    for result in &run.results {
        let (icon, color) = match result.status {
            StepStatus::Applied => ("✓", "\x1b[32m"),
            StepStatus::Unchanged => ("·", "\x1b[2m"),
            StepStatus::WouldChange => ("~", "\x1b[37m"),
            StepStatus::Failed if result.best_effort => ("○", "\x1b[33m"),
            StepStatus::Failed => ("✗", "\x1b[31m"),
        };
        let suffix = result
            .error
            .as_ref()
            .map_or_else(String::new, |e| format!(" ({e})"));
        tracing::info!("{color}{icon} {}{suffix}\x1b[0m", result.name);
    }

    tracing::info!(
        "{} steps: \x1b[32m{} applied\x1b[0m, \x1b[2m{} unchanged\x1b[0m, \x1b[37m{} would change\x1b[0m, \x1b[31m{} failed\x1b[0m",
        run.results.len(),
        run.count(StepStatus::Applied),
        run.count(StepStatus::Unchanged),
        run.count(StepStatus::WouldChange),
        run.count(StepStatus::Failed),
    );
}
