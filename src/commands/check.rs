//! The `check` subcommand: validate the plan without touching the host.
use std::collections::BTreeMap;

use anyhow::Result;

use crate::cli::{CheckOpts, GlobalOpts};
use crate::config::Plan;
use crate::logging;

/// Run the check command.
///
/// Loads, interpolates and validates the plan, then reports the step count
/// per kind and which steps the current tag selector would run. No host
/// state is resolved or mutated.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded or fails validation.
pub fn run(global: &GlobalOpts, _opts: &CheckOpts) -> Result<()> {
    logging::stage("Checking plan");
    let plan = Plan::load(&global.plan)?;
    plan.validate()?;

    let mut per_kind: BTreeMap<String, usize> = BTreeMap::new();
    for step in &plan.steps {
        *per_kind.entry(step.kind().to_string()).or_insert(0) += 1;
    }
    for (kind, count) in &per_kind {
        tracing::info!("{count} {kind} step(s)");
    }

    let selected = plan
        .steps
        .iter()
        .filter(|s| s.selected_by(&global.tags))
        .count();
    tracing::info!(
        "{} of {} steps selected ({})",
        selected,
        plan.steps.len(),
        if global.tags.is_empty() {
            "no tag filter".to_string()
        } else {
            format!("tags: {}", global.tags.join(", "))
        }
    );
    tracing::info!("plan OK: {}", global.plan.display());
    Ok(())
}
