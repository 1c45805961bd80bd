// braid/src/commands/status.rs
//
// USE CASE: Show per-item status and eligibility, reconstructed from the
// gate results persisted by earlier `execute`/`autopilot` runs.

use std::path::{Path, PathBuf};

use comfy_table::Table;
use serde_json::json;

use braid_core::domain::plan::Plan;
use braid_core::domain::report::{load_gate_result, GateResult, GateStatus};
use braid_core::domain::state::{ExecutionState, ItemStatus};
use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::profile::Profile;
use braid_core::BraidError;

use super::{resolve_plan, resolve_profile};

pub async fn execute(
    project_dir: &Path,
    plan_path: Option<PathBuf>,
    json: bool,
    env: &Env,
) -> Result<i32, BraidError> {
    let profile = resolve_profile(project_dir, env)?;
    let plan = resolve_plan(&profile, env, plan_path).await?;

    let (state, results) = reconstruct(&plan, &profile);

    if json {
        let items: Vec<serde_json::Value> = plan
            .items
            .iter()
            .map(|item| {
                json!({
                    "item": item.name,
                    "status": state.status(&item.name),
                    "eligibility": state.eligibility(&plan, &item.name),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "target": plan.target, "items": items }))
                .unwrap_or_default()
        );
        return Ok(0);
    }

    let mut table = Table::new();
    table.set_header(vec!["Item", "Status", "Eligibility", "Gates"]);
    for item in &plan.items {
        let gates: Vec<String> = results
            .iter()
            .filter(|r| r.item == item.name)
            .map(|r| format!("{} {}", r.gate, r.status))
            .collect();
        table.add_row(vec![
            item.name.clone(),
            format!("{:?}", state.status(&item.name)),
            format!("{:?}", state.eligibility(&plan, &item.name)),
            gates.join(", "),
        ]);
    }
    println!("{table}");
    Ok(0)
}

/// Rebuilds the execution state from persisted results. An item with a
/// required-gate failure is failed; one whose gates all reported is
/// passed; anything else stays pending. Blockage then propagates.
pub(crate) fn reconstruct(plan: &Plan, profile: &Profile) -> (ExecutionState, Vec<GateResult>) {
    let policy = plan.effective_policy();
    let mut state = ExecutionState::new(plan);
    let mut all_results = Vec::new();

    for item in &plan.items {
        let dir = profile.gate_results_dir().join(&item.name);
        let mut results: Vec<GateResult> = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.ends_with(".result.json") {
                    continue;
                }
                if let Ok(text) = std::fs::read_to_string(entry.path()) {
                    if let Ok(result) = load_gate_result(&text) {
                        results.push(result);
                    }
                }
            }
        }
        if results.is_empty() {
            continue;
        }

        let failed = results
            .iter()
            .any(|r| r.status == GateStatus::Fail && policy.is_required(&r.gate));
        let complete = item.gates.is_empty()
            || item
                .gates
                .iter()
                .all(|g| results.iter().any(|r| r.gate == g.name));

        state.transition(&item.name, ItemStatus::Running);
        if failed {
            state.transition(&item.name, ItemStatus::Failed);
        } else if complete {
            state.transition(&item.name, ItemStatus::Passed);
        }
        all_results.extend(results);
    }

    state.block_dependents(plan);
    (state, all_results)
}
