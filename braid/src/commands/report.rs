// braid/src/commands/report.rs
//
// USE CASE: Aggregate persisted gate results into a summary.

use std::path::Path;

use serde_json::json;

use braid_core::domain::report::{load_gate_result, GateResult, GateStatus};
use braid_core::infrastructure::env::Env;
use braid_core::BraidError;

use super::resolve_profile;

pub fn execute(project_dir: &Path, json: bool, env: &Env) -> Result<i32, BraidError> {
    let profile = resolve_profile(project_dir, env)?;
    let results = collect_results(&profile.gate_results_dir());

    let (passes, failures, skips) = results
        .iter()
        .fold((0, 0, 0), |(p, f, s), r| match r.status {
            GateStatus::Pass => (p + 1, f, s),
            GateStatus::Fail => (p, f + 1, s),
            GateStatus::Skip => (p, f, s + 1),
        });

    if json {
        let value = json!({
            "total": results.len(),
            "passed": passes,
            "failed": failures,
            "skipped": skips,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return Ok(0);
    }

    println!("# Gate report\n");
    println!("- Total: {}", results.len());
    println!("- Passed: {passes}");
    println!("- Failed: {failures}");
    println!("- Skipped: {skips}");

    let failed: Vec<&GateResult> = results
        .iter()
        .filter(|r| r.status == GateStatus::Fail)
        .collect();
    if !failed.is_empty() {
        println!("\n## Failures\n");
        for result in failed {
            print!("- {}/{} ({} ms)", result.item, result.gate, result.duration_ms);
            if let Some(reason) = result.meta_reason() {
                print!(" — {reason}");
            }
            println!();
        }
    }
    Ok(0)
}

/// Reads every persisted result under the gate-results tree, accepting
/// legacy field spellings.
fn collect_results(root: &Path) -> Vec<GateResult> {
    let mut results = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(".result.json") {
            continue;
        }
        if let Ok(text) = std::fs::read_to_string(entry.path()) {
            if let Ok(result) = load_gate_result(&text) {
                results.push(result);
            }
        }
    }
    results.sort_by(|a, b| a.item.cmp(&b.item).then(a.gate.cmp(&b.gate)));
    results
}
