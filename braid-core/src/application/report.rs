// braid-core/src/application/report.rs
//
// Deterministic rendering of analysis, snapshot and report artifacts.
// Everything here is a pure function of its inputs; timestamps come from
// the caller so deterministic-time runs stay byte-identical.

use serde::Serialize;
use serde_json::{json, Value};

use crate::application::gates::ExecutionReport;
use crate::application::weave::WeaveOutcome;
use crate::domain::graph::GraphSolver;
use crate::domain::plan::{plan_hash, Plan};
use crate::domain::report::GateStatus;
use crate::error::BraidError;

/// The L0 product: levels, counts, recommendations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub target: String,
    pub plan_hash: String,
    pub item_count: usize,
    pub level_count: usize,
    pub levels: Vec<Vec<String>>,
    pub gate_count: usize,
    pub recommendations: Vec<String>,
}

pub fn analyze(plan: &Plan) -> Result<Analysis, BraidError> {
    let levels = GraphSolver::plan_levels(plan)?;
    let gate_count = plan.items.iter().map(|i| i.gates.len()).sum();
    let mut recommendations = Vec::new();

    if plan.items.is_empty() {
        recommendations.push(
            "no items in scope; declare a stack.yml or widen scope.yml queries".to_string(),
        );
    }

    let gateless = plan.items.iter().filter(|i| i.gates.is_empty()).count();
    if gateless > 0 {
        recommendations.push(format!(
            "{gateless} item(s) have no gates and will pass trivially; consider a gates.yml"
        ));
    }

    let widest = levels.iter().map(Vec::len).max().unwrap_or(0);
    let workers = plan.effective_policy().max_workers;
    if widest > workers {
        recommendations.push(format!(
            "widest level has {widest} independent items but maxWorkers={workers}; raising it would shorten the run"
        ));
    }

    Ok(Analysis {
        target: plan.target.clone(),
        plan_hash: plan_hash(plan)?,
        item_count: plan.items.len(),
        level_count: levels.len(),
        levels,
        gate_count,
        recommendations,
    })
}

/// Human-readable companion to plan.json.
pub fn snapshot_markdown(plan: &Plan, analysis: &Analysis, generated_at: &str) -> String {
    let mut out = String::new();
    out.push_str("# Plan snapshot\n\n");
    out.push_str(&format!("- Target: `{}`\n", plan.target));
    out.push_str(&format!("- Plan hash: `{}`\n", analysis.plan_hash));
    out.push_str(&format!("- Items: {}\n", analysis.item_count));
    out.push_str(&format!("- Levels: {}\n", analysis.level_count));
    out.push_str(&format!("- Generated: {generated_at}\n\n"));

    out.push_str("## Merge order\n\n");
    for (index, level) in analysis.levels.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", index + 1, level.join(", ")));
    }

    out.push_str("\n## Items\n\n");
    for item in &plan.items {
        out.push_str(&format!("### {}\n\n", item.name));
        out.push_str(&format!("- Strategy: {}\n", item.strategy()));
        if let Some(branch) = &item.branch {
            out.push_str(&format!("- Branch: `{branch}`\n"));
        }
        if let Some(sha) = &item.sha {
            out.push_str(&format!("- Pinned: `{sha}`\n"));
        }
        if !item.deps.is_empty() {
            out.push_str(&format!("- Depends on: {}\n", item.deps.join(", ")));
        }
        if !item.gates.is_empty() {
            let names: Vec<&str> = item.gates.iter().map(|g| g.name.as_str()).collect();
            out.push_str(&format!("- Gates: {}\n", names.join(", ")));
        }
        out.push('\n');
    }

    if !analysis.recommendations.is_empty() {
        out.push_str("## Recommendations\n\n");
        for recommendation in &analysis.recommendations {
            out.push_str(&format!("- {recommendation}\n"));
        }
    }
    out
}

/// The weave-report.md deliverable.
pub fn weave_report_markdown(analysis: &Analysis, outcome: Option<&WeaveOutcome>) -> String {
    let mut out = String::new();
    out.push_str("# Weave report\n\n");
    out.push_str(&format!(
        "Integrating {} item(s) into `{}` across {} level(s).\n\n",
        analysis.item_count, analysis.target, analysis.level_count
    ));

    match outcome {
        None => out.push_str("No weave was executed at this autopilot level.\n"),
        Some(outcome) => {
            out.push_str(&format!("- Integration branch: `{}`\n", outcome.branch));
            out.push_str(&format!(
                "- Result: {}\n\n",
                if outcome.success { "success" } else { "halted" }
            ));
            for op in &outcome.operations {
                let marker = if op.success { "ok" } else { "FAILED" };
                out.push_str(&format!(
                    "- {} [{}] {}: {}\n",
                    marker, op.strategy, op.item, op.message
                ));
                for conflict in &op.conflicts {
                    out.push_str(&format!("  - conflict: `{conflict}`\n"));
                }
            }
        }
    }
    out
}

/// The gate-predictions.json deliverable: which gates will run per item
/// and whether the policy counts them as required.
pub fn gate_predictions(plan: &Plan) -> Value {
    let policy = plan.effective_policy();
    let items: Vec<Value> = plan
        .items
        .iter()
        .map(|item| {
            let gates: Vec<Value> = item
                .gates
                .iter()
                .map(|gate| {
                    json!({
                        "name": gate.name,
                        "required": policy.is_required(&gate.name),
                        "skipped": policy.is_skipped(&gate.name),
                        "timeoutSec": gate.timeout_sec,
                        "retries": policy.retries_for(gate),
                    })
                })
                .collect();
            json!({ "item": item.name, "gates": gates })
        })
        .collect();
    json!({ "items": items })
}

/// The execution-log.md deliverable.
pub fn execution_log_markdown(
    report: Option<&ExecutionReport>,
    messages: &[String],
) -> String {
    let mut out = String::new();
    out.push_str("# Execution log\n\n");

    for message in messages {
        out.push_str(&format!("- {message}\n"));
    }
    if !messages.is_empty() {
        out.push('\n');
    }

    match report {
        None => out.push_str("No gates were executed at this autopilot level.\n"),
        Some(report) => {
            for result in &report.results {
                let marker = match result.status {
                    GateStatus::Pass => "✅",
                    GateStatus::Fail => "❌",
                    GateStatus::Skip => "⏭️",
                };
                out.push_str(&format!(
                    "- {marker} {}/{} ({} ms)",
                    result.item, result.gate, result.duration_ms
                ));
                if let Some(reason) = result.meta_reason() {
                    out.push_str(&format!(" — {reason}"));
                }
                out.push('\n');
            }
            out.push('\n');
            for (item, status) in &report.statuses {
                out.push_str(&format!("- {item}: {status:?}\n"));
            }
        }
    }
    out
}

/// merge-order JSON shared by the CLI and the deliverables.
pub fn merge_order_value(target: &str, levels: &[Vec<String>]) -> Value {
    json!({ "target": target, "levels": levels })
}
