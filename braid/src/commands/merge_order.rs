// braid/src/commands/merge_order.rs
//
// USE CASE: Show the dependency-ordered merge levels.

use std::path::{Path, PathBuf};

use comfy_table::Table;

use braid_core::application::report::merge_order_value;
use braid_core::domain::graph::GraphSolver;
use braid_core::infrastructure::env::Env;
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
    let levels = GraphSolver::plan_levels(&plan)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&merge_order_value(&plan.target, &levels))
                .unwrap_or_default()
        );
        return Ok(0);
    }

    let mut table = Table::new();
    table.set_header(vec!["Level", "Items", "Strategies"]);
    for (index, level) in levels.iter().enumerate() {
        let strategies: Vec<String> = level
            .iter()
            .filter_map(|name| plan.item(name))
            .map(|item| item.strategy().to_string())
            .collect();
        table.add_row(vec![
            (index + 1).to_string(),
            level.join(", "),
            strategies.join(", "),
        ]);
    }
    println!("{table}");
    println!("🎯 Target: {}", plan.target);
    Ok(0)
}
