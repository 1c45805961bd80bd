// braid/src/commands/plan.rs
//
// USE CASE: Synthesize, validate and persist the plan.

use std::path::{Path, PathBuf};

use braid_core::application::report::{analyze, snapshot_markdown};
use braid_core::domain::graph::GraphSolver;
use braid_core::domain::plan::canonical_json;
use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::fs::atomic_write;
use braid_core::BraidError;

use super::{resolve_plan, resolve_profile};

pub async fn execute(
    project_dir: &Path,
    out: Option<PathBuf>,
    json: bool,
    env: &Env,
) -> Result<i32, BraidError> {
    let profile = resolve_profile(project_dir, env)?;
    println!("⚙️  Profile: {} ({})", profile.name, profile.role);

    let plan = resolve_plan(&profile, env, None).await?;

    // Validation: cycles and unknown deps surface here with exit code 2
    let levels = GraphSolver::plan_levels(&plan)?;
    let analysis = analyze(&plan)?;

    let rendered = canonical_json(&plan)?;
    if json {
        print!("{rendered}");
    }

    // An explicit --out bypasses the profile; the default target is the
    // profile's runner directory, which must be writable.
    let out_dir = match out {
        Some(dir) => dir,
        None => {
            profile.ensure_writable()?;
            profile.runner_dir()
        }
    };
    std::fs::create_dir_all(&out_dir)?;

    atomic_write(out_dir.join("plan.json"), &rendered)?;
    let snapshot = snapshot_markdown(&plan, &analysis, &env.timestamp_iso());
    atomic_write(out_dir.join("snapshot.md"), snapshot)?;

    println!(
        "📝 Plan: {} item(s) in {} level(s), hash {}",
        analysis.item_count,
        levels.len(),
        &analysis.plan_hash[..12]
    );
    println!("✨ Written to {}", out_dir.display());
    Ok(0)
}
