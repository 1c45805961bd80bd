// braid/src/commands/execute.rs
//
// USE CASE: Run every gate, level by level, and persist the results.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use braid_core::application::GateEngine;
use braid_core::domain::report::GateStatus;
use braid_core::infrastructure::env::Env;
use braid_core::BraidError;

use super::{resolve_plan, resolve_profile};

pub async fn execute(
    project_dir: &Path,
    plan_path: Option<PathBuf>,
    env: &Env,
) -> Result<i32, BraidError> {
    let profile = resolve_profile(project_dir, env)?;
    profile.ensure_writable()?;
    let plan = resolve_plan(&profile, env, plan_path).await?;

    if plan.items.is_empty() {
        println!("📭 Nothing to execute: the plan has no items.");
        return Ok(0);
    }

    println!("🚦 Executing gates for {} item(s)...", plan.items.len());

    // An interrupt marks in-flight gates failed and pending items blocked;
    // results written so far stay on disk.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Interrupt received, cancelling...");
            interrupt.cancel();
        }
    });

    let engine = GateEngine::new(env, &profile, cancel);
    let report = engine.execute(&plan).await?;

    let (passes, failures, skips) =
        report
            .results
            .iter()
            .fold((0, 0, 0), |(p, f, s), r| match r.status {
                GateStatus::Pass => (p + 1, f, s),
                GateStatus::Fail => (p, f + 1, s),
                GateStatus::Skip => (p, f, s + 1),
            });
    println!("\n📊 Gates: {passes} passed, {failures} failed, {skips} skipped");
    for (bucket, items) in &report.buckets {
        println!("   {bucket:?}: {}", items.join(", "));
    }

    if report.all_passed {
        println!("✨ SUCCESS! All items passed their required gates.");
        Ok(0)
    } else {
        eprintln!("❌ FAILURE. Individual results are persisted under the profile.");
        Ok(1)
    }
}
