// braid/src/commands/autopilot.rs
//
// USE CASE: Run the autopilot ladder up to the requested level.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use braid_core::application::{Autopilot, AutopilotConfig};
use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::git::GitCli;
use braid_core::ports::forge::Forge;
use braid_core::ports::vcs::Vcs;
use braid_core::BraidError;

use super::{build_forge, resolve_plan, resolve_profile};

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    project_dir: &Path,
    level: u8,
    live: bool,
    open_pr: bool,
    close_superseded: bool,
    comment_template: Option<String>,
    env: &Env,
) -> Result<i32, BraidError> {
    // Contradictory combinations are rejected before anything runs
    let config = AutopilotConfig {
        max_level: level,
        dry_run: !live,
        open_pr,
        close_superseded,
        comment_template,
    };
    config.validate()?;

    let profile = resolve_profile(project_dir, env)?;
    let plan = resolve_plan(&profile, env, None).await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Interrupt received, cancelling...");
            interrupt.cancel();
        }
    });

    let git = GitCli::new(project_dir);
    let forge = build_forge(&profile, env);

    let autopilot = Autopilot {
        config,
        env,
        profile: &profile,
        vcs: Some(&git as &dyn Vcs),
        forge: forge.as_ref().map(|f| f as &dyn Forge),
        auth: None,
        cancel,
    };

    let report = autopilot.run(&plan).await?;

    if !report.intents.is_empty() {
        println!("\n📝 Recorded intents (dry-run / mutations disabled):");
        for intent in &report.intents {
            println!("   - {intent}");
        }
    }
    for message in &report.messages {
        println!("   ℹ️  {message}");
    }
    if let Some(dir) = &report.artifacts_dir {
        println!("📦 Deliverables: {}", dir.display());
    }

    let weave_failed = report.weave.as_ref().map(|w| !w.success).unwrap_or(false);
    let gates_failed = report.gates.as_ref().map(|g| !g.all_passed).unwrap_or(false);
    if weave_failed || gates_failed {
        eprintln!("❌ Autopilot halted at L{}.", report.level_executed);
        Ok(1)
    } else {
        println!("✨ Autopilot completed L{}.", report.level_executed);
        Ok(0)
    }
}
