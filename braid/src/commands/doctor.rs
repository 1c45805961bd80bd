// braid/src/commands/doctor.rs
//
// USE CASE: Check the environment, profile and configuration. Any warning
// exits 1; broken configuration surfaces as a validation error (exit 2).

use std::path::Path;

use braid_core::domain::graph::GraphSolver;
use braid_core::infrastructure::config::deps::{load_deps, DEPS_FILE};
use braid_core::infrastructure::config::gates::{load_gates, GATES_FILE};
use braid_core::infrastructure::config::scope::{load_scope, SCOPE_FILE};
use braid_core::infrastructure::config::stack::{load_stack, STACK_FILE};
use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::git::GitCli;
use braid_core::BraidError;

use super::{resolve_plan, resolve_profile};

pub async fn execute(project_dir: &Path, env: &Env) -> Result<i32, BraidError> {
    let mut warnings: Vec<String> = Vec::new();
    println!("🩺 braid doctor\n");

    // Git availability
    if GitCli::available().await {
        println!("   ✅ git binary found");
    } else {
        warnings.push("git binary not found on PATH".to_string());
    }

    // Profile resolution
    let profile = resolve_profile(project_dir, env)?;
    println!(
        "   ✅ profile '{}' at {} (role {})",
        profile.name,
        profile.dir.display(),
        profile.role
    );
    if !profile.can_write() {
        warnings.push(format!(
            "profile role '{}' is read-only; `braid bootstrap` can seed a writable one",
            profile.role
        ));
    }

    // Config files parse (each carries its path on failure)
    let mut scope_declares_sources = false;
    for file in [STACK_FILE, SCOPE_FILE, DEPS_FILE, GATES_FILE] {
        let path = profile.config_path(file);
        if !path.is_file() {
            continue;
        }
        let parsed: Result<(), BraidError> = match file {
            STACK_FILE => load_stack(&path).map(|_| ()),
            SCOPE_FILE => load_scope(&path).map(|scope| {
                scope_declares_sources = !scope.sources.is_empty();
            }),
            DEPS_FILE => load_deps(&path).and_then(|d| d.edges().map(|_| ())),
            _ => load_gates(&path).map(|_| ()),
        };
        match parsed {
            Ok(()) => println!("   ✅ {file} parses"),
            Err(e) => return Err(e),
        }
    }

    if scope_declares_sources && env.github_token.is_none() {
        warnings.push("scope.yml declares forge queries but GITHUB_TOKEN is not set".to_string());
    }

    // Plan synthesis and levelization (cycles/unknown deps exit 2 here)
    let plan = resolve_plan(&profile, env, None).await?;
    let levels = GraphSolver::plan_levels(&plan)?;
    println!(
        "   ✅ plan: {} item(s) in {} level(s) towards '{}'",
        plan.items.len(),
        levels.len(),
        plan.target
    );

    if !env.allow_mutations {
        println!("   ℹ️  mutations disabled (ALLOW_MUTATIONS is not \"true\")");
    }

    if warnings.is_empty() {
        println!("\n✨ No warnings.");
        Ok(0)
    } else {
        println!();
        for warning in &warnings {
            println!("   ⚠️  {warning}");
        }
        eprintln!("\n❌ {} warning(s).", warnings.len());
        Ok(1)
    }
}
