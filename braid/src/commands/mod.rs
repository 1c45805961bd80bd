// braid/src/commands/mod.rs

pub mod autopilot;
pub mod bootstrap;
pub mod doctor;
pub mod execute;
pub mod merge_order;
pub mod plan;
pub mod report;
pub mod schema;
pub mod status;

use std::path::{Path, PathBuf};

use braid_core::application::load_plan_inputs;
use braid_core::domain::plan::{load_plan, Plan};
use braid_core::infrastructure::config::scope::{load_scope, SCOPE_FILE};
use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::github::GithubClient;
use braid_core::infrastructure::profile::Profile;
use braid_core::ports::forge::Forge;
use braid_core::BraidError;

/// Builds a forge client when scope.yml names a repository.
pub(crate) fn build_forge(profile: &Profile, env: &Env) -> Option<GithubClient> {
    let path = profile.config_path(SCOPE_FILE);
    if !path.is_file() {
        return None;
    }
    let scope = load_scope(&path).ok()?;
    let repo = scope.repo?;
    GithubClient::new(env, &repo).ok()
}

/// Loads the plan either from an explicit plan.json or by synthesizing it
/// from the profile's declarative inputs.
pub(crate) async fn resolve_plan(
    profile: &Profile,
    env: &Env,
    plan_path: Option<PathBuf>,
) -> Result<Plan, BraidError> {
    match plan_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            load_plan(&text).map_err(Into::into)
        }
        None => {
            let forge = build_forge(profile, env);
            let loaded = load_plan_inputs(profile, forge.as_ref().map(|f| f as &dyn Forge)).await?;
            for warning in &loaded.warnings {
                eprintln!("   ⚠️  {warning}");
            }
            Ok(loaded.plan)
        }
    }
}

pub(crate) fn resolve_profile(project_dir: &Path, env: &Env) -> Result<Profile, BraidError> {
    Profile::resolve(env, project_dir)
}
