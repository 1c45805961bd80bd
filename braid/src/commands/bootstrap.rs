// braid/src/commands/bootstrap.rs
//
// USE CASE: Scaffold a writable profile. An existing read-only profile is
// never touched; the error names the role and points at the writable
// alternatives.

use std::path::Path;

use braid_core::infrastructure::env::Env;
use braid_core::infrastructure::fs::atomic_write;
use braid_core::infrastructure::profile::{
    write_manifest, Profile, ProfileManifest, LOCAL_DIR,
};
use braid_core::BraidError;

const SCOPE_SKELETON: &str = "version: 1\ntarget: main\n# repo: owner/repo\n# sources:\n#   - query: \"label:stack\"\n# pin_commits: false\n";

const GATES_SKELETON: &str = "# Ordered gate definitions keyed by item name. \"*\" applies to items\n# without an explicit entry.\n# \"*\":\n#   - name: lint\n#     run: make lint\n#     timeoutSec: 300\n{}\n";

pub fn execute(project_dir: &Path, env: &Env) -> Result<i32, BraidError> {
    let resolved = Profile::resolve(env, project_dir)?;

    // A manifest-less `.smartergpt.local` (or an explicit override target)
    // may be seeded with a fresh manifest; plain `.smartergpt` keeps its
    // example role and is never scaffolded into.
    let seedable = !resolved.dir.join("profile.yml").is_file()
        && (env.profile_dir.is_some()
            || resolved
                .dir
                .file_name()
                .map(|n| n == LOCAL_DIR)
                .unwrap_or(false));

    let target_dir = if resolved.dir.exists() && !seedable {
        // Existing profile: only a writable role may be scaffolded into
        resolved.ensure_writable()?;
        resolved.dir.clone()
    } else if resolved.dir.exists() {
        resolved.dir.clone()
    } else {
        // Nothing on disk yet: seed a local profile (or the explicit
        // override target) with a writable manifest first
        env.profile_dir
            .clone()
            .unwrap_or_else(|| project_dir.join(LOCAL_DIR))
    };

    std::fs::create_dir_all(&target_dir)?;
    let manifest_path = target_dir.join("profile.yml");
    if !manifest_path.is_file() {
        write_manifest(
            &target_dir,
            &ProfileManifest {
                role: "local".to_string(),
                name: "local".to_string(),
            },
        )?;
        println!("   🌱 profile.yml (role local)");
    }

    for (file, content) in [("scope.yml", SCOPE_SKELETON), ("gates.yml", GATES_SKELETON)] {
        let path = target_dir.join(file);
        if path.is_file() {
            println!("   ⏭️  {file} already exists, left untouched");
            continue;
        }
        atomic_write(&path, content)?;
        println!("   🌱 {file}");
    }

    println!("✨ Profile ready at {}", target_dir.display());
    Ok(0)
}
