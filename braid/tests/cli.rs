use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Abstraction for managing a braid test project.
struct BraidTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl BraidTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        Ok(Self { _tmp: tmp, root })
    }

    /// A project with a writable `.smartergpt.local` profile.
    fn with_local_profile() -> Result<Self> {
        let env = Self::new()?;
        let profile = env.root.join(".smartergpt.local");
        std::fs::create_dir_all(&profile)?;
        std::fs::write(profile.join("profile.yml"), "role: local\nname: test\n")?;
        Ok(env)
    }

    fn profile_dir(&self) -> PathBuf {
        self.root.join(".smartergpt.local")
    }

    fn write_profile_file(&self, name: &str, content: &str) -> Result<()> {
        std::fs::write(self.profile_dir().join(name), content)?;
        Ok(())
    }

    fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn braid(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("braid"));
        cmd.current_dir(&self.root);
        // Isolate from the ambient environment
        for var in [
            "LEX_PR_PROFILE_DIR",
            "LEX_BRANCH_PREFIX",
            "ALLOW_MUTATIONS",
            "LEX_PR_DETERMINISTIC_TIME",
            "GITHUB_TOKEN",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }
}

fn plan_json(items: &[(&str, &[&str])]) -> String {
    let rendered: Vec<String> = items
        .iter()
        .map(|(name, deps)| {
            let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
            format!("{{\"name\": \"{name}\", \"deps\": [{}]}}", deps.join(", "))
        })
        .collect();
    format!(
        "{{\"schemaVersion\": \"1.0.0\", \"target\": \"main\", \"items\": [{}]}}",
        rendered.join(", ")
    )
}

// --- MERGE ORDER ---

#[test]
fn test_merge_order_linear_chain() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file(
        "plan.json",
        &plan_json(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]),
    )?;

    let output = env
        .braid()
        .args(["merge-order", "--json", "--plan"])
        .arg(&plan)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(
        value["levels"],
        serde_json::json!([["a"], ["b"], ["c"]])
    );
    Ok(())
}

#[test]
fn test_merge_order_diamond() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file(
        "plan.json",
        &plan_json(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]),
    )?;

    let output = env
        .braid()
        .args(["merge-order", "--json", "--plan"])
        .arg(&plan)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(
        value["levels"],
        serde_json::json!([["a"], ["b", "c"], ["d"]])
    );
    Ok(())
}

#[test]
fn test_cycle_exits_2_naming_both_items() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file("plan.json", &plan_json(&[("x", &["y"]), ("y", &["x"])]))?;

    env.braid()
        .args(["merge-order", "--plan"])
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("x").and(predicate::str::contains("y")));
    Ok(())
}

#[test]
fn test_unknown_dependency_exits_2_naming_item_and_dep() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file("plan.json", &plan_json(&[("p", &["q"])]))?;

    env.braid()
        .args(["merge-order", "--plan"])
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("p").and(predicate::str::contains("q")));
    Ok(())
}

// --- SCHEMA VALIDATE ---

#[test]
fn test_schema_validate_accepts_valid_plan() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file("plan.json", &plan_json(&[("a", &[])]))?;

    env.braid()
        .args(["schema", "validate"])
        .arg(&plan)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid plan"));
    Ok(())
}

#[test]
fn test_schema_validate_reports_every_issue() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file(
        "plan.json",
        r#"{"schemaVersion": "2.0.0", "target": "", "items": [
            {"name": "a", "deps": ["a"]}, {"name": "a"}
        ], "surprise": true}"#,
    )?;

    env.braid()
        .args(["schema", "validate"])
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(
            predicate::str::contains("unsupported-schema-version")
                .and(predicate::str::contains("self-dependency"))
                .and(predicate::str::contains("duplicate-name"))
                .and(predicate::str::contains("unknown-field")),
        );
    Ok(())
}

#[test]
fn test_schema_validate_invalid_json_is_distinct() -> Result<()> {
    let env = BraidTestEnv::new()?;
    let plan = env.write_file("plan.json", "{not json")?;

    env.braid()
        .args(["schema", "validate"])
        .arg(&plan)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid JSON"));
    Ok(())
}

// --- PLAN DETERMINISM ---

#[test]
fn test_plan_is_byte_identical_under_deterministic_time() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 2\n    branch: feat/b\n    needs: [1]\n  - id: 1\n    branch: feat/a\n",
    )?;

    for out in ["out1", "out2"] {
        env.braid()
            .args(["plan", "--out", out])
            .env("LEX_PR_DETERMINISTIC_TIME", "2026-08-01T12:00:00Z")
            .assert()
            .success();
    }

    let plan1 = std::fs::read(env.root.join("out1/plan.json"))?;
    let plan2 = std::fs::read(env.root.join("out2/plan.json"))?;
    assert_eq!(plan1, plan2);
    assert!(plan1.ends_with(b"\n"));

    let snap1 = std::fs::read(env.root.join("out1/snapshot.md"))?;
    let snap2 = std::fs::read(env.root.join("out2/snapshot.md"))?;
    assert_eq!(snap1, snap2);
    Ok(())
}

#[test]
fn test_plan_output_is_canonical() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: feat/a\n",
    )?;

    env.braid().arg("plan").assert().success();

    let text = std::fs::read_to_string(env.profile_dir().join("runner/plan.json"))?;
    // Two-space indentation, sorted keys at the top level, trailing newline
    assert!(text.starts_with("{\n  \"items\""));
    assert!(text.ends_with("}\n"));

    // The canonical bytes round-trip through the schema validator
    let reparsed = env.profile_dir().join("runner/plan.json");
    env.braid()
        .args(["schema", "validate"])
        .arg(&reparsed)
        .assert()
        .success();
    Ok(())
}

// --- BOOTSTRAP & WRITE PROTECTION ---

#[test]
fn test_bootstrap_refuses_example_profile() -> Result<()> {
    let env = BraidTestEnv::new()?;
    // `.smartergpt/` present without a manifest resolves to role "example"
    std::fs::create_dir_all(env.root.join(".smartergpt"))?;

    env.braid()
        .arg("bootstrap")
        .assert()
        .code(2)
        .stderr(
            predicate::str::contains("example")
                .and(predicate::str::contains("read-only"))
                .and(predicate::str::contains(".smartergpt.local")),
        );

    // No mutation happened inside the read-only profile
    assert_eq!(std::fs::read_dir(env.root.join(".smartergpt"))?.count(), 0);
    Ok(())
}

#[test]
fn test_bootstrap_seeds_local_profile_when_nothing_exists() -> Result<()> {
    let env = BraidTestEnv::new()?;

    env.braid().arg("bootstrap").assert().success();

    let profile = env.profile_dir();
    assert!(profile.join("profile.yml").exists());
    assert!(profile.join("scope.yml").exists());
    assert!(profile.join("gates.yml").exists());

    // The seeded profile is writable: plan works against it
    env.braid().arg("plan").assert().success();
    assert!(profile.join("runner/plan.json").exists());
    Ok(())
}

#[test]
fn test_plan_refuses_default_write_into_example_profile() -> Result<()> {
    let env = BraidTestEnv::new()?;
    std::fs::create_dir_all(env.root.join(".smartergpt"))?;

    env.braid().arg("plan").assert().code(2);
    Ok(())
}

// --- EXECUTE ---

#[test]
fn test_execute_passing_gates_exits_0() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: feat/a\n  - id: 2\n    branch: feat/b\n    needs: [1]\n",
    )?;
    env.write_profile_file(
        "gates.yml",
        "\"*\":\n  - name: noop\n    run: \"true\"\n",
    )?;

    env.braid()
        .arg("execute")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 passed"));

    // Results persisted under <profile>/runner/gate-results/<item>/<gate>
    assert!(env
        .profile_dir()
        .join("runner/gate-results/PR-1/noop.result.json")
        .exists());
    assert!(env
        .profile_dir()
        .join("runner/gate-results/PR-1/noop.out")
        .exists());
    Ok(())
}

#[test]
fn test_execute_failing_gate_exits_1_and_blocks_dependents() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: feat/a\n  - id: 2\n    branch: feat/b\n    needs: [1]\n",
    )?;
    env.write_profile_file(
        "gates.yml",
        "PR-1:\n  - name: boom\n    run: \"false\"\n\"*\":\n  - name: noop\n    run: \"true\"\n",
    )?;

    env.braid()
        .arg("execute")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Blocked: PR-2"));

    // The failed result is persisted and status reflects it
    env.braid()
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"status\": \"failed\"")
                .and(predicate::str::contains("\"status\": \"blocked\"")),
        );
    Ok(())
}

// --- AUTOPILOT ---

#[test]
fn test_autopilot_l1_writes_manifested_deliverables() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: feat/a\n",
    )?;

    env.braid()
        .args(["autopilot", "--level", "1"])
        .env("LEX_PR_DETERMINISTIC_TIME", "2026-08-01T12:00:00Z")
        .assert()
        .success();

    let run_dir = env
        .profile_dir()
        .join("deliverables/weave-20260801T120000Z");
    for artifact in [
        "analysis.json",
        "gate-predictions.json",
        "metadata.json",
        "weave-report.md",
        "execution-log.md",
        "manifest.json",
    ] {
        assert!(run_dir.join(artifact).exists(), "{artifact} missing");
    }

    let latest = std::fs::read_to_string(env.profile_dir().join("deliverables/latest"))?;
    assert_eq!(latest.trim(), "weave-20260801T120000Z");

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("manifest.json"))?)?;
    assert_eq!(manifest["levelExecuted"], 1);
    assert_eq!(manifest["artifacts"].as_array().map(Vec::len), Some(5));
    Ok(())
}

#[test]
fn test_autopilot_rejects_contradictory_config() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;

    env.braid()
        .args(["autopilot", "--level", "2", "--open-pr"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("openPR"));

    env.braid()
        .args(["autopilot", "--level", "3", "--close-superseded"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("closeSuperseded"));
    Ok(())
}

#[test]
fn test_autopilot_l0_reports_without_side_effects() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: feat/a\n",
    )?;

    env.braid()
        .arg("autopilot")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 item(s)"));

    assert!(!env.profile_dir().join("deliverables").exists());
    Ok(())
}

// --- DOCTOR ---

#[test]
fn test_doctor_warns_on_read_only_profile() -> Result<()> {
    let env = BraidTestEnv::new()?;
    std::fs::create_dir_all(env.root.join(".smartergpt"))?;

    env.braid()
        .arg("doctor")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("read-only"));
    Ok(())
}

#[test]
fn test_doctor_clean_on_writable_profile() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;

    env.braid()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));
    Ok(())
}

#[test]
fn test_doctor_surfaces_cycle_as_validation_failure() -> Result<()> {
    let env = BraidTestEnv::with_local_profile()?;
    env.write_profile_file(
        "stack.yml",
        "version: 1\ntarget: main\nprs:\n  - id: 1\n    branch: a\n    needs: [2]\n  - id: 2\n    branch: b\n    needs: [1]\n",
    )?;

    env.braid().arg("doctor").assert().code(2);
    Ok(())
}
