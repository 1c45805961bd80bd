// braid-core/src/application/gates.rs
//
// Concurrent, policy-driven execution of external checks. Levels are a
// strict barrier; within a level, items fan out bounded by
// `policy.maxWorkers`; within an item, gates run sequentially so later
// gates can consume earlier gates' artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::graph::GraphSolver;
use crate::domain::plan::{Gate, GateRuntime, Plan, PlanItem, Policy};
use crate::domain::report::{ArtifactRef, GateResult, GateStatus};
use crate::domain::state::{Eligibility, ExecutionState, ItemStatus};
use crate::error::BraidError;
use crate::infrastructure::env::Env;
use crate::infrastructure::fs::atomic_write;
use crate::infrastructure::profile::Profile;

const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 8_000;

pub struct GateEngine<'a> {
    pub env: &'a Env,
    pub profile: &'a Profile,
    pub cancel: CancellationToken,
}

/// Aggregate outcome of one engine run.
#[derive(Debug)]
pub struct ExecutionReport {
    pub results: Vec<GateResult>,
    pub statuses: BTreeMap<String, ItemStatus>,
    pub buckets: BTreeMap<Eligibility, Vec<String>>,
    /// Index of the level that halted progression, if any.
    pub halted_at_level: Option<usize>,
    pub all_passed: bool,
}

impl<'a> GateEngine<'a> {
    pub fn new(env: &'a Env, profile: &'a Profile, cancel: CancellationToken) -> Self {
        Self { env, profile, cancel }
    }

    /// Runs every gate of every item, level by level. A single gate's
    /// failure never aborts the run: results are collected and the
    /// aggregate decides eligibility. Under `strict-required`, the first
    /// level with a non-passing item halts progression.
    #[instrument(skip_all, fields(target = %plan.target, items = plan.items.len()))]
    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport, BraidError> {
        let levels = GraphSolver::plan_levels(plan)?;
        let policy = plan.effective_policy();
        let mut state = ExecutionState::new(plan);
        let mut results: Vec<GateResult> = Vec::new();
        let mut halted_at_level = None;

        for (index, level) in levels.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            let runnable: Vec<&PlanItem> = level
                .iter()
                .filter(|name| state.status(name) == ItemStatus::Pending)
                .filter_map(|name| plan.item(name))
                .collect();
            if runnable.is_empty() {
                continue;
            }

            println!(
                "  🔹 Level {} ({} item{})...",
                index + 1,
                runnable.len(),
                if runnable.len() == 1 { "" } else { "s" }
            );
            for item in &runnable {
                state.transition(&item.name, ItemStatus::Running);
            }

            let workers = policy.max_workers.max(1);
            let mut stream = futures::stream::iter(
                runnable
                    .into_iter()
                    .map(|item| self.run_item(item, &policy)),
            )
            .buffer_unordered(workers);

            while let Some((name, item_results, passed)) = stream.next().await {
                let status = if passed { ItemStatus::Passed } else { ItemStatus::Failed };
                if passed {
                    println!("    ✅ {name}");
                } else {
                    eprintln!("    ❌ {name}");
                }
                results.extend(item_results);
                state.transition(&name, status);
            }

            state.block_dependents(plan);

            let level_ok = level
                .iter()
                .all(|name| state.status(name) == ItemStatus::Passed);
            if !level_ok {
                halted_at_level = Some(index);
                info!(level = index, "halting progression: level has non-eligible items");
                break;
            }
        }

        if self.cancel.is_cancelled() {
            // Pending items become blocked; in-flight gates already
            // reported fail(reason=cancelled) above.
            for item in &plan.items {
                if !state.status(&item.name).is_terminal() {
                    state.transition(&item.name, ItemStatus::Blocked);
                }
            }
        }

        let all_passed = state.all_passed();
        Ok(ExecutionReport {
            statuses: state.snapshot(),
            buckets: state.buckets(plan),
            results,
            halted_at_level,
            all_passed,
        })
    }

    /// Runs one item's gates in declaration order. Returns the item name,
    /// its results, and whether all required gates passed.
    async fn run_item(&self, item: &PlanItem, policy: &Policy) -> (String, Vec<GateResult>, bool) {
        let mut results = Vec::new();

        if item.gates.is_empty() {
            let result = GateResult::skipped(&item.name, "none", self.env.timestamp_iso());
            if let Err(e) = self.persist_result(&result) {
                warn!(item = %item.name, error = %e, "could not persist gate result");
            }
            results.push(result);
            return (item.name.clone(), results, true);
        }

        for gate in &item.gates {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = if policy.is_skipped(&gate.name) {
                let mut skipped =
                    GateResult::skipped(&item.name, &gate.name, self.env.timestamp_iso());
                skipped.meta = Some(json!({ "reason": "policy-override" }));
                skipped
            } else {
                self.run_gate_with_retries(item, gate, policy).await
            };

            if let Err(e) = self.persist_result(&result) {
                warn!(item = %item.name, gate = %gate.name, error = %e, "could not persist gate result");
            }
            results.push(result);
        }

        let passed = !results
            .iter()
            .any(|r| r.status == GateStatus::Fail && policy.is_required(&r.gate));
        (item.name.clone(), results, passed)
    }

    /// Re-runs a failing gate up to its retry budget with bounded
    /// exponential backoff; the final attempt's result wins.
    async fn run_gate_with_retries(
        &self,
        item: &PlanItem,
        gate: &Gate,
        policy: &Policy,
    ) -> GateResult {
        let budget = policy.retries_for(gate);
        let mut attempt = 0u32;
        loop {
            let result = self.run_gate_once(item, gate, attempt).await;
            if result.status == GateStatus::Pass
                || attempt >= budget
                || self.cancel.is_cancelled()
            {
                return result;
            }
            let backoff = (BACKOFF_BASE_MS << attempt.min(8)).min(BACKOFF_CAP_MS);
            debug!(item = %item.name, gate = %gate.name, attempt, backoff_ms = backoff, "gate failed, retrying");
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            attempt += 1;
        }
    }

    async fn run_gate_once(&self, item: &PlanItem, gate: &Gate, attempt: u32) -> GateResult {
        let started_at = self.env.timestamp_iso();
        let fail = |meta: serde_json::Value, duration: Duration| GateResult {
            item: item.name.clone(),
            gate: gate.name.clone(),
            status: GateStatus::Fail,
            duration_ms: duration.as_millis() as u64,
            started_at: started_at.clone(),
            stdout_path: None,
            stderr_path: None,
            meta: Some(meta),
            artifacts: Vec::new(),
        };

        if gate.runtime != GateRuntime::Local {
            // Non-local runtimes are metadata only; see DESIGN.md.
            return fail(
                json!({ "reason": "unsupported-runtime", "attempt": attempt }),
                Duration::ZERO,
            );
        }

        let dir = self.profile.gate_results_dir().join(&item.name);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            return fail(
                json!({ "reason": "io", "message": e.to_string(), "attempt": attempt }),
                Duration::ZERO,
            );
        }
        let stdout_path = dir.join(format!("{}.out", gate.name));
        let stderr_path = dir.join(format!("{}.err", gate.name));

        let spawned = (|| -> std::io::Result<Child> {
            let out = std::fs::File::create(&stdout_path)?;
            let err = std::fs::File::create(&stderr_path)?;
            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(&gate.run)
                .stdin(Stdio::null())
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err))
                .envs(&gate.env)
                .kill_on_drop(true);
            if let Some(cwd) = &gate.cwd {
                cmd.current_dir(cwd);
            }
            cmd.spawn()
        })();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return fail(
                    json!({ "reason": "spawn", "message": e.to_string(), "attempt": attempt }),
                    Duration::ZERO,
                );
            }
        };

        let t0 = Instant::now();
        enum Outcome {
            Exited(std::process::ExitStatus),
            TimedOut,
            Cancelled,
            Lost(String),
        }

        let outcome = tokio::select! {
            exited = child.wait() => match exited {
                Ok(status) => Outcome::Exited(status),
                Err(e) => Outcome::Lost(e.to_string()),
            },
            _ = tokio::time::sleep(Duration::from_secs(gate.timeout_sec)) => Outcome::TimedOut,
            _ = self.cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) if status.success() => GateStatus::Pass,
            Outcome::Exited(status) => {
                return GateResult {
                    stdout_path: Some(stdout_path.display().to_string()),
                    stderr_path: Some(stderr_path.display().to_string()),
                    ..fail(
                        json!({ "reason": "exit", "exitCode": status.code(), "attempt": attempt }),
                        t0.elapsed(),
                    )
                };
            }
            Outcome::TimedOut => {
                terminate(&mut child).await;
                return GateResult {
                    stdout_path: Some(stdout_path.display().to_string()),
                    stderr_path: Some(stderr_path.display().to_string()),
                    ..fail(json!({ "reason": "timeout", "attempt": attempt }), t0.elapsed())
                };
            }
            Outcome::Cancelled => {
                terminate(&mut child).await;
                return GateResult {
                    stdout_path: Some(stdout_path.display().to_string()),
                    stderr_path: Some(stderr_path.display().to_string()),
                    ..fail(json!({ "reason": "cancelled", "attempt": attempt }), t0.elapsed())
                };
            }
            Outcome::Lost(message) => {
                return fail(
                    json!({ "reason": "wait", "message": message, "attempt": attempt }),
                    t0.elapsed(),
                );
            }
        };

        GateResult {
            item: item.name.clone(),
            gate: gate.name.clone(),
            status,
            duration_ms: t0.elapsed().as_millis() as u64,
            started_at,
            stdout_path: Some(stdout_path.display().to_string()),
            stderr_path: Some(stderr_path.display().to_string()),
            meta: (attempt > 0).then(|| json!({ "attempt": attempt })),
            artifacts: capture_artifacts(gate),
        }
    }

    fn persist_result(&self, result: &GateResult) -> Result<(), BraidError> {
        let dir = self.profile.gate_results_dir().join(&result.item);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.result.json", result.gate));
        let mut rendered = serde_json::to_string_pretty(result)
            .map_err(crate::infrastructure::error::InfrastructureError::Json)?;
        rendered.push('\n');
        atomic_write(path, rendered)?;
        Ok(())
    }
}

/// Escalating termination: SIGTERM, a short grace period, then SIGKILL.
/// On non-unix targets the polite half is skipped.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        send_sigterm(pid);
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

// Signal delivery has no safe wrapper in libc
#[cfg(unix)]
#[allow(unsafe_code)]
fn send_sigterm(pid: u32) {
    let _ = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
}

/// Expands the gate's artifact globs (relative to its cwd) and hashes
/// every match. Unreadable paths are skipped, not fatal.
fn capture_artifacts(gate: &Gate) -> Vec<ArtifactRef> {
    let base = gate.cwd.as_deref().unwrap_or(".");
    let mut captured = Vec::new();

    for pattern in &gate.artifacts {
        let full = Path::new(base).join(pattern);
        let Ok(matches) = glob::glob(&full.to_string_lossy()) else {
            warn!(pattern = %pattern, "invalid artifact glob");
            continue;
        };
        for path in matches.flatten() {
            if let Some(artifact) = hash_artifact(&path) {
                captured.push(artifact);
            }
        }
    }
    captured
}

fn hash_artifact(path: &PathBuf) -> Option<ArtifactRef> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(ArtifactRef {
        name: path.display().to_string(),
        hash: hex::encode(hasher.finalize()),
        size: bytes.len() as u64,
    })
}
