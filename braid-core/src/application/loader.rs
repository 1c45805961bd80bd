// braid-core/src/application/loader.rs
//
// Precedence-ordered plan synthesis: an explicit stack.yml wins, then a
// query-driven scope.yml (+ optional deps.yml overlay), then the default
// empty plan on `main`. Numeric PR ids exist only in the input files;
// every item leaves here named `PR-<n>`.

use std::collections::BTreeMap;

use tracing::{instrument, warn};

use crate::domain::plan::{GateOverrides, Plan, PlanItem, Policy};
use crate::domain::refs;
use crate::error::BraidError;
use crate::infrastructure::config::deps::{load_deps, DepsFile, DEPS_FILE};
use crate::infrastructure::config::gates::{load_gates, GatesFile, GATES_FILE};
use crate::infrastructure::config::scope::{load_scope, ScopeFile, SCOPE_FILE};
use crate::infrastructure::config::stack::{load_stack, STACK_FILE};
use crate::infrastructure::profile::Profile;
use crate::ports::forge::Forge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    Stack,
    Scope,
    Default,
}

#[derive(Debug)]
pub struct LoadedPlan {
    pub plan: Plan,
    pub source: PlanSource,
    pub warnings: Vec<String>,
}

/// Synthesizes the plan from whatever declarative inputs the profile
/// holds. First match wins.
#[instrument(skip(profile, forge))]
pub async fn load_plan_inputs(
    profile: &Profile,
    forge: Option<&dyn Forge>,
) -> Result<LoadedPlan, BraidError> {
    let gates = {
        let path = profile.config_path(GATES_FILE);
        if path.is_file() {
            load_gates(&path)?
        } else {
            GatesFile::default()
        }
    };

    let stack_path = profile.config_path(STACK_FILE);
    if stack_path.is_file() {
        let stack = load_stack(&stack_path)?;
        return Ok(from_stack(stack, &gates));
    }

    let scope_path = profile.config_path(SCOPE_FILE);
    if scope_path.is_file() {
        let scope = load_scope(&scope_path)?;
        let deps = {
            let path = profile.config_path(DEPS_FILE);
            if path.is_file() {
                Some(load_deps(&path)?)
            } else {
                None
            }
        };
        return from_scope(scope, deps, &gates, forge).await;
    }

    Ok(LoadedPlan {
        plan: Plan::new("main"),
        source: PlanSource::Default,
        warnings: Vec::new(),
    })
}

fn item_name(id: u64) -> String {
    format!("PR-{id}")
}

fn from_stack(stack: crate::infrastructure::config::stack::StackFile, gates: &GatesFile) -> LoadedPlan {
    let mut plan = Plan::new(stack.target);
    for pr in stack.prs {
        let name = item_name(pr.id);
        plan.items.push(PlanItem {
            deps: pr.needs.iter().map(|n| item_name(*n)).collect(),
            gates: gates.gates_for(&name),
            branch: Some(pr.branch),
            sha: pr.sha,
            strategy: pr.strategy,
            name,
        });
    }
    LoadedPlan {
        plan,
        source: PlanSource::Stack,
        warnings: Vec::new(),
    }
}

async fn from_scope(
    scope: ScopeFile,
    deps_overlay: Option<DepsFile>,
    gates: &GatesFile,
    forge: Option<&dyn Forge>,
) -> Result<LoadedPlan, BraidError> {
    let target = if scope.target.is_empty() {
        scope
            .defaults
            .as_ref()
            .and_then(|d| d.base.clone())
            .unwrap_or_else(|| "main".to_string())
    } else {
        scope.target.clone()
    };
    let mut warnings = Vec::new();

    let Some(forge) = forge else {
        warnings.push("forge client unavailable; produced an empty plan".to_string());
        return Ok(LoadedPlan {
            plan: Plan::new(target),
            source: PlanSource::Scope,
            warnings,
        });
    };

    // Collect query hits, deduplicated by PR number
    let mut pulls = BTreeMap::new();
    for source in &scope.sources {
        match forge.search_open_prs(&source.query).await {
            Ok(found) => {
                for pr in found {
                    pulls.entry(pr.number).or_insert(pr);
                }
            }
            Err(e) => {
                warn!(query = %source.query, error = %e, "forge query failed");
                warnings.push(format!(
                    "forge query '{}' failed ({e}); produced an empty plan",
                    source.query
                ));
                return Ok(LoadedPlan {
                    plan: Plan::new(target),
                    source: PlanSource::Scope,
                    warnings,
                });
            }
        }
    }

    let default_strategy = scope.defaults.as_ref().and_then(|d| d.strategy);
    let mut entries: Vec<(i64, u64, PlanItem)> = Vec::new();
    let mut forced_required: Vec<String> = Vec::new();

    for pr in pulls.values() {
        let front_matter = refs::parse_front_matter(&pr.body).unwrap_or_default();
        forced_required.extend(front_matter.required.iter().cloned());

        let mut labels = pr.labels.clone();
        labels.extend(front_matter.labels.iter().cloned());
        if let Some(selectors) = &scope.selectors {
            if !selectors.selects(&labels) {
                continue;
            }
        }

        let name = item_name(pr.number);
        let mut item_gates = gates.gates_for(&name);
        if !front_matter.skip.is_empty() {
            item_gates.retain(|g| !front_matter.skip.contains(&g.name));
        }

        let mut deps = Vec::new();
        for reference in refs::parse_dependency_refs(&pr.body) {
            if let Some(number) = reference.strip_prefix('#') {
                deps.push(format!("PR-{number}"));
            } else {
                // Cross-repo references cannot be items of this plan
                warnings.push(format!(
                    "{name}: ignoring cross-repo dependency '{reference}'"
                ));
            }
        }

        let item = PlanItem {
            deps,
            gates: item_gates,
            branch: Some(pr.branch.clone()),
            sha: scope.pin_commits.then(|| pr.sha.clone()),
            strategy: default_strategy,
            name,
        };
        entries.push((front_matter.priority.unwrap_or(0), pr.number, item));
    }

    // Higher priority first, then PR number: deterministic authored order
    entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut plan = Plan::new(target);
    plan.items = entries.into_iter().map(|(_, _, item)| item).collect();

    // Keep only dependencies that resolve inside the discovered set
    let known: Vec<String> = plan.names();
    for item in &mut plan.items {
        item.deps.retain(|d| {
            let in_scope = known.contains(d);
            if !in_scope {
                warnings.push(format!(
                    "{}: dependency '{d}' is not in the discovered set; dropped",
                    item.name
                ));
            }
            in_scope
        });
    }

    // Dependency overlay
    if let Some(overlay) = deps_overlay {
        for (child, parent) in overlay.edges()? {
            match plan.items.iter_mut().find(|i| i.name == child) {
                Some(item) => {
                    if known.contains(&parent) {
                        if !item.deps.contains(&parent) {
                            item.deps.push(parent);
                        }
                    } else {
                        warnings.push(format!(
                            "deps.yml: parent '{parent}' of '{child}' is not in the discovered set"
                        ));
                    }
                }
                None => warnings.push(format!(
                    "deps.yml: item '{child}' is not in the discovered set"
                )),
            }
        }
        for (name, strategy) in overlay.strategies {
            if let Some(item) = plan.items.iter_mut().find(|i| i.name == name) {
                item.strategy = Some(strategy);
            }
        }
    }

    for item in &mut plan.items {
        item.deps.sort();
        item.deps.dedup();
    }

    // Front-matter `required` entries force-require those gates plan-wide
    if !forced_required.is_empty() {
        forced_required.sort();
        forced_required.dedup();
        plan.policy = Some(Policy {
            overrides: Some(GateOverrides {
                skip: Vec::new(),
                required: forced_required,
            }),
            ..Policy::default()
        });
    }

    Ok(LoadedPlan {
        plan,
        source: PlanSource::Scope,
        warnings,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::plan::WeaveStrategy;
    use crate::ports::forge::PullRequest;
    use anyhow::Result;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct MockForge {
        pulls: Vec<PullRequest>,
        fail: bool,
    }

    #[async_trait]
    impl Forge for MockForge {
        async fn search_open_prs(&self, _query: &str) -> Result<Vec<PullRequest>, BraidError> {
            if self.fail {
                return Err(crate::infrastructure::error::InfrastructureError::Forge(
                    "boom".into(),
                )
                .into());
            }
            Ok(self.pulls.clone())
        }
        async fn comment(&self, _number: u64, _body: &str) -> Result<(), BraidError> {
            Ok(())
        }
        async fn open_pull_request(
            &self,
            _head: &str,
            _base: &str,
            _title: &str,
            _body: &str,
        ) -> Result<u64, BraidError> {
            Ok(0)
        }
        async fn close_pull_request(&self, _number: u64) -> Result<(), BraidError> {
            Ok(())
        }
        async fn merge_pull_request(&self, _number: u64) -> Result<(), BraidError> {
            Ok(())
        }
    }

    fn pr(number: u64, body: &str, labels: &[&str]) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            branch: format!("feat/{number}"),
            sha: format!("{number:040}"),
            body: body.to_string(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn profile_in(dir: &std::path::Path) -> Profile {
        Profile {
            role: "local".into(),
            name: "test".into(),
            dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_default_plan_when_nothing_present() -> Result<()> {
        let tmp = tempdir()?;
        let loaded = load_plan_inputs(&profile_in(tmp.path()), None).await?;
        assert_eq!(loaded.source, PlanSource::Default);
        assert_eq!(loaded.plan.target, "main");
        assert!(loaded.plan.items.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_stack_wins_over_scope() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(
            tmp.path().join(STACK_FILE),
            "version: 1\ntarget: develop\nprs:\n  - id: 2\n    branch: feat/b\n    needs: [1]\n  - id: 1\n    branch: feat/a\n",
        )?;
        std::fs::write(tmp.path().join(SCOPE_FILE), "version: 1\ntarget: other\n")?;

        let loaded = load_plan_inputs(&profile_in(tmp.path()), None).await?;
        assert_eq!(loaded.source, PlanSource::Stack);
        assert_eq!(loaded.plan.target, "develop");
        assert_eq!(loaded.plan.items[0].name, "PR-2");
        assert_eq!(loaded.plan.items[0].deps, vec!["PR-1".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_scope_without_forge_yields_empty_plan_with_warning() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(tmp.path().join(SCOPE_FILE), "version: 1\ntarget: main\n")?;

        let loaded = load_plan_inputs(&profile_in(tmp.path()), None).await?;
        assert_eq!(loaded.source, PlanSource::Scope);
        assert!(loaded.plan.items.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_scope_query_failure_yields_empty_plan_with_warning() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(
            tmp.path().join(SCOPE_FILE),
            "version: 1\ntarget: main\nsources:\n  - query: \"label:stack\"\n",
        )?;
        let forge = MockForge { pulls: vec![], fail: true };

        let loaded = load_plan_inputs(&profile_in(tmp.path()), Some(&forge)).await?;
        assert!(loaded.plan.items.is_empty());
        assert!(loaded.warnings[0].contains("failed"));
        Ok(())
    }

    #[tokio::test]
    async fn test_scope_discovery_with_deps_and_selectors() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(
            tmp.path().join(SCOPE_FILE),
            concat!(
                "version: 1\ntarget: main\npin_commits: true\n",
                "sources:\n  - query: \"label:stack\"\n",
                "selectors:\n  exclude_labels: [wip]\n",
                "defaults:\n  strategy: merge-weave\n",
            ),
        )?;
        std::fs::write(
            tmp.path().join(DEPS_FILE),
            "version: 1\ndepends_on:\n  - \"PR-3: PR-1\"\nstrategies:\n  PR-3: squash-weave\n",
        )?;
        let forge = MockForge {
            pulls: vec![
                pr(1, "base work", &["stack"]),
                pr(3, "Depends-on: #1\nCloses owner/other#9", &["stack"]),
                pr(4, "work in progress", &["stack", "wip"]),
            ],
            fail: false,
        };

        let loaded = load_plan_inputs(&profile_in(tmp.path()), Some(&forge)).await?;
        let plan = &loaded.plan;
        assert_eq!(plan.names(), vec!["PR-1".to_string(), "PR-3".to_string()]);

        let pr3 = plan.item("PR-3").unwrap();
        assert_eq!(pr3.deps, vec!["PR-1".to_string()]);
        assert_eq!(pr3.strategy, Some(WeaveStrategy::SquashWeave));
        assert!(pr3.sha.is_some()); // pin_commits=true
        assert!(loaded.warnings.iter().any(|w| w.contains("cross-repo")));

        let pr1 = plan.item("PR-1").unwrap();
        assert_eq!(pr1.strategy, Some(WeaveStrategy::MergeWeave));
        Ok(())
    }

    #[tokio::test]
    async fn test_sha_dropped_without_pin_commits() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(
            tmp.path().join(SCOPE_FILE),
            "version: 1\ntarget: main\nsources:\n  - query: \"label:stack\"\n",
        )?;
        let forge = MockForge {
            pulls: vec![pr(1, "", &[])],
            fail: false,
        };
        let loaded = load_plan_inputs(&profile_in(tmp.path()), Some(&forge)).await?;
        assert!(loaded.plan.item("PR-1").unwrap().sha.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_front_matter_priority_and_skip() -> Result<()> {
        let tmp = tempdir()?;
        std::fs::write(
            tmp.path().join(SCOPE_FILE),
            "version: 1\ntarget: main\nsources:\n  - query: \"label:stack\"\n",
        )?;
        std::fs::write(
            tmp.path().join(GATES_FILE),
            "\"*\":\n  - name: lint\n    run: make lint\n  - name: test\n    run: make test\n",
        )?;
        let forge = MockForge {
            pulls: vec![
                pr(1, "", &[]),
                pr(2, "priority: 5\nskip: [lint]\nrequired: [test]\n---\nurgent fix", &[]),
            ],
            fail: false,
        };

        let loaded = load_plan_inputs(&profile_in(tmp.path()), Some(&forge)).await?;
        // Higher priority sorts first
        assert_eq!(loaded.plan.items[0].name, "PR-2");
        let gate_names: Vec<&str> = loaded.plan.items[0]
            .gates
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(gate_names, vec!["test"]);

        // Front-matter `required` lands in the policy overrides
        let policy = loaded.plan.policy.unwrap();
        assert!(policy.is_required("test"));
        assert_eq!(policy.overrides.unwrap().required, vec!["test".to_string()]);
        Ok(())
    }
}
