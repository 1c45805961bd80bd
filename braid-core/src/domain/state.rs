// braid-core/src/domain/state.rs

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::domain::plan::Plan;

/// Runtime status of one plan item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Blocked,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Passed | ItemStatus::Failed | ItemStatus::Blocked)
    }
}

/// Derived merge-readiness bucket used by the merge rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Eligibility {
    Eligible,
    Pending,
    Blocked,
    Failed,
}

/// In-memory eligibility tracking across levels.
///
/// Single-writer: only the gate engine mutates it; readers (annotators,
/// reports) work from [`ExecutionState::snapshot`]. Transitions are
/// monotonic; no item returns to `pending` after leaving it.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    statuses: BTreeMap<String, ItemStatus>,
}

impl ExecutionState {
    pub fn new(plan: &Plan) -> Self {
        Self {
            statuses: plan
                .items
                .iter()
                .map(|i| (i.name.clone(), ItemStatus::Pending))
                .collect(),
        }
    }

    pub fn status(&self, name: &str) -> ItemStatus {
        self.statuses.get(name).copied().unwrap_or(ItemStatus::Pending)
    }

    /// Applies a transition if it is legal, returning whether it took
    /// effect. Legal moves: pending→running, pending→blocked,
    /// running→passed, running→failed, running→blocked (cancellation).
    pub fn transition(&mut self, name: &str, next: ItemStatus) -> bool {
        let Some(current) = self.statuses.get_mut(name) else {
            return false;
        };
        let legal = matches!(
            (*current, next),
            (ItemStatus::Pending, ItemStatus::Running)
                | (ItemStatus::Pending, ItemStatus::Blocked)
                | (ItemStatus::Running, ItemStatus::Passed)
                | (ItemStatus::Running, ItemStatus::Failed)
                | (ItemStatus::Running, ItemStatus::Blocked)
        );
        if legal {
            *current = next;
        } else if *current != next {
            debug!(item = name, from = ?current, to = ?next, "ignoring illegal status transition");
        }
        legal
    }

    /// Propagates blockage: any non-terminal item with a failed or blocked
    /// dependency becomes blocked. Runs to a fixpoint so chains of
    /// dependents settle in one call.
    pub fn block_dependents(&mut self, plan: &Plan) {
        loop {
            let mut changed = false;
            for item in &plan.items {
                if self.status(&item.name).is_terminal() {
                    continue;
                }
                let blocked = item.deps.iter().any(|d| {
                    matches!(self.status(d), ItemStatus::Failed | ItemStatus::Blocked)
                });
                if blocked && self.transition(&item.name, ItemStatus::Blocked) {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Derived merge-readiness bucket for one item.
    pub fn eligibility(&self, plan: &Plan, name: &str) -> Eligibility {
        match self.status(name) {
            ItemStatus::Failed => Eligibility::Failed,
            ItemStatus::Blocked => Eligibility::Blocked,
            ItemStatus::Passed => {
                let item = plan.item(name);
                let deps_passed = item
                    .map(|i| i.deps.iter().all(|d| self.status(d) == ItemStatus::Passed))
                    .unwrap_or(false);
                if deps_passed {
                    Eligibility::Eligible
                } else {
                    Eligibility::Pending
                }
            }
            ItemStatus::Pending | ItemStatus::Running => {
                let item = plan.item(name);
                let dep_blocked = item
                    .map(|i| {
                        i.deps.iter().any(|d| {
                            matches!(self.status(d), ItemStatus::Failed | ItemStatus::Blocked)
                        })
                    })
                    .unwrap_or(false);
                if dep_blocked {
                    Eligibility::Blocked
                } else {
                    Eligibility::Pending
                }
            }
        }
    }

    /// Buckets every item, sorted by name within each bucket.
    pub fn buckets(&self, plan: &Plan) -> BTreeMap<Eligibility, Vec<String>> {
        let mut out: BTreeMap<Eligibility, Vec<String>> = BTreeMap::new();
        for item in &plan.items {
            out.entry(self.eligibility(plan, &item.name))
                .or_default()
                .push(item.name.clone());
        }
        out
    }

    pub fn snapshot(&self) -> BTreeMap<String, ItemStatus> {
        self.statuses.clone()
    }

    pub fn all_passed(&self) -> bool {
        self.statuses.values().all(|s| *s == ItemStatus::Passed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::plan::PlanItem;

    fn plan() -> Plan {
        let mut plan = Plan::new("main");
        plan.items = vec![
            PlanItem::named("a"),
            PlanItem {
                deps: vec!["a".into()],
                ..PlanItem::named("b")
            },
            PlanItem {
                deps: vec!["b".into()],
                ..PlanItem::named("c")
            },
        ];
        plan
    }

    #[test]
    fn test_monotonic_transitions() {
        let plan = plan();
        let mut state = ExecutionState::new(&plan);

        assert!(state.transition("a", ItemStatus::Running));
        assert!(state.transition("a", ItemStatus::Failed));
        // Terminal: cannot go back
        assert!(!state.transition("a", ItemStatus::Pending));
        assert!(!state.transition("a", ItemStatus::Running));
        assert!(!state.transition("a", ItemStatus::Passed));
        assert_eq!(state.status("a"), ItemStatus::Failed);
    }

    #[test]
    fn test_block_propagates_through_chain() {
        let plan = plan();
        let mut state = ExecutionState::new(&plan);
        state.transition("a", ItemStatus::Running);
        state.transition("a", ItemStatus::Failed);
        state.block_dependents(&plan);

        assert_eq!(state.status("b"), ItemStatus::Blocked);
        assert_eq!(state.status("c"), ItemStatus::Blocked);
    }

    #[test]
    fn test_eligibility_buckets() {
        let plan = plan();
        let mut state = ExecutionState::new(&plan);
        state.transition("a", ItemStatus::Running);
        state.transition("a", ItemStatus::Passed);

        assert_eq!(state.eligibility(&plan, "a"), Eligibility::Eligible);
        assert_eq!(state.eligibility(&plan, "b"), Eligibility::Pending);

        state.transition("b", ItemStatus::Running);
        state.transition("b", ItemStatus::Failed);
        state.block_dependents(&plan);

        assert_eq!(state.eligibility(&plan, "b"), Eligibility::Failed);
        assert_eq!(state.eligibility(&plan, "c"), Eligibility::Blocked);
    }

    #[test]
    fn test_failed_never_returns_to_pending_or_passed() {
        let plan = plan();
        let mut state = ExecutionState::new(&plan);
        state.transition("b", ItemStatus::Running);
        state.transition("b", ItemStatus::Failed);

        for next in [ItemStatus::Pending, ItemStatus::Passed, ItemStatus::Running] {
            assert!(!state.transition("b", next));
        }
        assert_eq!(state.status("b"), ItemStatus::Failed);
    }
}
