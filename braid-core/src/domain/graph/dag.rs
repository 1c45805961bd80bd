// braid-core/src/domain/graph/dag.rs

use crate::domain::error::DomainError;
use crate::domain::plan::Plan;
use std::collections::{BTreeMap, VecDeque};

pub struct GraphSolver;

impl GraphSolver {
    /// Calculates the execution order of plan items (Topological Sort with Levels).
    /// Returns a list of levels, where each level contains items that can be merged
    /// or checked in parallel. Level N depends only on levels 0..N-1.
    ///
    /// Deterministic: items within a level are sorted by name, so repeated
    /// calls on the same plan yield identical nested sequences.
    pub fn plan_levels(plan: &Plan) -> Result<Vec<Vec<String>>, DomainError> {
        Self::levelize(
            plan.items
                .iter()
                .map(|item| (item.name.as_str(), item.deps.as_slice())),
        )
    }

    /// Levelizes any (name, deps) pairs. Errors:
    /// - [`DomainError::UnknownDependency`] when a dep is not a declared name.
    /// - [`DomainError::CircularDependency`] listing the residual set, sorted.
    pub fn levelize<'a, I>(items: I) -> Result<Vec<Vec<String>>, DomainError>
    where
        I: Iterator<Item = (&'a str, &'a [String])> + Clone,
    {
        // BTreeMaps keep every iteration order deterministic
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (name, _) in items.clone() {
            in_degree.insert(name, 0);
            children.insert(name, Vec::new());
        }

        // Graph construction (dependency inversion: dep -> dependents)
        for (name, deps) in items.clone() {
            for dep in deps {
                if !in_degree.contains_key(dep.as_str()) {
                    return Err(DomainError::UnknownDependency {
                        item: name.to_string(),
                        dep: dep.clone(),
                    });
                }
                children.entry(dep.as_str()).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm, layered, with lexicographic tie-break
        let total = in_degree.len();
        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect(); // BTreeMap iteration is already sorted

        let mut resolved = 0;

        while !queue.is_empty() {
            let mut level: Vec<&str> = queue.drain(..).collect();
            level.sort_unstable();

            let mut next: Vec<&str> = Vec::new();
            for current in &level {
                resolved += 1;
                if let Some(dependents) = children.get(current) {
                    for dependent in dependents {
                        if let Some(degree) = in_degree.get_mut(dependent) {
                            *degree -= 1;
                            if *degree == 0 {
                                next.push(dependent);
                            }
                        }
                    }
                }
            }
            levels.push(level.into_iter().map(String::from).collect());
            queue.extend(next);
        }

        // Cycle detection: anything left with in-degree > 0 sits on a cycle
        if resolved != total {
            let mut remaining: Vec<&str> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(n, _)| *n)
                .collect();
            remaining.sort_unstable();
            return Err(DomainError::CircularDependency(remaining.join(", ")));
        }

        Ok(levels)
    }
}
