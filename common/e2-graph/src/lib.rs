//! Dependency graph and build scheduler (component K): transitive closure,
//! cycle detection, and a deterministic topological build order.
//!
//! The scheduler is single-threaded and cooperative (§5): a build run
//! processes results sequentially in the order returned here. Nothing in
//! this crate runs a build itself; it only decides *which order*.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{bail, Result};

/// The ordered list of result names a build run should process, derived
/// from a [`DependencyGraph`]. Kept as an explicit value (rather than just
/// iterating the graph at build time) so a future parallel scheduler can
/// consume the same plan while still guaranteeing buildid computation stays
/// serial, per §5's escape hatch for parallelism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub order: Vec<String>,
}

/// The declared `depends` edges between results, independent of any
/// particular build run's selected roots.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    depends: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, name: impl Into<String>, depends: Vec<String>) {
        self.depends.insert(name.into(), depends);
    }

    fn depends_of(&self, name: &str) -> Result<&[String]> {
        self.depends
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow::anyhow!("unknown result {name:?}"))
    }

    /// Every result transitively required to build `roots`, including the
    /// roots themselves.
    pub fn transitive_closure(&self, roots: &[String]) -> Result<BTreeSet<String>> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = roots.to_vec();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            for dep in self.depends_of(&name)? {
                stack.push(dep.clone());
            }
        }
        Ok(seen)
    }

    /// Returns a deterministic build order for `roots` and everything they
    /// transitively depend on: every result comes after all of its
    /// dependencies, with ties among independently-ready results broken
    /// alphabetically by name.
    pub fn build_plan(&self, roots: &[String]) -> Result<BuildPlan> {
        let closure = self.transitive_closure(roots)?;
        self.detect_cycle(&closure)?;

        let mut resolved: HashSet<String> = HashSet::new();
        let mut order = Vec::with_capacity(closure.len());
        let mut remaining: Vec<String> = closure.into_iter().collect();

        while !remaining.is_empty() {
            let mut ready: Vec<String> = Vec::new();
            let mut still_remaining = Vec::new();
            for name in &remaining {
                let deps = self.depends_of(name)?;
                if deps.iter().all(|d| resolved.contains(d)) {
                    ready.push(name.clone());
                } else {
                    still_remaining.push(name.clone());
                }
            }
            if ready.is_empty() {
                // detect_cycle already ran, so this should be unreachable;
                // guard against it anyway rather than looping forever.
                bail!("internal error: no progress building order for {still_remaining:?}");
            }
            ready.sort();
            for name in ready {
                resolved.insert(name.clone());
                order.push(name);
            }
            remaining = still_remaining;
        }

        Ok(BuildPlan { order })
    }

    /// Walks `closure` looking for a dependency cycle, returning an error
    /// that names the cycle's path if one exists.
    fn detect_cycle(&self, closure: &BTreeSet<String>) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<String> = Vec::new();

        fn visit<'a>(
            graph: &'a DependencyGraph,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(name.to_string());
                    let start = path.iter().position(|n| n == name).unwrap();
                    bail!("dependency cycle: {}", path[start..].join(" -> "));
                }
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            path.push(name.to_string());
            for dep in graph.depends_of(name)? {
                visit(graph, dep, marks, path)?;
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in closure {
            visit(self, name, &mut marks, &mut path)?;
        }
        Ok(())
    }
}

/// Fails if two different result names share the same buildid — spec.md §4
/// treats that as a fatal invariant breach, not a cache hit, since distinct
/// inputs are never supposed to collide.
pub fn detect_buildid_collisions(buildids: &[(String, String)]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (name, id) in buildids {
        if let Some(other) = seen.insert(id, name) {
            if other != name {
                bail!("buildid collision: {other:?} and {name:?} both hash to {id}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_result("a", vec![]);
        g.add_result("b", vec!["a".to_string()]);
        g.add_result("c", vec!["a".to_string(), "b".to_string()]);
        g
    }

    #[test]
    fn build_plan_respects_dependencies() {
        let plan = graph().build_plan(&["c".to_string()]).unwrap();
        assert_eq!(plan.order, vec!["a", "b", "c"]);
    }

    #[test]
    fn independent_branches_break_ties_alphabetically() {
        let mut g = DependencyGraph::new();
        g.add_result("root", vec!["z".to_string(), "y".to_string()]);
        g.add_result("y", vec![]);
        g.add_result("z", vec![]);
        let plan = g.build_plan(&["root".to_string()]).unwrap();
        assert_eq!(plan.order, vec!["y", "z", "root"]);
    }

    #[test]
    fn detects_cycle_with_path() {
        let mut g = DependencyGraph::new();
        g.add_result("a", vec!["b".to_string()]);
        g.add_result("b", vec!["a".to_string()]);
        let err = g.build_plan(&["a".to_string()]).unwrap_err();
        assert!(err.to_string().contains("dependency cycle"));
    }

    #[test]
    fn collision_detection_flags_distinct_names_same_id() {
        let ids = vec![("r1".to_string(), "abc".to_string()), ("r2".to_string(), "abc".to_string())];
        assert!(detect_buildid_collisions(&ids).is_err());
    }

    #[test]
    fn collision_detection_allows_repeated_entry_for_same_name() {
        let ids = vec![("r1".to_string(), "abc".to_string()), ("r1".to_string(), "abc".to_string())];
        assert!(detect_buildid_collisions(&ids).is_ok());
    }
}
