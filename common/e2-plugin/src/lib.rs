//! Extensibility interface for SCM types and result types (component I).
//!
//! Rather than a dynamically loaded plugin system, "plugins" here are static
//! implementations of one of the two traits below, composed into a
//! [`Registry`] at startup by the binary crate. `depends` lets one plugin
//! declare it must be registered (and, for result types, contribute its
//! pipeline steps) after another — e.g. `collect_project` depending on
//! `result` — the way the original system expresses plugin ordering as a
//! dependency list rather than registration sequence.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

/// One named step in the linear build pipeline (component L). Plugins
/// contribute additional steps positioned relative to the canonical ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub name: String,
    /// If set, this step is inserted immediately before the named step
    /// (which must be a canonical or another plugin's step); if `None`, it
    /// is appended at the end of the pipeline.
    pub before: Option<String>,
}

impl PipelineStep {
    pub fn before(name: impl Into<String>, before: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: Some(before.into()),
        }
    }
}

/// A result-type plugin: contributes extra pipeline steps for results
/// declared with its `type`.
pub trait ResultTypePlugin: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn depends(&self) -> &'static [&'static str] {
        &[]
    }
    fn extra_steps(&self) -> Vec<PipelineStep> {
        Vec::new()
    }
}

/// An SCM-type plugin: identifies which source `type` string it handles.
/// The actual fetch/update/prepare behavior lives in the `e2-scm` crate's
/// concrete driver implementations; this trait is only the registration
/// surface so the loader can validate a source's `type` against the set of
/// drivers actually compiled in.
pub trait ScmTypePlugin: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn depends(&self) -> &'static [&'static str] {
        &[]
    }
}

/// A dependency-ordered registry of named plugins of one kind.
pub struct Registry<P: ?Sized> {
    entries: Vec<(&'static str, &'static [&'static str], Box<P>)>,
}

impl<P: ?Sized> Registry<P> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, plugin: Box<P>)
    where
        P: NamedPlugin,
    {
        self.entries.push((plugin.type_name(), plugin.depends(), plugin));
    }

    pub fn get(&self, type_name: &str) -> Option<&P> {
        self.entries
            .iter()
            .find(|(name, _, _)| *name == type_name)
            .map(|(_, _, plugin)| plugin.as_ref())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.iter().any(|(name, _, _)| *name == type_name)
    }

    /// Returns plugin type names in dependency order: every plugin comes
    /// after everything it `depends()` on, with ties broken alphabetically
    /// for determinism.
    pub fn init_order(&self) -> Result<Vec<&'static str>> {
        let names: HashMap<&'static str, &'static [&'static str]> = self
            .entries
            .iter()
            .map(|(name, deps, _)| (*name, *deps))
            .collect();

        let mut resolved: Vec<&'static str> = Vec::new();
        let mut resolved_set: HashSet<&'static str> = HashSet::new();
        let mut remaining: Vec<&'static str> = names.keys().copied().collect();
        remaining.sort_unstable();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut next_remaining = Vec::new();
            let mut ready_this_round = Vec::new();

            for name in &remaining {
                let deps = names.get(name).copied().unwrap_or(&[]);
                if deps.iter().all(|d| resolved_set.contains(d)) {
                    ready_this_round.push(*name);
                } else {
                    next_remaining.push(*name);
                }
            }

            if ready_this_round.is_empty() {
                bail!(
                    "plugin dependency cycle or missing dependency among: {}",
                    remaining.join(", ")
                );
            }
            ready_this_round.sort_unstable();
            for name in ready_this_round {
                resolved_set.insert(name);
                resolved.push(name);
                progressed = true;
            }
            remaining = next_remaining;
            remaining.sort_unstable();
            debug_assert!(progressed);
        }

        Ok(resolved)
    }
}

impl<P: ?Sized> Default for Registry<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by both plugin traits so [`Registry`] can be generic over
/// either.
pub trait NamedPlugin {
    fn type_name(&self) -> &'static str;
    fn depends(&self) -> &'static [&'static str];
}

impl NamedPlugin for dyn ResultTypePlugin {
    fn type_name(&self) -> &'static str {
        ResultTypePlugin::type_name(self)
    }
    fn depends(&self) -> &'static [&'static str] {
        ResultTypePlugin::depends(self)
    }
}

impl NamedPlugin for dyn ScmTypePlugin {
    fn type_name(&self) -> &'static str {
        ScmTypePlugin::type_name(self)
    }
    fn depends(&self) -> &'static [&'static str] {
        ScmTypePlugin::depends(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl ResultTypePlugin for Plain {
        fn type_name(&self) -> &'static str {
            "result"
        }
    }

    struct CollectProject;
    impl ResultTypePlugin for CollectProject {
        fn type_name(&self) -> &'static str {
            "collect_project"
        }
        fn depends(&self) -> &'static [&'static str] {
            &["result"]
        }
        fn extra_steps(&self) -> Vec<PipelineStep> {
            vec![PipelineStep::before("build_collect_project", "build")]
        }
    }

    #[test]
    fn init_order_respects_dependencies() {
        let mut registry: Registry<dyn ResultTypePlugin> = Registry::new();
        registry.register(Box::new(CollectProject));
        registry.register(Box::new(Plain));

        let order = registry.init_order().unwrap();
        assert_eq!(order, vec!["result", "collect_project"]);
    }

    #[test]
    fn collect_project_inserts_step_before_build() {
        let plugin = CollectProject;
        let steps = plugin.extra_steps();
        assert_eq!(steps[0].before.as_deref(), Some("build"));
    }

    #[test]
    fn detects_missing_dependency() {
        struct Orphan;
        impl ResultTypePlugin for Orphan {
            fn type_name(&self) -> &'static str {
                "orphan"
            }
            fn depends(&self) -> &'static [&'static str] {
                &["nonexistent"]
            }
        }
        let mut registry: Registry<dyn ResultTypePlugin> = Registry::new();
        registry.register(Box::new(Orphan));
        assert!(registry.init_order().is_err());
    }
}
