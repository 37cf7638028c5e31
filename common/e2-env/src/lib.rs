//! Ordered key-value environment overlays and their identity hash (component
//! G).
//!
//! An [`Environment`] is an *overlay*: sources, results, and the project
//! itself each carry one, and a result's effective environment is the
//! project's global overlay merged with every contributing source/result
//! overlay, later entries overriding earlier ones for the same key.

use std::collections::BTreeMap;

use e2_hash::IdHasher;

/// An ordered set of environment variable overrides.
///
/// Internally backed by a [`BTreeMap`] so iteration is always in
/// lexicographic key order — §4.2 fixes envid to always sort by key
/// ("the historical ordering bug (insertion vs. sorted) is fixed by always
/// sorting"), so there is no separate insertion-order representation to get
/// out of sync with the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    entries: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` over `self`: keys in `other` win, keys only in `self`
    /// are kept. Used to build a result's effective environment from the
    /// project's overlay plus each contributing entity's overlay, in
    /// declaration order.
    pub fn merged_over(&self, other: &Environment) -> Environment {
        let mut merged = self.entries.clone();
        merged.extend(other.entries.clone());
        Environment { entries: merged }
    }

    /// The envid: hash of `k1\0v1\0k2\0v2\0...` in lexicographic key order
    /// (§4.2). Because entries are always stored in a `BTreeMap`, this is
    /// simply an iteration over `self.entries`.
    pub fn envid(&self) -> String {
        let mut hasher = IdHasher::new();
        for (key, value) in &self.entries {
            hasher.field(key).field(value);
        }
        hasher.finish()
    }

    /// Renders as `KEY=VALUE` lines, the format written to a build's `env`
    /// file (component L, step 7).
    pub fn to_env_file(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envid_is_order_insensitive_to_insertion() {
        let mut a = Environment::new();
        a.insert("B", "2");
        a.insert("A", "1");

        let mut b = Environment::new();
        b.insert("A", "1");
        b.insert("B", "2");

        assert_eq!(a.envid(), b.envid());
    }

    #[test]
    fn envid_changes_with_value() {
        let mut a = Environment::new();
        a.insert("A", "1");
        let mut b = Environment::new();
        b.insert("A", "2");
        assert_ne!(a.envid(), b.envid());
    }

    #[test]
    fn merge_prefers_other() {
        let mut base = Environment::new();
        base.insert("A", "1");
        base.insert("B", "base");

        let mut overlay = Environment::new();
        overlay.insert("B", "overlay");

        let merged = base.merged_over(&overlay);
        assert_eq!(merged.get("A"), Some("1"));
        assert_eq!(merged.get("B"), Some("overlay"));
    }

    #[test]
    fn env_file_is_sorted() {
        let mut env = Environment::new();
        env.insert("Z", "1");
        env.insert("A", "2");
        assert_eq!(env.to_env_file(), "A=2\nZ=1\n");
    }
}
