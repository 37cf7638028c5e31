use std::collections::HashSet;

/// The warning classes a diagnostic can belong to, matching the `--Wxxx` CLI
/// flags of spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningClass {
    /// Enabled unless explicitly suppressed; covers most loader diagnostics
    /// (e.g. an unknown-but-tolerated key).
    Default,
    /// A recognized key or construct that is slated for removal.
    Deprecated,
    /// Diagnostics about ambiguous or missing data that don't fit the other
    /// classes.
    Other,
    /// Policy-level advice (e.g. style conventions) rather than correctness.
    Policy,
    /// Low-priority hints.
    Hint,
}

/// Tracks which warning classes are currently enabled, built from the
/// `--Wall`/`--Wdefault`/`--Wdeprecated`/`--Wnoother`/`--Wpolicy`/`--Whint`
/// flags.
#[derive(Debug, Clone)]
pub struct WarningFilter {
    enabled: HashSet<WarningClass>,
}

impl Default for WarningFilter {
    /// `--Wdefault` is implied unless the user overrides it: only
    /// [`WarningClass::Default`] warnings are shown out of the box.
    fn default() -> Self {
        let mut enabled = HashSet::new();
        enabled.insert(WarningClass::Default);
        Self { enabled }
    }
}

impl WarningFilter {
    pub fn none() -> Self {
        Self {
            enabled: HashSet::new(),
        }
    }

    pub fn all() -> Self {
        Self {
            enabled: [
                WarningClass::Default,
                WarningClass::Deprecated,
                WarningClass::Other,
                WarningClass::Policy,
                WarningClass::Hint,
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn enable(&mut self, class: WarningClass) {
        self.enabled.insert(class);
    }

    pub fn disable(&mut self, class: WarningClass) {
        self.enabled.remove(&class);
    }

    pub fn is_enabled(&self, class: WarningClass) -> bool {
        self.enabled.contains(&class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_shows_only_default_class() {
        let filter = WarningFilter::default();
        assert!(filter.is_enabled(WarningClass::Default));
        assert!(!filter.is_enabled(WarningClass::Hint));
    }

    #[test]
    fn all_enables_every_class() {
        let filter = WarningFilter::all();
        assert!(filter.is_enabled(WarningClass::Policy));
        assert!(filter.is_enabled(WarningClass::Hint));
    }
}
