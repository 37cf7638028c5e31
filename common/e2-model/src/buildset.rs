use crate::source::SourceSet;

/// Per-result choice of which checked-out state to build from
/// (spec.md §6's `--build-mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Tag,
    Branch,
    WorkingCopy,
    /// Tag mode plus remote-tag verification and post-build deploy.
    Release,
}

impl BuildMode {
    /// The [`SourceSet`] each build mode resolves its sources against.
    /// `Release` still checks out by tag; the extra verification/deploy
    /// behavior lives at the pipeline level (component L), not in the
    /// identity computation.
    pub fn sourceset(&self) -> SourceSet {
        match self {
            Self::Tag | Self::Release => SourceSet::Tag,
            Self::Branch => SourceSet::Branch,
            Self::WorkingCopy => SourceSet::WorkingCopy,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    pub force_rebuild: bool,
    pub keep_chroot: bool,
    pub playground: bool,
    pub check_remote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSetEntry {
    pub result: String,
    pub mode: BuildMode,
    pub settings: BuildSettings,
}

/// The results selected for a build run, each with its own mode and
/// settings (component H's `BuildSet`; component K turns this into an
/// ordered `BuildPlan`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSet {
    pub entries: Vec<BuildSetEntry>,
}

impl BuildSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: impl Into<String>, mode: BuildMode, settings: BuildSettings) {
        self.entries.push(BuildSetEntry {
            result: result.into(),
            mode,
            settings,
        });
    }

    pub fn mode_for(&self, result: &str) -> Option<BuildMode> {
        self.entries
            .iter()
            .find(|e| e.result == result)
            .map(|e| e.mode)
    }
}
