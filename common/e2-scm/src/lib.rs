//! SCM drivers (component J): one implementation per source type, behind a
//! uniform interface the build pipeline (component L) drives without caring
//! which type it's talking to.

pub mod drivers;
mod tartype;

use std::path::Path;

use anyhow::Result;
use e2_model::SourceSet;

pub use tartype::TarType;

/// The uniform operations every source type supports, regardless of how it
/// actually moves bytes around.
pub trait ScmDriver {
    /// Human-readable identification for logs (`type name:location`).
    fn display(&self) -> String;

    /// Whether a working copy already exists at `working_dir`.
    fn working_copy_available(&self, working_dir: &Path) -> bool {
        working_dir.exists()
    }

    /// Sanity-checks an existing working copy (e.g. that it isn't half
    /// checked-out from a previous interrupted run). The default is a no-op;
    /// drivers whose checkout can be left in an inconsistent state override
    /// it.
    fn check_workingcopy(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }

    /// First-time checkout into `working_dir`.
    fn fetch_source(&self, working_dir: &Path) -> Result<()>;

    /// Refreshes an existing working copy in place.
    fn update_source(&self, working_dir: &Path) -> Result<()>;

    /// Materializes `sourceset`'s content into `build_dir` for a build.
    fn prepare_source(
        &self,
        sourceset: SourceSet,
        working_dir: &Path,
        build_dir: &Path,
    ) -> Result<()>;
}

/// The registration surface used by [`e2_plugin::ScmTypePlugin`] to confirm
/// a source's configured `type` is one the binary was compiled with a
/// driver for.
pub fn known_types() -> &'static [&'static str] {
    &["files", "git", "gitrepo", "svn", "cvs", "licence"]
}
