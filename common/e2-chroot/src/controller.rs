//! Chroot directory lifecycle: **absent → reserved → populated → in-use →
//! (kept|removed)** (§2, §4.7), keyed by result name and locked exclusively
//! for the duration of one build.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use e2_fileutil::DirLock;
use e2_scm::TarType;

use crate::helper::{ChrootHelper, SENTINEL_FILE};

/// Root directory under which one e2 version's chroots live, so two
/// versions running concurrently never collide (§4.7).
pub struct ChrootBase {
    root: PathBuf,
}

impl ChrootBase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn result_dir(&self, result_name: &str) -> PathBuf {
        self.root.join(result_name)
    }
}

/// A reserved, locked chroot directory for one result build. Dropping it
/// without calling [`ChrootController::teardown`] leaves the directory
/// locked until the process exits; pipeline code should always route
/// through `teardown`.
pub struct ReservedChroot {
    pub base_dir: PathBuf,
    pub chroot_dir: PathBuf,
    _lock: DirLock,
    keep: bool,
}

impl ReservedChroot {
    /// Marks this chroot to survive teardown, per the `--keep` flag or
    /// playground mode.
    pub fn mark_keep(&mut self) {
        self.keep = true;
    }
}

pub struct ChrootController<'h> {
    base: ChrootBase,
    helper: &'h dyn ChrootHelper,
}

impl<'h> ChrootController<'h> {
    pub fn new(base: ChrootBase, helper: &'h dyn ChrootHelper) -> Self {
        Self { base, helper }
    }

    /// `setup_chroot` (§4.6 step 2): creates `chroot/`, writes the sentinel,
    /// and hands ownership to root via the helper. Fails if another build
    /// already holds this result's chroot.
    pub fn setup(&self, result_name: &str) -> Result<ReservedChroot> {
        let base_dir = self.base.result_dir(result_name);
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("failed to create chroot base {base_dir:?}"))?;

        let lock = DirLock::try_acquire(&base_dir)?.with_context(|| {
            format!("chroot for result {result_name:?} is already in use by another build")
        })?;

        let chroot_dir = base_dir.join("chroot");
        fs::create_dir_all(&chroot_dir)
            .with_context(|| format!("failed to create {chroot_dir:?}"))?;
        fs::write(base_dir.join(SENTINEL_FILE), b"")
            .context("failed to write chroot sentinel")?;

        self.helper
            .set_permissions(&base_dir)
            .context("failed to hand newly reserved chroot to root")?;

        Ok(ReservedChroot {
            base_dir,
            chroot_dir,
            _lock: lock,
            keep: false,
        })
    }

    /// `install_chroot_groups` (§4.6 step 3): extracts one chroot-group
    /// tarball into the reserved chroot.
    pub fn install_tarball(
        &self,
        chroot: &ReservedChroot,
        tar_type: TarType,
        tarball: &Path,
    ) -> Result<()> {
        self.helper
            .extract_tar(&chroot.base_dir, tar_type, tarball)
            .with_context(|| format!("failed to extract {tarball:?} into chroot"))
    }

    /// `fix_permissions` (§4.6 step 8): chowns everything under the chroot
    /// back to root after build-time writes by the unprivileged driver.
    pub fn fix_permissions(&self, chroot: &ReservedChroot) -> Result<()> {
        self.helper.set_permissions(&chroot.base_dir)
    }

    /// `build` (§4.6 step 9): runs `command` inside the chroot via the
    /// helper.
    pub fn run(&self, chroot: &ReservedChroot, command: &[String]) -> Result<()> {
        self.helper.chroot_run(&chroot.base_dir, command)
    }

    /// `teardown` (§4.6 step 12): privileged removal unless the chroot was
    /// marked to be kept.
    pub fn teardown(&self, chroot: ReservedChroot) -> Result<()> {
        if chroot.keep {
            tracing::info!(base_dir = %chroot.base_dir.display(), "keeping chroot per request");
            return Ok(());
        }
        self.helper.remove_chroot(&chroot.base_dir)
    }
}
