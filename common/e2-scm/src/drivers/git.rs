//! `git` and `gitrepo` source drivers (§4.5).
//!
//! `git` and `gitrepo` share fetch/update logic; they differ only in what
//! `prepare_source` materializes into the build directory — `git` exports a
//! plain tree, `gitrepo` also carries `.git` so build scripts can run git
//! commands against real history.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use e2_model::SourceSet;

use crate::ScmDriver;

pub struct GitDriver {
    pub remote: String,
    pub branch: Option<String>,
    pub tag: Option<String>,
    /// Whether to materialize `.git` into the build directory (`gitrepo`)
    /// or just a plain export (`git`).
    pub materialize_git_dir: bool,
}

impl GitDriver {
    fn tracked_ref(&self) -> &str {
        self.tag.as_deref().or(self.branch.as_deref()).unwrap_or("HEAD")
    }
}

impl ScmDriver for GitDriver {
    fn display(&self) -> String {
        format!(
            "git {} ({})",
            self.remote,
            self.tag.as_deref().unwrap_or_else(|| self.branch.as_deref().unwrap_or("HEAD"))
        )
    }

    fn check_workingcopy(&self, working_dir: &Path) -> Result<()> {
        if working_dir.join(".git").exists() {
            return Ok(());
        }
        anyhow::bail!("{working_dir:?} is not a git working copy");
    }

    fn fetch_source(&self, working_dir: &Path) -> Result<()> {
        e2_signal::run_and_check(
            Command::new("git")
                .arg("clone")
                .arg(&self.remote)
                .arg(working_dir),
        )
    }

    fn update_source(&self, working_dir: &Path) -> Result<()> {
        e2_signal::run_and_check(
            Command::new("git").arg("-C").arg(working_dir).arg("fetch"),
        )?;
        e2_signal::run_and_check(
            Command::new("git")
                .arg("-C")
                .arg(working_dir)
                .arg("fetch")
                .arg("--tags"),
        )?;
        // Fast-forward-only: refuses to run if the local branch has diverged,
        // so local work is never clobbered.
        e2_signal::run_and_check(
            Command::new("git")
                .arg("-C")
                .arg(working_dir)
                .arg("merge")
                .arg("--ff-only")
                .arg(self.tracked_ref()),
        )
    }

    fn prepare_source(
        &self,
        sourceset: SourceSet,
        working_dir: &Path,
        build_dir: &Path,
    ) -> Result<()> {
        let checkout_ref = match sourceset {
            SourceSet::Tag => self
                .tag
                .as_deref()
                .with_context(|| format!("git source {} has no tag configured", self.remote))?,
            SourceSet::Branch => self
                .branch
                .as_deref()
                .with_context(|| format!("git source {} has no branch configured", self.remote))?,
            SourceSet::WorkingCopy => "HEAD",
        };

        fs::create_dir_all(build_dir)?;
        if self.materialize_git_dir {
            e2_signal::run_and_check(
                Command::new("git")
                    .arg("clone")
                    .arg("--no-checkout")
                    .arg(working_dir)
                    .arg(build_dir),
            )?;
            e2_signal::run_and_check(
                Command::new("git")
                    .arg("-C")
                    .arg(build_dir)
                    .arg("checkout")
                    .arg(checkout_ref),
            )
        } else {
            e2_signal::run_and_check(
                Command::new("git")
                    .arg("-C")
                    .arg(working_dir)
                    .arg("archive")
                    .arg(checkout_ref)
                    .arg("--output")
                    .arg(build_dir.join("export.tar")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_ref_prefers_tag_over_branch() {
        let driver = GitDriver {
            remote: "https://example.com/repo.git".to_string(),
            branch: Some("main".to_string()),
            tag: Some("v1.0".to_string()),
            materialize_git_dir: false,
        };
        assert_eq!(driver.tracked_ref(), "v1.0");
    }

    #[test]
    fn tracked_ref_falls_back_to_branch() {
        let driver = GitDriver {
            remote: "https://example.com/repo.git".to_string(),
            branch: Some("main".to_string()),
            tag: None,
            materialize_git_dir: false,
        };
        assert_eq!(driver.tracked_ref(), "main");
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn update_source_is_idempotent_with_no_upstream_change() {
        let remote = tempfile::tempdir().unwrap();
        git(remote.path(), &["init", "--quiet", "-b", "master"]);
        fs::write(remote.path().join("file.txt"), "v1").unwrap();
        git(remote.path(), &["add", "file.txt"]);
        git(remote.path(), &["commit", "--quiet", "-m", "initial"]);

        let working_dir_parent = tempfile::tempdir().unwrap();
        let working_dir = working_dir_parent.path().join("clone");
        let driver = GitDriver {
            remote: remote.path().to_string_lossy().into_owned(),
            branch: Some("master".to_string()),
            tag: None,
            materialize_git_dir: false,
        };
        driver.fetch_source(&working_dir).unwrap();

        driver.update_source(&working_dir).unwrap();
        let after_first: Vec<u8> = fs::read(working_dir.join("file.txt")).unwrap();
        driver.update_source(&working_dir).unwrap();
        let after_second: Vec<u8> = fs::read(working_dir.join("file.txt")).unwrap();

        assert_eq!(after_first, after_second);
    }
}
