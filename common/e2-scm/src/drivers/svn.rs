//! `svn` source driver (§4.5): identity is the "Last Changed Rev" of the
//! branch-or-tag path, read via `svn info --show-item last-changed-revision`.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use e2_model::SourceSet;

use crate::ScmDriver;

pub struct SvnDriver {
    pub repository_url: String,
    pub branch: Option<String>,
    pub tag: Option<String>,
}

impl SvnDriver {
    fn ref_path(&self) -> &str {
        self.tag.as_deref().or(self.branch.as_deref()).unwrap_or("trunk")
    }

    fn full_url(&self) -> String {
        format!("{}/{}", self.repository_url.trim_end_matches('/'), self.ref_path())
    }

    /// Queries the server for the current "Last Changed Rev" of the
    /// configured branch or tag path.
    pub fn last_changed_rev(&self) -> Result<String> {
        let output = Command::new("svn")
            .arg("info")
            .arg("--show-item")
            .arg("last-changed-revision")
            .arg(self.full_url())
            .output()
            .context("failed to run svn info")?;
        anyhow::ensure!(output.status.success(), "svn info failed: {:?}", output.status);
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }
}

impl ScmDriver for SvnDriver {
    fn display(&self) -> String {
        format!("svn {}", self.full_url())
    }

    fn fetch_source(&self, working_dir: &Path) -> Result<()> {
        e2_signal::run_and_check(
            Command::new("svn")
                .arg("checkout")
                .arg(self.full_url())
                .arg(working_dir),
        )
    }

    fn update_source(&self, working_dir: &Path) -> Result<()> {
        e2_signal::run_and_check(Command::new("svn").arg("update").current_dir(working_dir))
    }

    fn prepare_source(
        &self,
        _sourceset: SourceSet,
        working_dir: &Path,
        build_dir: &Path,
    ) -> Result<()> {
        std::fs::create_dir_all(build_dir)?;
        e2_signal::run_and_check(
            Command::new("svn")
                .arg("export")
                .arg(working_dir)
                .arg(build_dir)
                .arg("--force"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_url_prefers_tag() {
        let driver = SvnDriver {
            repository_url: "https://svn.example.com/repo".to_string(),
            branch: Some("trunk".to_string()),
            tag: Some("tags/v1.0".to_string()),
        };
        assert_eq!(driver.full_url(), "https://svn.example.com/repo/tags/v1.0");
    }
}
