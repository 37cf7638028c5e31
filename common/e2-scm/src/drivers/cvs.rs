//! `cvs` source driver (§4.5): tag mode only, since CVS has no stable
//! revision identifier for a moving branch. The config loader refuses a
//! cvs source declared without a tag before this driver is ever reached.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use e2_model::SourceSet;

use crate::ScmDriver;

pub struct CvsDriver {
    pub cvsroot: String,
    pub module: String,
    pub tag: String,
}

impl ScmDriver for CvsDriver {
    fn display(&self) -> String {
        format!("cvs {} {} -r {}", self.cvsroot, self.module, self.tag)
    }

    fn fetch_source(&self, working_dir: &Path) -> Result<()> {
        let parent = working_dir
            .parent()
            .context("working directory has no parent to check out into")?;
        std::fs::create_dir_all(parent)?;
        e2_signal::run_and_check(
            Command::new("cvs")
                .arg("-d")
                .arg(&self.cvsroot)
                .arg("checkout")
                .arg("-r")
                .arg(&self.tag)
                .arg("-d")
                .arg(working_dir.file_name().context("invalid working dir")?)
                .arg(&self.module)
                .current_dir(parent),
        )
    }

    fn update_source(&self, working_dir: &Path) -> Result<()> {
        e2_signal::run_and_check(
            Command::new("cvs")
                .arg("update")
                .arg("-r")
                .arg(&self.tag)
                .current_dir(working_dir),
        )
    }

    fn prepare_source(
        &self,
        sourceset: SourceSet,
        working_dir: &Path,
        build_dir: &Path,
    ) -> Result<()> {
        anyhow::ensure!(
            sourceset == SourceSet::Tag,
            "cvs sources only support tag-mode builds"
        );
        std::fs::create_dir_all(build_dir)?;
        copy_tree(working_dir, build_dir)
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        if entry.file_name() == "CVS" {
            continue;
        }
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
