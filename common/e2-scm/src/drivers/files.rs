//! The `files` source driver: unpacks archives, copies plain files, and
//! applies patches into a source's working directory (§4.5).

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use e2_model::{FileAction, SourceSet};

use crate::tartype::TarType;
use crate::ScmDriver;

/// One resolved file entry: a local cache path plus the action to apply.
pub struct FilesEntry {
    pub cached_path: std::path::PathBuf,
    pub location: String,
    pub action: FileAction,
}

pub struct FilesDriver {
    pub entries: Vec<FilesEntry>,
}

impl ScmDriver for FilesDriver {
    fn display(&self) -> String {
        format!("files ({} entries)", self.entries.len())
    }

    fn working_copy_available(&self, _working_dir: &Path) -> bool {
        // A files source has no persistent working copy of its own; it is
        // materialized fresh into the build directory on every prepare.
        true
    }

    fn fetch_source(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }

    fn update_source(&self, _working_dir: &Path) -> Result<()> {
        Ok(())
    }

    fn prepare_source(
        &self,
        _sourceset: SourceSet,
        _working_dir: &Path,
        build_dir: &Path,
    ) -> Result<()> {
        fs::create_dir_all(build_dir)?;
        for entry in &self.entries {
            apply_entry(entry, build_dir)?;
        }
        Ok(())
    }
}

fn apply_entry(entry: &FilesEntry, build_dir: &Path) -> Result<()> {
    match entry.action {
        FileAction::Unpack => unpack(&entry.cached_path, &entry.location, build_dir),
        FileAction::Copy => copy(&entry.cached_path, &entry.location, build_dir),
        FileAction::Patch => patch(&entry.cached_path, build_dir),
    }
}

fn unpack(cached_path: &Path, location: &str, build_dir: &Path) -> Result<()> {
    let tar_type = TarType::detect(location)?;
    let file = fs::File::open(cached_path)
        .with_context(|| format!("failed to open {cached_path:?} for unpacking"))?;
    let mut archive = match tar_type {
        TarType::Plain => tar::Archive::new(Box::new(file) as Box<dyn std::io::Read>),
        TarType::Gzip => {
            tar::Archive::new(Box::new(flate2::read::GzDecoder::new(file)) as Box<dyn std::io::Read>)
        }
        TarType::Bzip2 => {
            tar::Archive::new(Box::new(bzip2::read::BzDecoder::new(file)) as Box<dyn std::io::Read>)
        }
        TarType::Xz => {
            tar::Archive::new(Box::new(xz2::read::XzDecoder::new(file)) as Box<dyn std::io::Read>)
        }
    };
    archive
        .unpack(build_dir)
        .with_context(|| format!("failed to unpack {cached_path:?} into {build_dir:?}"))
}

fn copy(cached_path: &Path, location: &str, build_dir: &Path) -> Result<()> {
    let basename = Path::new(location)
        .file_name()
        .with_context(|| format!("location {location:?} has no basename"))?;
    let dest = build_dir.join(basename);
    if cached_path.is_dir() {
        copy_dir_recursive(cached_path, &dest)
    } else {
        fs::copy(cached_path, &dest)
            .with_context(|| format!("failed to copy {cached_path:?} to {dest:?}"))?;
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_entry = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_entry)?;
        } else {
            fs::copy(entry.path(), &dest_entry)?;
        }
    }
    Ok(())
}

fn patch(patch_file: &Path, build_dir: &Path) -> Result<()> {
    let file = fs::File::open(patch_file)
        .with_context(|| format!("failed to open patch {patch_file:?}"))?;
    let mut cmd = Command::new("patch");
    cmd.arg("-p1").arg("-d").arg(build_dir).stdin(file);
    e2_signal::run_and_check(&mut cmd)
}
