use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use anyhow::Result;
use lazy_static::lazy_static;
use tracing::info_span;

use crate::remove::remove_dir_all_with_chmod;

lazy_static! {
    static ref DEFAULT_PREFIX: OsString = {
        let current_exe = std::env::current_exe().unwrap_or_default();
        let current_program_name = current_exe
            .file_name()
            .unwrap_or(OsStr::new("__unknown__"))
            .to_string_lossy();
        format!("e2.{}.", current_program_name).into()
    };
}

/// Safer version of [`tempfile::TempDir`].
///
/// - Directory names are prefixed with the current program name by default,
///   so stale temp directories under `$TMPDIR`/`$E2TMPDIR` are easy to
///   attribute to the tool that left them.
/// - Removal uses [`remove_dir_all_with_chmod`] so directories left
///   unwritable by a build script don't leak on drop.
pub struct SafeTempDir {
    dir: Option<PathBuf>,
}

impl SafeTempDir {
    /// Creates a new temporary directory using the default configuration.
    pub fn new() -> Result<Self> {
        SafeTempDirBuilder::new().build()
    }

    /// Takes ownership of an existing directory, to be removed on drop.
    pub fn take(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.as_ref().unwrap()
    }

    /// Converts into a plain [`PathBuf`]; the caller becomes responsible for
    /// removing it.
    pub fn into_path(mut self) -> PathBuf {
        self.dir.take().unwrap()
    }
}

impl Drop for SafeTempDir {
    fn drop(&mut self) {
        if let Some(dir) = &self.dir {
            let _span = info_span!("SafeTempDir::drop", dir = ?dir).entered();
            if let Err(err) = remove_dir_all_with_chmod(dir) {
                tracing::warn!("failed to remove temporary directory {dir:?}: {err:#}");
            }
        }
    }
}

pub struct SafeTempDirBuilder<'prefix, 'suffix> {
    builder: tempfile::Builder<'prefix, 'suffix>,
    base_dir: PathBuf,
}

impl<'prefix, 'suffix> SafeTempDirBuilder<'prefix, 'suffix> {
    pub fn new() -> Self {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&*DEFAULT_PREFIX);
        // §5 ("the temp-directory tree is per-process") honors $E2TMPDIR /
        // $E2_TMPDIR ahead of the system default, falling back to $TMPDIR.
        let base_dir = std::env::var_os("E2TMPDIR")
            .or_else(|| std::env::var_os("E2_TMPDIR"))
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self { builder, base_dir }
    }

    pub fn base_dir(self, dir: &Path) -> Self {
        Self {
            base_dir: dir.to_owned(),
            ..self
        }
    }

    pub fn prefix<S: AsRef<OsStr> + ?Sized>(mut self, prefix: &'prefix S) -> Self {
        self.builder.prefix(prefix);
        self
    }

    pub fn suffix<S: AsRef<OsStr> + ?Sized>(mut self, suffix: &'suffix S) -> Self {
        self.builder.suffix(suffix);
        self
    }

    pub fn build(self) -> Result<SafeTempDir> {
        let dir = self.builder.tempdir_in(self.base_dir)?;
        Ok(SafeTempDir::take(&dir.into_path()))
    }
}

impl Default for SafeTempDirBuilder<'_, '_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{create_dir, set_permissions},
        os::unix::prelude::PermissionsExt,
    };

    use super::*;

    #[test]
    fn deletes_inaccessible_dirs() -> Result<()> {
        let temp_dir = SafeTempDir::new()?;
        let path = temp_dir.path().to_owned();

        let bad_dir = path.join("bad");
        create_dir(&bad_dir)?;
        set_permissions(&bad_dir, PermissionsExt::from_mode(0o0))?;

        drop(temp_dir);

        assert!(!bad_dir.try_exists()?);
        Ok(())
    }

    #[test]
    fn is_pretty_named() -> Result<()> {
        let temp_dir = SafeTempDir::new()?;
        let name = temp_dir.path().file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("e2."), "name = {name}");
        Ok(())
    }

    #[test]
    fn honors_base_dir() -> Result<()> {
        let outer = SafeTempDir::new()?;
        let inner = SafeTempDirBuilder::new().base_dir(outer.path()).build()?;
        assert!(inner.path().starts_with(outer.path()));
        Ok(())
    }

    #[test]
    fn take_removes_on_drop() -> Result<()> {
        let temp_dir = SafeTempDir::new()?;
        let path = temp_dir.path().to_owned();
        let taken = SafeTempDir::take(&temp_dir.into_path());
        assert!(path.try_exists()?);
        drop(taken);
        assert!(!path.try_exists()?);
        Ok(())
    }
}
