use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::Result;

/// Removes a directory tree, first making every entry writable.
///
/// Build scripts and extracted chroot-group tarballs can leave files and
/// directories with restrictive permissions (including `0o000`); a plain
/// `remove_dir_all` would fail on those. We walk the tree bottom-up, chmod
/// each entry to `0o700`/`0o600`, then remove it directly rather than
/// re-invoking `remove_dir_all` so a single walk suffices.
pub fn remove_dir_all_with_chmod(path: &Path) -> Result<()> {
    if !path.try_exists()? {
        return Ok(());
    }
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        fs::remove_file(path)?;
        return Ok(());
    }
    if !metadata.is_dir() {
        let mut perms = metadata.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
        fs::remove_file(path)?;
        return Ok(());
    }

    let mut perms = metadata.permissions();
    perms.set_mode(0o700);
    fs::set_permissions(path, perms)?;

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        remove_dir_all_with_chmod(&entry.path())?;
    }
    fs::remove_dir(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    #[test]
    fn removes_readonly_tree() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested)?;
        let file = nested.join("f");
        fs::write(&file, b"x")?;
        fs::set_permissions(&file, fs::Permissions::from_mode(0o000))?;
        fs::set_permissions(&nested, fs::Permissions::from_mode(0o000))?;

        remove_dir_all_with_chmod(dir.path())?;
        assert!(!dir.path().exists());
        Ok(())
    }

    #[test]
    fn missing_path_is_a_no_op() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("does-not-exist");
        remove_dir_all_with_chmod(&missing)?;
        Ok(())
    }
}
