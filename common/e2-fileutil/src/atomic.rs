use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Moves `tmp_path` to `final_path` atomically within the same filesystem.
///
/// Component F requires that partial downloads never enter the cache: a
/// transport writes to a temporary path, and only a successful, checksum
/// verified transfer gets published here via `rename(2)`, which is atomic on
/// POSIX filesystems as long as both paths are on the same volume (both live
/// under the same server's cache subtree, so this always holds).
pub fn publish_atomically(tmp_path: &Path, final_path: &Path) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {parent:?}"))?;
    }
    fs::rename(tmp_path, final_path)
        .with_context(|| format!("failed to publish {tmp_path:?} to {final_path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_into_new_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let tmp = dir.path().join("download.tmp");
        fs::write(&tmp, b"content")?;
        let dest = dir.path().join("nested/final.txt");

        publish_atomically(&tmp, &dest)?;

        assert!(!tmp.exists());
        assert_eq!(fs::read(&dest)?, b"content");
        Ok(())
    }
}
