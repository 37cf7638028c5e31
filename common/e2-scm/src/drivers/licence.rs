//! `licence`-source driver (§4.5 supplement): materializes the licence
//! texts of a set of other results/sources into the build tree. Fetch and
//! update are no-ops — there's nothing to check out, only to copy from
//! already-resolved licence file caches.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use e2_model::SourceSet;

use crate::ScmDriver;

/// One licence text to materialize, already resolved to a local path by the
/// caller (component H knows which licences a result/source references;
/// component F has already fetched their files).
pub struct LicenceTextEntry {
    pub licence_name: String,
    pub cached_path: std::path::PathBuf,
    pub basename: String,
}

pub struct LicenceDriver {
    pub entries: Vec<LicenceTextEntry>,
}

impl ScmDriver for LicenceDriver {
    fn display(&self) -> String {
        format!("licence ({} texts)", self.entries.len())
    }

    fn working_copy_available(&self, _working_dir: &Path) -> bool {
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
        for entry in &self.entries {
            let dest_dir = build_dir.join("licences").join(&entry.licence_name);
            fs::create_dir_all(&dest_dir)?;
            let dest = dest_dir.join(&entry.basename);
            // Licence texts are deduplicated by (licence, basename): copying
            // the same text twice for two dependents is a no-op, not an
            // error.
            if !dest.exists() {
                fs::copy(&entry.cached_path, &dest).with_context(|| {
                    format!("failed to materialize licence text at {dest:?}")
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materializes_texts_deduped_by_basename() {
        let cache = tempfile::tempdir().unwrap();
        let text_path = cache.path().join("COPYING");
        fs::write(&text_path, b"gpl text").unwrap();

        let build = tempfile::tempdir().unwrap();
        let driver = LicenceDriver {
            entries: vec![
                LicenceTextEntry {
                    licence_name: "gpl2".to_string(),
                    cached_path: text_path.clone(),
                    basename: "COPYING".to_string(),
                },
                LicenceTextEntry {
                    licence_name: "gpl2".to_string(),
                    cached_path: text_path,
                    basename: "COPYING".to_string(),
                },
            ],
        };

        driver
            .prepare_source(SourceSet::Tag, build.path(), build.path())
            .unwrap();

        assert_eq!(
            fs::read_to_string(build.path().join("licences/gpl2/COPYING")).unwrap(),
            "gpl text"
        );
    }
}
