//! Resolves a [`Source`] into a concrete [`ScmDriver`] (component J
//! construction): looks up cached file content and remote URLs through the
//! [`Cache`], then hands the result to whichever driver matches the
//! source's `type`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use e2_cache::Cache;
use e2_fileref::FileRef;
use e2_hash::FileChecksum;
use e2_model::{Source, SourceKind};
use e2_scm::drivers::{CvsDriver, FilesDriver, FilesEntry, GitDriver, LicenceDriver, LicenceTextEntry, SvnDriver};
use e2_scm::ScmDriver;
use e2_url::ServerLocation;

use crate::tree::ProjectTree;

fn checksum_of(file_ref: &FileRef) -> Result<Option<FileChecksum>> {
    if let Some(sha256) = &file_ref.sha256 {
        Ok(Some(FileChecksum::parse_sha256(sha256)?))
    } else if let Some(sha1) = &file_ref.sha1 {
        Ok(Some(FileChecksum::parse_sha1(sha1)?))
    } else {
        Ok(None)
    }
}

/// Resolves a File reference to a local path: in-project files live next to
/// the project config and need no fetch, everything else goes through the
/// cache.
fn resolve_file(cache: &Cache, project_root: &Path, file_ref: &FileRef) -> Result<PathBuf> {
    if file_ref.is_in_project() {
        return Ok(project_root.join(&file_ref.location.location));
    }
    let checksum = checksum_of(file_ref)?;
    cache.fetch_file_path(&file_ref.location.server, &file_ref.location.location, checksum.as_ref())
}

fn resolve_remote_url(cache: &Cache, location: &ServerLocation) -> Result<String> {
    Ok(cache.remote_url(&location.server, &location.location)?.to_string())
}

fn basename_of(location: &str) -> String {
    Path::new(location)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string())
}

/// Builds the driver for every source kind except [`SourceKind::Licence`],
/// whose driver needs the full project tree rather than just its own
/// attributes — see [`build_licence_driver`].
pub fn build_driver(cache: &Cache, project_root: &Path, source: &Source) -> Result<Box<dyn ScmDriver>> {
    match &source.kind {
        SourceKind::Files(files) => {
            let entries = files
                .iter()
                .map(|(file_ref, action)| {
                    Ok(FilesEntry {
                        cached_path: resolve_file(cache, project_root, file_ref)?,
                        location: file_ref.location.location.clone(),
                        action: *action,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(FilesDriver { entries }))
        }
        SourceKind::Git(attrs) => Ok(Box::new(GitDriver {
            remote: resolve_remote_url(cache, &attrs.location)?,
            branch: attrs.branch.clone(),
            tag: attrs.tag.clone(),
            materialize_git_dir: false,
        })),
        SourceKind::GitRepo(attrs) => Ok(Box::new(GitDriver {
            remote: resolve_remote_url(cache, &attrs.location)?,
            branch: attrs.branch.clone(),
            tag: attrs.tag.clone(),
            materialize_git_dir: true,
        })),
        SourceKind::Svn(attrs) => Ok(Box::new(SvnDriver {
            repository_url: resolve_remote_url(cache, &attrs.location)?,
            branch: attrs.branch.clone(),
            tag: attrs.tag.clone(),
        })),
        SourceKind::Cvs(attrs) => Ok(Box::new(CvsDriver {
            cvsroot: attrs.cvsroot.clone(),
            module: attrs.module.clone(),
            tag: attrs
                .tag
                .clone()
                .with_context(|| format!("cvs source {:?} has no tag configured", source.name))?,
        })),
        SourceKind::Licence { .. } => {
            bail!("source {:?} is a licence source, build it with build_licence_driver", source.name)
        }
    }
}

/// Builds a [`LicenceDriver`] for a [`SourceKind::Licence`] source: each
/// name in `materialize` refers to either another source or a result
/// (spec.md §3), whose licences are resolved against the project tree's
/// licence table.
pub fn build_licence_driver(
    tree: &ProjectTree,
    cache: &Cache,
    materialize: &[String],
) -> Result<LicenceDriver> {
    let mut entries = Vec::new();
    for source_name in materialize {
        let licences = if let Some(source) = tree.sources.get(source_name) {
            tree.source_licences(source)?
        } else if let Some(result) = tree.results.get(source_name) {
            tree.result_licences(result)?
        } else {
            bail!("licence source materializes unknown source or result {source_name:?}");
        };
        for licence in licences {
            for file_ref in &licence.files {
                entries.push(LicenceTextEntry {
                    licence_name: licence.name.clone(),
                    cached_path: resolve_file(cache, &tree.root, file_ref)?,
                    basename: basename_of(&file_ref.location.location),
                });
            }
        }
    }
    Ok(LicenceDriver { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_env::Environment;
    use e2_model::{ChecksumKinds as ModelChecksumKinds, FileAction, Project, Source};
    use std::collections::HashMap;

    fn cache(root: &Path) -> Cache {
        Cache::new(root.join("cache"), HashMap::new())
    }

    #[test]
    fn files_source_resolves_in_project_paths_without_a_fetch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();

        let file_ref = FileRef::new(ServerLocation::new(".", "hello.txt"));
        let source = Source::new(
            "s1",
            SourceKind::Files(vec![(file_ref, FileAction::Copy)]),
            Environment::new(),
            vec![],
        );

        let driver = build_driver(&cache(dir.path()), dir.path(), &source).unwrap();
        assert_eq!(driver.display(), "files (1 entries)");
    }

    #[test]
    fn cvs_source_without_tag_is_rejected() {
        let attrs = e2_model::CvsAttrs {
            server: "cvs-server".to_string(),
            cvsroot: ":pserver:anon@cvs.example.com:/cvsroot".to_string(),
            module: "mod".to_string(),
            tag: None,
        };
        let source = Source::new("s1", SourceKind::Cvs(attrs), Environment::new(), vec![]);
        let dir = tempfile::tempdir().unwrap();
        let err = build_driver(&cache(dir.path()), dir.path(), &source).unwrap_err();
        assert!(err.to_string().contains("no tag configured"));
    }

    #[test]
    fn licence_source_goes_through_build_licence_driver() {
        let attrs_source = Source::new("s1", SourceKind::Licence { materialize: vec![] }, Environment::new(), vec![]);
        let dir = tempfile::tempdir().unwrap();
        let err = build_driver(&cache(dir.path()), dir.path(), &attrs_source).unwrap_err();
        assert!(err.to_string().contains("build_licence_driver"));
    }

    #[test]
    fn build_licence_driver_materializes_referenced_sources_licences() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("COPYING"), "gpl text").unwrap();

        let mut licences = std::collections::BTreeMap::new();
        licences.insert(
            "gpl2".to_string(),
            e2_model::Licence::new("gpl2", vec![FileRef::new(ServerLocation::new(".", "COPYING"))]),
        );

        let mut sources = std::collections::BTreeMap::new();
        sources.insert(
            "hello".to_string(),
            Source::new(
                "hello",
                SourceKind::Files(vec![]),
                Environment::new(),
                vec!["gpl2".to_string()],
            ),
        );

        let tree = ProjectTree {
            root: dir.path().to_path_buf(),
            project: Project {
                name: "demo".to_string(),
                release_id: "v1".to_string(),
                chroot_arch: "amd64".to_string(),
                default_results: vec![],
                checksums: ModelChecksumKinds::default(),
                default_groups: vec![],
            },
            global_env: Environment::new(),
            chroot_groups: std::collections::BTreeMap::new(),
            licences,
            sources,
            results: std::collections::BTreeMap::new(),
        };

        let driver = build_licence_driver(&tree, &cache(dir.path()), &["hello".to_string()]).unwrap();
        assert_eq!(driver.entries.len(), 1);
        assert_eq!(driver.entries[0].licence_name, "gpl2");
    }

    #[test]
    fn build_licence_driver_materializes_a_result_name_transitively() {
        use e2_model::{ResultDef, ResultKind};

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("COPYING"), "gpl text").unwrap();

        let mut licences = std::collections::BTreeMap::new();
        licences.insert(
            "gpl2".to_string(),
            e2_model::Licence::new("gpl2", vec![FileRef::new(ServerLocation::new(".", "COPYING"))]),
        );

        let mut sources = std::collections::BTreeMap::new();
        sources.insert(
            "hello".to_string(),
            Source::new(
                "hello",
                SourceKind::Files(vec![]),
                Environment::new(),
                vec!["gpl2".to_string()],
            ),
        );

        let mut results = std::collections::BTreeMap::new();
        results.insert(
            "hello-result".to_string(),
            ResultDef {
                name: "hello-result".to_string(),
                kind: ResultKind::Result,
                chroot_groups: vec![],
                depends: vec![],
                sources: vec!["hello".to_string()],
                env: Environment::new(),
                build_script: FileRef::new(ServerLocation::new(".", "build-script")),
            },
        );

        let tree = ProjectTree {
            root: dir.path().to_path_buf(),
            project: Project {
                name: "demo".to_string(),
                release_id: "v1".to_string(),
                chroot_arch: "amd64".to_string(),
                default_results: vec![],
                checksums: ModelChecksumKinds::default(),
                default_groups: vec![],
            },
            global_env: Environment::new(),
            chroot_groups: std::collections::BTreeMap::new(),
            licences,
            sources,
            results,
        };

        let driver = build_licence_driver(&tree, &cache(dir.path()), &["hello-result".to_string()]).unwrap();
        assert_eq!(driver.entries.len(), 1);
        assert_eq!(driver.entries[0].licence_name, "gpl2");
    }

    #[test]
    fn build_licence_driver_rejects_unknown_materialize_name() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ProjectTree {
            root: dir.path().to_path_buf(),
            project: Project {
                name: "demo".to_string(),
                release_id: "v1".to_string(),
                chroot_arch: "amd64".to_string(),
                default_results: vec![],
                checksums: ModelChecksumKinds::default(),
                default_groups: vec![],
            },
            global_env: Environment::new(),
            chroot_groups: std::collections::BTreeMap::new(),
            licences: std::collections::BTreeMap::new(),
            sources: std::collections::BTreeMap::new(),
            results: std::collections::BTreeMap::new(),
        };

        let err = build_licence_driver(&tree, &cache(dir.path()), &["nope".to_string()]).unwrap_err();
        assert!(err.to_string().contains("unknown source or result"));
    }
}
