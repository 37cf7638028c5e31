//! Project tree loader (component H construction): walks the persisted
//! project layout (spec.md §5) and turns the evaluated config trees into the
//! typed `e2-model` values the rest of the pipeline consumes.
//!
//! Layout walked:
//! - `proj/config`         — one `e2project` call
//! - `proj/env`            — the global environment overlay, with inclusion
//! - `proj/chroot/<name>/config`   — one `e2chroot` call per group
//! - `proj/licences/<name>/config` — one `e2licence` call per licence
//! - `src/<path>/config`   — one `e2source` call per source
//! - `res/<path>/config` + `res/<path>/build-script` — one `e2result` call
//!   per result, plus its build script

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use e2_config::{load_entity_file, load_env_tree};
use e2_env::Environment;
use e2_fileref::FileRef;
use e2_model::{
    augment_with_defaults, ChecksumKinds, ChrootGroup, CvsAttrs, FileAction, Licence, Project,
    ResultDef, ResultKind, ScmAttrs, Source, SourceKind,
};
use e2_url::ServerLocation;

use crate::dsl::{dict_list_field, env_field, file_ref_from_dict, opt_str_field, str_field, str_list_field, Dict};

pub struct ProjectTree {
    pub root: PathBuf,
    pub project: Project,
    pub global_env: Environment,
    pub chroot_groups: BTreeMap<String, ChrootGroup>,
    pub licences: BTreeMap<String, Licence>,
    pub sources: BTreeMap<String, Source>,
    pub results: BTreeMap<String, ResultDef>,
}

impl ProjectTree {
    pub fn load(root: &Path) -> Result<Self> {
        let (project_entry, _diag) = load_entity_file(&root.join("proj/config"))?;
        ensure!(project_entry.builder == "e2project", "proj/config must call e2project(), found {}", project_entry.builder);
        let name = project_entry
            .name
            .clone()
            .context("proj/config's e2project() call needs a name argument")?;
        let table = project_entry.table.as_dict().context("e2project's argument must be a table")?;
        let project = build_project(&name, table)?;

        let global_env = load_env_tree(root)?;
        let chroot_groups = load_chroot_groups(&root.join("proj/chroot"), &project)?;
        let licences = load_licences(&root.join("proj/licences"))?;
        let sources = load_sources(&root.join("src"))?;
        let results = load_results(&root.join("res"), &project)?;

        Ok(Self {
            root: root.to_path_buf(),
            project,
            global_env,
            chroot_groups,
            licences,
            sources,
            results,
        })
    }

    /// Looks up every licence name a source references, resolved to its
    /// full [`Licence`] value, preserving the source's declaration order.
    pub fn source_licences(&self, source: &Source) -> Result<Vec<&Licence>> {
        source
            .licences
            .iter()
            .map(|name| self.licences.get(name).with_context(|| format!("unknown licence {name:?}")))
            .collect()
    }

    /// A result has no `licences` list of its own (spec.md §3); its licence
    /// set is the union, in declaration order and deduplicated by name, of
    /// every source it consumes.
    pub fn result_licences(&self, result: &ResultDef) -> Result<Vec<&Licence>> {
        let mut seen = std::collections::HashSet::new();
        let mut licences = Vec::new();
        for source_name in &result.sources {
            let source = self
                .sources
                .get(source_name)
                .with_context(|| format!("unknown source {source_name:?}"))?;
            for licence in self.source_licences(source)? {
                if seen.insert(licence.name.clone()) {
                    licences.push(licence);
                }
            }
        }
        Ok(licences)
    }
}

fn build_project(name: &str, table: &Dict) -> Result<Project> {
    let release_id = str_field(table, "release_id")?.to_string();
    let chroot_arch = opt_str_field(table, "chroot_arch")?.unwrap_or("").to_string();
    let default_results = str_list_field(table, "default_results")?;
    let default_groups = str_list_field(table, "chroot_groups")?;
    let checksum_kinds = str_list_field(table, "checksums")?;
    let checksums = ChecksumKinds {
        sha1: checksum_kinds.iter().any(|k| k == "sha1"),
        sha256: checksum_kinds.iter().any(|k| k == "sha256"),
    };
    Ok(Project {
        name: name.to_string(),
        release_id,
        chroot_arch,
        default_results,
        checksums,
        default_groups,
    })
}

/// Finds every `config` file at exactly one directory level under `base`,
/// returning `(entity_name, config_path)` pairs sorted by name so callers
/// get a deterministic iteration order.
fn immediate_entity_dirs(base: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(base).with_context(|| format!("failed to read {base:?}"))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let config_path = entry.path().join("config");
        if config_path.is_file() {
            let name = entry.file_name().to_string_lossy().into_owned();
            found.push((name, config_path));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Like [`immediate_entity_dirs`] but recurses, for `src/` and `res/` trees
/// whose entity names may be nested paths (`src/toolchain/gcc/config`).
fn nested_entity_dirs(base: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(base) {
        let entry = entry.with_context(|| format!("failed to walk {base:?}"))?;
        if entry.file_name() != "config" || !entry.file_type().is_file() {
            continue;
        }
        let parent = entry.path().parent().context("config file has no parent directory")?;
        let rel = parent
            .strip_prefix(base)
            .with_context(|| format!("{parent:?} is not under {base:?}"))?;
        let name = rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
        found.push((name, entry.path().to_path_buf()));
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

fn load_chroot_groups(base: &Path, project: &Project) -> Result<BTreeMap<String, ChrootGroup>> {
    let mut groups = BTreeMap::new();
    for (name, config_path) in immediate_entity_dirs(base)? {
        let (entry, _diag) = load_entity_file(&config_path)?;
        ensure!(entry.builder == "e2chroot", "{config_path:?} must call e2chroot()");
        let table = entry.table.as_dict().context("e2chroot's argument must be a table")?;
        let files = dict_list_field(table, "groups")?
            .into_iter()
            .map(|dict| file_ref_from_dict(dict, &config_path))
            .collect::<Result<Vec<FileRef>>>()?;
        let default_member = project.default_groups.iter().any(|g| g == &name);
        groups.insert(name.clone(), ChrootGroup::new(name, default_member, files));
    }
    Ok(groups)
}

fn load_licences(base: &Path) -> Result<BTreeMap<String, Licence>> {
    let mut licences = BTreeMap::new();
    for (name, config_path) in immediate_entity_dirs(base)? {
        let (entry, _diag) = load_entity_file(&config_path)?;
        ensure!(entry.builder == "e2licence", "{config_path:?} must call e2licence()");
        let table = entry.table.as_dict().context("e2licence's argument must be a table")?;
        let files = dict_list_field(table, "file")?
            .into_iter()
            .map(|dict| file_ref_from_dict(dict, &config_path))
            .collect::<Result<Vec<FileRef>>>()?;
        licences.insert(name.clone(), Licence::new(name, files));
    }
    Ok(licences)
}

fn load_sources(base: &Path) -> Result<BTreeMap<String, Source>> {
    let mut sources = BTreeMap::new();
    for (name, config_path) in nested_entity_dirs(base)? {
        let (entry, _diag) = load_entity_file(&config_path)?;
        ensure!(entry.builder == "e2source", "{config_path:?} must call e2source()");
        let table = entry.table.as_dict().context("e2source's argument must be a table")?;
        let source = build_source(&name, table, &config_path)?;
        sources.insert(name, source);
    }
    Ok(sources)
}

fn build_source(name: &str, table: &Dict, config_path: &Path) -> Result<Source> {
    let type_name = str_field(table, "type")?;
    let env = env_field(table, "env")?;
    let licences = str_list_field(table, "licences")?;

    let kind = match type_name {
        "files" => {
            let files = dict_list_field(table, "file")?
                .into_iter()
                .map(|entry| {
                    let action = match opt_str_field(entry, "action")?.unwrap_or("unpack") {
                        "unpack" => FileAction::Unpack,
                        "copy" => FileAction::Copy,
                        "patch" => FileAction::Patch,
                        other => bail!("source {name:?}: unknown file action {other:?}"),
                    };
                    Ok((file_ref_from_dict(entry, config_path)?, action))
                })
                .collect::<Result<Vec<_>>>()?;
            SourceKind::Files(files)
        }
        "git" | "gitrepo" => build_git_source_kind(name, table, type_name == "gitrepo")?,
        "svn" => {
            let server = str_field(table, "server")?;
            let location = str_field(table, "location")?;
            let branch = opt_str_field(table, "branch")?.map(str::to_string);
            let tag = opt_str_field(table, "tag")?.map(str::to_string);
            let working_dir = PathBuf::from(opt_str_field(table, "working")?.unwrap_or(name));
            SourceKind::Svn(ScmAttrs {
                location: ServerLocation::new(server, location),
                branch,
                tag,
                working_dir,
            })
        }
        "cvs" => {
            let server = str_field(table, "server")?.to_string();
            let cvsroot = str_field(table, "cvsroot")?.to_string();
            let module = str_field(table, "module")?.to_string();
            let tag = opt_str_field(table, "tag")?.map(str::to_string);
            SourceKind::Cvs(CvsAttrs { server, cvsroot, module, tag })
        }
        "licence" => {
            let materialize = str_list_field(table, "materialize")?;
            SourceKind::Licence { materialize }
        }
        other => bail!("source {name:?}: unknown type {other:?}"),
    };

    Ok(Source::new(name, kind, env, licences))
}

fn build_git_source_kind(name: &str, table: &Dict, is_gitrepo: bool) -> Result<SourceKind> {
    let server = str_field(table, "server")?;
    let location = str_field(table, "location")?;
    let branch = opt_str_field(table, "branch")?.map(str::to_string);
    let tag = opt_str_field(table, "tag")?.map(str::to_string);
    let working_dir = PathBuf::from(opt_str_field(table, "working")?.unwrap_or(name));
    let attrs = ScmAttrs {
        location: ServerLocation::new(server, location),
        branch,
        tag,
        working_dir,
    };
    Ok(if is_gitrepo { SourceKind::GitRepo(attrs) } else { SourceKind::Git(attrs) })
}

fn load_results(base: &Path, project: &Project) -> Result<BTreeMap<String, ResultDef>> {
    let mut results = BTreeMap::new();
    for (name, config_path) in nested_entity_dirs(base)? {
        let (entry, _diag) = load_entity_file(&config_path)?;
        ensure!(entry.builder == "e2result", "{config_path:?} must call e2result()");
        let table = entry.table.as_dict().context("e2result's argument must be a table")?;

        let kind = match opt_str_field(table, "type")?.unwrap_or("result") {
            "result" => ResultKind::Result,
            "collect_project" => ResultKind::CollectProject,
            other => bail!("result {name:?}: unknown type {other:?}"),
        };
        let declared_groups = str_list_field(table, "chroot")?;
        let chroot_groups = augment_with_defaults(&declared_groups, &project.default_groups);
        let depends = str_list_field(table, "depends")?;
        let sources = str_list_field(table, "sources")?;
        let env = env_field(table, "env")?;

        let script_path = config_path.with_file_name("build-script");
        ensure!(script_path.is_file(), "result {name:?} has no build-script at {script_path:?}");
        let build_script = FileRef::new(ServerLocation::new(".", format!("res/{name}/build-script")));

        results.insert(
            name.clone(),
            ResultDef {
                name,
                kind,
                chroot_groups,
                depends,
                sources,
                env,
                build_script,
            },
        );
    }
    Ok(results)
}
