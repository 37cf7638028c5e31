//! The linear build pipeline (component L, spec.md §4.6): twelve steps
//! from `check_buildid` through `teardown`, run once per result in the
//! order a [`e2_graph::BuildPlan`] hands back.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, ensure, Context, Result};
use e2_cache::Cache;
use e2_chroot::{ChrootController, ReservedChroot};
use e2_env::Environment;
use e2_fileref::FileRef;
use e2_hash::hash_sha256;
use e2_model::{
    BuildMode, BuildSettings, Licence, ResultDef, ScmAttrs, Source, SourceKind, SourceSet,
    WORKING_COPY_SOURCEID,
};
use e2_scm::drivers::SvnDriver;
use e2_scm::{ScmDriver, TarType};

use crate::global_config::SiteConfig;
use crate::scm::{build_driver, build_licence_driver};
use crate::tree::ProjectTree;

/// In-chroot layout, rooted at `<chroot_dir>/e2`.
mod layout {
    pub const BUILD: &str = "e2/build";
    pub const ENV: &str = "e2/env";
    pub const BUILD_SCRIPT: &str = "e2/build-script";
    pub const RESULT: &str = "e2/result";
    pub const INIT: &str = "e2/init";
}

/// The outcome of building one result: its buildid (`scratch-`-prefixed if
/// poisoned) and the path to its packed archive in `out/`. `None` only when
/// a playground stop skipped the build entirely.
pub struct BuildOutcome {
    pub result: String,
    pub buildid: String,
    pub poisoned: bool,
    pub archive_path: Option<PathBuf>,
}

pub struct BuildPipeline<'a> {
    pub tree: &'a ProjectTree,
    pub cache: &'a Cache,
    pub chroot: &'a ChrootController<'a>,
    pub site: &'a SiteConfig,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        tree: &'a ProjectTree,
        cache: &'a Cache,
        chroot: &'a ChrootController<'a>,
        site: &'a SiteConfig,
    ) -> Self {
        Self { tree, cache, chroot, site }
    }

    /// SCM working copies live under `in/<source>` (spec.md §6 persisted
    /// state layout).
    fn working_copy_dir(&self, source_name: &str) -> PathBuf {
        self.tree.root.join("in").join(source_name)
    }

    fn log_path(&self, result_name: &str) -> PathBuf {
        self.tree.root.join("log").join(format!("{result_name}.log"))
    }

    fn out_dir(&self) -> PathBuf {
        self.tree.root.join("out")
    }

    /// Builds one result end to end, given the already-computed buildids of
    /// every result it `depends` on (the caller, driving a [`BuildPlan`],
    /// guarantees those ran first).
    pub fn build_one(
        &self,
        result_name: &str,
        mode: BuildMode,
        settings: &BuildSettings,
        depend_buildids: &HashMap<String, String>,
        depend_archives: &HashMap<String, PathBuf>,
    ) -> Result<BuildOutcome> {
        let result = self
            .tree
            .results
            .get(result_name)
            .with_context(|| format!("unknown result {result_name:?}"))?;

        // Step 1: check_buildid.
        let sourceset = mode.sourceset();
        let mut resolver = SourceResolver::new(self.tree, self.cache, sourceset, settings.check_remote);
        let mut source_ids = Vec::with_capacity(result.sources.len());
        for source_name in &result.sources {
            source_ids.push(resolver.sourceid(source_name)?);
        }
        let depend_ids: Vec<String> = result
            .depends
            .iter()
            .map(|d| {
                depend_buildids
                    .get(d)
                    .cloned()
                    .with_context(|| format!("{result_name:?} depends on {d:?}, which has no buildid yet"))
            })
            .collect::<Result<_>>()?;

        let merged_env = self.merged_environment(result);
        let build_script_fileid = self.fileid_of(&result.build_script)?;
        let mut sorted_group_names = result.chroot_groups.clone();
        sorted_group_names.sort();
        let chrootgroupids = sorted_group_names
            .iter()
            .map(|name| self.chrootgroupid_of(name))
            .collect::<Result<Vec<_>>>()?;

        let projid = self.projid()?;
        let buildid = result.buildid(
            &projid,
            &merged_env.envid(),
            &chrootgroupids,
            &build_script_fileid,
            &source_ids,
            &depend_ids,
        );
        let poisoned = buildid.starts_with(e2_model::SCRATCH_PREFIX);

        if !poisoned && !settings.force_rebuild {
            if let Some(archive_path) = self.existing_archive(&buildid) {
                tracing::info!(result = result_name, buildid, "already built, skipping");
                return Ok(BuildOutcome {
                    result: result_name.to_string(),
                    buildid,
                    poisoned,
                    archive_path: Some(archive_path),
                });
            }
        }

        // Steps 2-12 run in a scratch directory. Whatever happens — success,
        // a playground stop, or a mid-pipeline error — teardown runs exactly
        // once at the end; only whether `mark_keep` was called first decides
        // if it actually removes the chroot (spec.md §4.6: any failure still
        // transitions to teardown unless `--keep`).
        let mut reserved = self.chroot.setup(result_name).context("setup_chroot failed")?;
        let steps_result = self.run_steps(
            &reserved,
            result,
            &sorted_group_names,
            sourceset,
            &merged_env,
            settings,
            depend_archives,
            result_name,
            &buildid,
            poisoned,
        );

        if settings.keep_chroot || settings.playground {
            reserved.mark_keep();
        }
        self.chroot.teardown(reserved).context("teardown failed")?;

        let archive_path = steps_result?;

        Ok(BuildOutcome {
            result: result_name.to_string(),
            buildid,
            poisoned,
            archive_path,
        })
    }

    /// Steps 2-12, factored out of [`build_one`] so every exit path
    /// (success, playground stop, error) flows through one teardown call.
    #[allow(clippy::too_many_arguments)]
    fn run_steps(
        &self,
        reserved: &ReservedChroot,
        result: &ResultDef,
        sorted_group_names: &[String],
        sourceset: SourceSet,
        merged_env: &Environment,
        settings: &BuildSettings,
        depend_archives: &HashMap<String, PathBuf>,
        result_name: &str,
        buildid: &str,
        poisoned: bool,
    ) -> Result<Option<PathBuf>> {
        self.install_chroot_groups(reserved, sorted_group_names)
            .context("install_chroot_groups failed")?;
        self.install_deps(reserved, &result.depends, depend_archives)
            .context("install_deps failed")?;
        self.install_sources(reserved, result, sourceset)
            .context("install_sources failed")?;
        self.install_init(reserved).context("install_init failed")?;
        self.install_script_and_env(reserved, result, merged_env)
            .context("install_script_and_env failed")?;
        self.chroot.fix_permissions(reserved).context("fix_permissions failed")?;

        if settings.playground {
            tracing::info!(result = result_name, "playground requested, stopping before build");
            return Ok(None);
        }

        self.run_build(reserved).context("build failed")?;

        let build_log = self.collect_build_log(reserved, result_name)?;
        // A poisoned result is packed locally like any other (so a
        // dependent result can still unpack it in install_deps) but is
        // never pushed to the results server (spec.md §8 invariant 8).
        if poisoned {
            tracing::warn!(result = result_name, buildid, "result is poisoned, not pushing to results server");
        }
        let path = self.collect_and_store(reserved, buildid, &build_log, poisoned)?;
        Ok(Some(path))
    }

    fn projid(&self) -> Result<String> {
        let default_group_ids: Vec<String> = self
            .tree
            .project
            .default_groups
            .iter()
            .map(|name| self.chrootgroupid_of(name))
            .collect::<Result<_>>()?;
        let licence_ids: Vec<String> = self
            .tree
            .licences
            .values()
            .map(|licence| self.licenceid_of(licence))
            .collect::<Result<_>>()?;
        Ok(self.tree.project.projid(&self.tree.global_env.envid(), &default_group_ids, &licence_ids))
    }

    fn chrootgroupid_of(&self, name: &str) -> Result<String> {
        let group = self
            .tree
            .chroot_groups
            .get(name)
            .with_context(|| format!("unknown chroot group {name:?}"))?;
        let fileids = group
            .files
            .iter()
            .map(|f| self.fileid_of(f))
            .collect::<Result<Vec<_>>>()?;
        group.chrootgroupid(&fileids)
    }

    fn licenceid_of(&self, licence: &Licence) -> Result<String> {
        let fileids = licence
            .files
            .iter()
            .map(|f| self.fileid_of(f))
            .collect::<Result<Vec<_>>>()?;
        licence.licenceid(&fileids)
    }

    fn fileid_of(&self, file_ref: &FileRef) -> Result<String> {
        resolve_fileid(self.tree, self.cache, file_ref)
    }

    fn merged_environment(&self, result: &ResultDef) -> Environment {
        let mut env = self.tree.global_env.clone();
        for source_name in &result.sources {
            if let Some(source) = self.tree.sources.get(source_name) {
                env = env.merged_over(&source.env);
            }
        }
        env.merged_over(&result.env)
    }

    fn existing_archive(&self, buildid: &str) -> Option<PathBuf> {
        let path = self.out_dir().join(format!("{buildid}.tar"));
        path.is_file().then_some(path)
    }

    /// Step 3: extracts every chroot group's tarballs into the reserved
    /// chroot, in the sorted order their chrootgroupids were hashed over.
    fn install_chroot_groups(&self, reserved: &ReservedChroot, sorted_group_names: &[String]) -> Result<()> {
        for name in sorted_group_names {
            let group = self
                .tree
                .chroot_groups
                .get(name)
                .with_context(|| format!("unknown chroot group {name:?}"))?;
            for file_ref in &group.files {
                let tarball = self.resolve_for_extraction(file_ref)?;
                let tar_type = TarType::detect(&file_ref.location.location)?;
                self.chroot.install_tarball(reserved, tar_type, &tarball)?;
            }
        }
        Ok(())
    }

    fn resolve_for_extraction(&self, file_ref: &FileRef) -> Result<PathBuf> {
        if file_ref.is_in_project() {
            Ok(self.tree.root.join(&file_ref.location.location))
        } else {
            let checksum = checksum_of(file_ref)?;
            self.cache
                .fetch_file_path(&file_ref.location.server, &file_ref.location.location, checksum.as_ref())
        }
    }

    /// Step 4: makes each dependency's packed result available under
    /// `e2/dep/<name>` inside the chroot, unpacked from its stored archive.
    fn install_deps(
        &self,
        reserved: &ReservedChroot,
        depends: &[String],
        depend_archives: &HashMap<String, PathBuf>,
    ) -> Result<()> {
        for dep in depends {
            let archive = depend_archives
                .get(dep)
                .with_context(|| format!("dependency {dep:?} has no stored archive to install"))?;
            let dep_dir = reserved.chroot_dir.join("e2/dep").join(dep);
            fs::create_dir_all(&dep_dir).with_context(|| format!("failed to create {dep_dir:?}"))?;

            let file = fs::File::open(archive).with_context(|| format!("failed to open {archive:?}"))?;
            tar::Archive::new(file)
                .unpack(&dep_dir)
                .with_context(|| format!("failed to unpack {archive:?} into {dep_dir:?}"))?;
            tracing::debug!(dep, dir = %dep_dir.display(), "dependency unpacked");
        }
        Ok(())
    }

    /// Step 5: fetches/updates each source's working copy and materializes
    /// it into `e2/build` inside the chroot.
    fn install_sources(&self, reserved: &ReservedChroot, result: &ResultDef, sourceset: SourceSet) -> Result<()> {
        let build_dir = reserved.chroot_dir.join(layout::BUILD);
        fs::create_dir_all(&build_dir).with_context(|| format!("failed to create {build_dir:?}"))?;

        for source_name in &result.sources {
            let source = self
                .tree
                .sources
                .get(source_name)
                .with_context(|| format!("unknown source {source_name:?}"))?;

            if let SourceKind::Licence { materialize } = &source.kind {
                let driver = build_licence_driver(self.tree, self.cache, materialize)?;
                driver.prepare_source(sourceset, Path::new(""), &build_dir)?;
                continue;
            }

            let working_dir = self.working_copy_dir(source_name);
            let driver = build_driver(self.cache, &self.tree.root, source)?;
            self.sync_working_copy(driver.as_ref(), &working_dir, source_name)?;
            driver
                .prepare_source(sourceset, &working_dir, &build_dir)
                .with_context(|| format!("failed to prepare source {source_name:?}"))?;
        }
        Ok(())
    }

    fn sync_working_copy(&self, driver: &dyn ScmDriver, working_dir: &Path, source_name: &str) -> Result<()> {
        if driver.working_copy_available(working_dir) {
            driver
                .check_workingcopy(working_dir)
                .with_context(|| format!("working copy for {source_name:?} failed its sanity check"))?;
            driver.update_source(working_dir)
        } else {
            if let Some(parent) = working_dir.parent() {
                fs::create_dir_all(parent)?;
            }
            driver.fetch_source(working_dir)
        }
    }

    /// Step 6: populates `e2/init` with the project's `proj/init/*` files,
    /// which every result sees regardless of which sources it consumes
    /// (spec.md §4.6 step 6).
    fn install_init(&self, reserved: &ReservedChroot) -> Result<()> {
        let init_dir = reserved.chroot_dir.join(layout::INIT);
        fs::create_dir_all(&init_dir).with_context(|| format!("failed to create {init_dir:?}"))?;

        let proj_init = self.tree.root.join("proj").join("init");
        if proj_init.is_dir() {
            copy_dir_contents(&proj_init, &init_dir)
                .with_context(|| format!("failed to copy {proj_init:?} into {init_dir:?}"))?;
        }
        Ok(())
    }

    /// Step 7: writes the build script and the merged environment file.
    fn install_script_and_env(&self, reserved: &ReservedChroot, result: &ResultDef, env: &Environment) -> Result<()> {
        let script_src = self.resolve_for_extraction(&result.build_script)?;
        let script_dest = reserved.chroot_dir.join(layout::BUILD_SCRIPT);
        if let Some(parent) = script_dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&script_src, &script_dest)
            .with_context(|| format!("failed to install build script at {script_dest:?}"))?;
        set_executable(&script_dest)?;

        let env_dest = reserved.chroot_dir.join(layout::ENV);
        fs::write(&env_dest, env.to_env_file()).with_context(|| format!("failed to write {env_dest:?}"))
    }

    /// Step 9: runs the build script inside the chroot.
    fn run_build(&self, reserved: &ReservedChroot) -> Result<()> {
        let result_dir = reserved.chroot_dir.join(layout::RESULT);
        fs::create_dir_all(&result_dir).with_context(|| format!("failed to create {result_dir:?}"))?;
        self.chroot.run(reserved, &[format!("/{}", layout::BUILD_SCRIPT)])
    }

    /// Copies the build's raw log out of the chroot scratch area into
    /// `log/<result>.log` (spec.md §6 persisted state layout; rotation per
    /// the global config's `logrotate` setting is handled by the caller).
    fn collect_build_log(&self, reserved: &ReservedChroot, result_name: &str) -> Result<PathBuf> {
        let raw = reserved.base_dir.join("build.log");
        if !raw.is_file() {
            fs::write(&raw, b"")?;
        }
        let dest = self.log_path(result_name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&raw, &dest).with_context(|| format!("failed to copy build log to {dest:?}"))?;
        Ok(dest)
    }

    /// Step 10-11: collect_result + store — packs `e2/result` and the
    /// build log into the content-addressed archive under this result's
    /// buildid, writes it into `out/`, and (unless poisoned) pushes it to
    /// the configured results server when writeback is enabled there.
    fn collect_and_store(&self, reserved: &ReservedChroot, buildid: &str, build_log: &Path, poisoned: bool) -> Result<PathBuf> {
        let result_dir = reserved.chroot_dir.join(layout::RESULT);
        let out_dir = self.out_dir();
        fs::create_dir_all(&out_dir).with_context(|| format!("failed to create {out_dir:?}"))?;
        let final_path = out_dir.join(format!("{buildid}.tar"));
        let tmp_path = out_dir.join(format!("{buildid}.tar.tmp"));

        crate::pack::pack_result(&result_dir, build_log, &tmp_path)?;
        e2_fileutil::publish_atomically(&tmp_path, &final_path)?;

        if !poisoned {
            if let Some(server) = &self.site.e2_server {
                if self.cache.writeback_enabled(server) {
                    let base = self.site.e2_location.as_deref().unwrap_or("");
                    let location = format!("{base}/{buildid}.tar").trim_start_matches('/').to_string();
                    self.cache
                        .push_file(&final_path, server, &location)
                        .with_context(|| format!("failed to push {final_path:?} to {server}:{location}"))?;
                }
            }
        }
        Ok(final_path)
    }
}

/// Copies `src`'s entries (not `src` itself) into `dest`, recursing into
/// subdirectories.
fn copy_dir_contents(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_entry = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_contents(&entry.path(), &dest_entry)?;
        } else {
            fs::copy(entry.path(), &dest_entry)?;
        }
    }
    Ok(())
}

fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

fn checksum_of(file_ref: &FileRef) -> Result<Option<e2_hash::FileChecksum>> {
    if let Some(sha256) = &file_ref.sha256 {
        Ok(Some(e2_hash::FileChecksum::parse_sha256(sha256)?))
    } else if let Some(sha1) = &file_ref.sha1 {
        Ok(Some(e2_hash::FileChecksum::parse_sha1(sha1)?))
    } else {
        Ok(None)
    }
}

/// Resolves a File reference's fileid, the one place both [`BuildPipeline`]
/// and [`SourceResolver`] need it. `hashupdate` entries are recomputed from
/// the actual fetched bytes first (see [`apply_hashupdate`]).
fn resolve_fileid(tree: &ProjectTree, cache: &Cache, file_ref: &FileRef) -> Result<String> {
    if file_ref.hashupdate {
        let updated = apply_hashupdate(tree, cache, file_ref)?;
        return updated.fileid(None::<fs::File>);
    }

    if file_ref.is_in_project() {
        let path = tree.root.join(&file_ref.location.location);
        if file_ref.sha1.is_some() || file_ref.sha256.is_some() {
            file_ref.fileid(None::<fs::File>)
        } else {
            let f = fs::File::open(&path).with_context(|| format!("failed to open {path:?}"))?;
            file_ref.fileid(Some(f))
        }
    } else {
        let checksum = checksum_of(file_ref)?;
        cache.fetch_file_path(&file_ref.location.server, &file_ref.location.location, checksum.as_ref())?;
        file_ref.fileid(None::<fs::File>)
    }
}

/// `hashupdate` (spec.md §9): the engine's one write-back into
/// configuration. Recomputes the sha256 of the actual bytes and, if it
/// differs from what's configured, rewrites the source config file in
/// place so future runs no longer need hashupdate to agree.
fn apply_hashupdate(tree: &ProjectTree, cache: &Cache, file_ref: &FileRef) -> Result<FileRef> {
    let path = if file_ref.is_in_project() {
        tree.root.join(&file_ref.location.location)
    } else {
        let checksum = checksum_of(file_ref)?;
        cache.fetch_file_path(&file_ref.location.server, &file_ref.location.location, checksum.as_ref())?
    };
    let f = fs::File::open(&path).with_context(|| format!("failed to open {path:?}"))?;
    let fresh_sha256 = hash_sha256(f)?;

    if file_ref.sha256.as_deref() != Some(fresh_sha256.as_str()) {
        if let Some(config_path) = &file_ref.config_path {
            e2_config::persist_checksum_field(config_path, &file_ref.location.location, "sha256", &fresh_sha256)
                .context("failed to persist hashupdate checksum")?;
        }
    }

    let mut updated = file_ref.clone();
    updated.sha256 = Some(fresh_sha256);
    Ok(updated)
}

/// Resolves sourceids, recursing through `licence`-type sources'
/// `materialize` references and memoizing as it goes (component H
/// identity resolution, driven by component J for payload resolution).
struct SourceResolver<'a> {
    tree: &'a ProjectTree,
    cache: &'a Cache,
    sourceset: SourceSet,
    check_remote: bool,
    resolving: Vec<String>,
    resolved: HashMap<String, String>,
}

impl<'a> SourceResolver<'a> {
    fn new(tree: &'a ProjectTree, cache: &'a Cache, sourceset: SourceSet, check_remote: bool) -> Self {
        Self {
            tree,
            cache,
            sourceset,
            check_remote,
            resolving: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    fn sourceid(&mut self, name: &str) -> Result<String> {
        if self.sourceset == SourceSet::WorkingCopy {
            return Ok(WORKING_COPY_SOURCEID.to_string());
        }
        if let Some(id) = self.resolved.get(name) {
            return Ok(id.clone());
        }
        ensure!(
            !self.resolving.contains(&name.to_string()),
            "materialize cycle involving source {name:?}"
        );

        let source = self
            .tree
            .sources
            .get(name)
            .with_context(|| format!("unknown source {name:?}"))?;

        self.resolving.push(name.to_string());
        let licenceids = self.licenceids_of(source)?;
        let payload = self.resolve_payload(source)?;
        let id = source.sourceid(self.sourceset, &licenceids, &payload)?;
        self.resolving.pop();

        self.resolved.insert(name.to_string(), id.clone());
        Ok(id)
    }

    fn licenceids_of(&self, source: &Source) -> Result<Vec<String>> {
        self.tree
            .source_licences(source)?
            .into_iter()
            .map(|licence| {
                let fileids = licence
                    .files
                    .iter()
                    .map(|f| self.fileid_of(f))
                    .collect::<Result<Vec<_>>>()?;
                licence.licenceid(&fileids)
            })
            .collect()
    }

    fn fileid_of(&self, file_ref: &FileRef) -> Result<String> {
        resolve_fileid(self.tree, self.cache, file_ref)
    }

    fn resolve_payload(&mut self, source: &Source) -> Result<e2_model::ResolvedPayload> {
        use e2_model::ResolvedPayload;
        match &source.kind {
            SourceKind::Files(files) => {
                let fileids = files
                    .iter()
                    .map(|(f, _)| self.fileid_of(f))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedPayload::Files { fileids })
            }
            SourceKind::Git(attrs) | SourceKind::GitRepo(attrs) => {
                let working_dir = self.tree.root.join("in").join(&source.name);
                let rev = git_rev_parse(&working_dir, attrs, self.sourceset)?;
                if self.check_remote && self.sourceset == SourceSet::Tag {
                    verify_tag_matches_remote(&attrs.location, self.cache, attrs, &rev)?;
                }
                Ok(ResolvedPayload::ScmRevision(rev))
            }
            SourceKind::Svn(attrs) => {
                let repository_url = self.cache.remote_url(&attrs.location.server, &attrs.location.location)?.to_string();
                let driver = SvnDriver {
                    repository_url,
                    branch: attrs.branch.clone(),
                    tag: attrs.tag.clone(),
                };
                Ok(ResolvedPayload::ScmRevision(driver.last_changed_rev()?))
            }
            SourceKind::Cvs(_attrs) => Ok(ResolvedPayload::Cvs),
            SourceKind::Licence { materialize } => {
                let ids = materialize.iter().map(|n| self.sourceid(n)).collect::<Result<Vec<_>>>()?;
                Ok(ResolvedPayload::LicenceSource { dependent_sourceids: ids })
            }
        }
    }
}

fn git_rev_parse(working_dir: &Path, attrs: &ScmAttrs, sourceset: SourceSet) -> Result<String> {
    let reference = match sourceset {
        SourceSet::Tag => attrs.tag.as_deref().context("git source has no tag configured")?,
        SourceSet::Branch => attrs.branch.as_deref().context("git source has no branch configured")?,
        SourceSet::WorkingCopy => unreachable!("working-copy sourceids never resolve a payload"),
    };
    let output = Command::new("git")
        .arg("-C")
        .arg(working_dir)
        .arg("rev-parse")
        .arg(reference)
        .output()
        .context("failed to run git rev-parse")?;
    ensure!(output.status.success(), "git rev-parse {reference} failed: {:?}", output.status);
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// `--check-remote` (spec.md §4.2): in tag mode, confirms the tag resolves
/// to the same commit on the remote as it does in the local working copy,
/// catching a tag that was force-moved upstream after the last fetch.
fn verify_tag_matches_remote(
    location: &e2_url::ServerLocation,
    cache: &Cache,
    attrs: &ScmAttrs,
    local_rev: &str,
) -> Result<()> {
    let tag = attrs.tag.as_deref().context("git source has no tag configured")?;
    let remote = cache.remote_url(&location.server, &location.location)?;

    let output = Command::new("git")
        .arg("ls-remote")
        .arg(remote.as_str())
        .arg(format!("refs/tags/{tag}"))
        .output()
        .context("failed to run git ls-remote")?;
    ensure!(output.status.success(), "git ls-remote {remote} failed: {:?}", output.status);

    let stdout = String::from_utf8(output.stdout)?;
    let remote_rev = stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .with_context(|| format!("tag {tag:?} not found on remote {remote}"))?;

    ensure!(
        remote_rev == local_rev,
        "tag {tag:?} resolves to {local_rev} locally but {remote_rev} on the remote"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_env::Environment as SourceEnv;
    use e2_model::{ChecksumKinds, FileAction, Project, SourceKind as SK};
    use e2_url::ServerLocation;
    use std::collections::BTreeMap;

    fn fixture_tree(root: &Path) -> ProjectTree {
        let mut sources = BTreeMap::new();
        sources.insert(
            "hello".to_string(),
            Source::new(
                "hello",
                SK::Files(vec![(FileRef::new(ServerLocation::new(".", "hello.txt")), FileAction::Copy)]),
                SourceEnv::new(),
                vec![],
            ),
        );

        ProjectTree {
            root: root.to_path_buf(),
            project: Project {
                name: "demo".to_string(),
                release_id: "v1".to_string(),
                chroot_arch: "amd64".to_string(),
                default_results: vec![],
                checksums: ChecksumKinds::default(),
                default_groups: vec![],
            },
            global_env: SourceEnv::new(),
            chroot_groups: BTreeMap::new(),
            licences: BTreeMap::new(),
            sources,
            results: BTreeMap::new(),
        }
    }

    #[test]
    fn resolver_shortcuts_to_sentinel_in_working_copy_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let tree = fixture_tree(dir.path());
        let cache = Cache::new(dir.path().join("cache"), HashMap::new());

        let mut resolver = SourceResolver::new(&tree, &cache, SourceSet::WorkingCopy, false);
        let id = resolver.sourceid("hello").unwrap();
        assert_eq!(id, WORKING_COPY_SOURCEID);
    }

    #[test]
    fn resolver_computes_a_deterministic_sourceid_outside_working_copy_mode() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let tree = fixture_tree(dir.path());
        let cache = Cache::new(dir.path().join("cache"), HashMap::new());

        let mut a = SourceResolver::new(&tree, &cache, SourceSet::Tag, false);
        let id_a = a.sourceid("hello").unwrap();
        let mut b = SourceResolver::new(&tree, &cache, SourceSet::Tag, false);
        let id_b = b.sourceid("hello").unwrap();
        assert_eq!(id_a, id_b);
        assert_ne!(id_a, WORKING_COPY_SOURCEID);
    }

    #[test]
    fn existing_archive_finds_a_previously_stored_build_but_not_a_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let tree = fixture_tree(dir.path());
        let cache = Cache::new(dir.path().join("cache"), HashMap::new());
        let helper = e2_chroot::ExternalHelper::new("true", e2_chroot::Escalation::Sudo);
        let controller = ChrootController::new(e2_chroot::ChrootBase::new(dir.path().join("chroot")), &helper);
        let site = SiteConfig::default();
        let pipeline = BuildPipeline::new(&tree, &cache, &controller, &site);

        assert!(pipeline.existing_archive("deadbeef").is_none());

        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/deadbeef.tar"), b"archive").unwrap();
        assert!(pipeline.existing_archive("deadbeef").is_some());
    }

    struct NoopHelper;
    impl e2_chroot::ChrootHelper for NoopHelper {
        fn chroot_run(&self, _base_dir: &Path, _command: &[String]) -> Result<()> {
            Ok(())
        }
        fn extract_tar(&self, _base_dir: &Path, _tar_type: e2_scm::TarType, _tarball: &Path) -> Result<()> {
            Ok(())
        }
        fn set_permissions(&self, _base_dir: &Path) -> Result<()> {
            Ok(())
        }
        fn remove_chroot(&self, base_dir: &Path) -> Result<()> {
            fs::remove_dir_all(base_dir).or_else(|e| if e.kind() == std::io::ErrorKind::NotFound { Ok(()) } else { Err(e) })?;
            Ok(())
        }
    }

    fn writeback_site_and_server(dir: &Path) -> (SiteConfig, e2_cache::ServerConfig) {
        let mut site = SiteConfig::default();
        site.e2_server = Some("results".to_string());
        site.e2_location = Some("out".to_string());
        let server = e2_cache::ServerConfig {
            url: format!("file://{}/", dir.display()).parse().unwrap(),
            cachable: false,
            cache: false,
            islocal: true,
            writeback: true,
            push_permissions: true,
        };
        (site, server)
    }

    #[test]
    fn collect_and_store_pushes_a_clean_result_but_not_a_poisoned_one() {
        let dir = tempfile::tempdir().unwrap();
        let tree = fixture_tree(dir.path());
        let push_target = tempfile::tempdir().unwrap();

        let (site, server) = writeback_site_and_server(push_target.path());
        let mut servers = HashMap::new();
        servers.insert("results".to_string(), server);
        let cache = Cache::new(dir.path().join("cache"), servers);

        let helper = NoopHelper;
        let controller = ChrootController::new(e2_chroot::ChrootBase::new(dir.path().join("chroot")), &helper);
        let pipeline = BuildPipeline::new(&tree, &cache, &controller, &site);

        let build_log = dir.path().join("build.log");
        fs::write(&build_log, b"log").unwrap();

        let reserved = controller.setup("clean-result").unwrap();
        fs::create_dir_all(reserved.chroot_dir.join(layout::RESULT)).unwrap();
        fs::write(reserved.chroot_dir.join(layout::RESULT).join("output"), b"data").unwrap();
        pipeline.collect_and_store(&reserved, "buildid-clean", &build_log, false).unwrap();
        controller.teardown(reserved).unwrap();
        assert!(push_target.path().join("out/buildid-clean.tar").exists());

        let reserved = controller.setup("poisoned-result").unwrap();
        fs::create_dir_all(reserved.chroot_dir.join(layout::RESULT)).unwrap();
        fs::write(reserved.chroot_dir.join(layout::RESULT).join("output"), b"data").unwrap();
        pipeline.collect_and_store(&reserved, "scratch-buildid-poisoned", &build_log, true).unwrap();
        controller.teardown(reserved).unwrap();
        assert!(!push_target.path().join("out/scratch-buildid-poisoned.tar").exists());
    }

    #[test]
    fn hashupdate_persists_a_recomputed_checksum_into_its_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello world").unwrap();
        let config_path = dir.path().join("source.e2s");
        std::fs::write(
            &config_path,
            r#"e2source("hello", { type = "files", file = { server = "upstream", location = "hello.txt", sha256 = "stale", hashupdate = true } })"#,
        )
        .unwrap();

        let mut file_ref = FileRef::new(ServerLocation::new("upstream", "hello.txt"));
        file_ref.sha256 = Some("stale".to_string());
        file_ref.hashupdate = true;
        file_ref.config_path = Some(config_path.clone());

        let mut servers = HashMap::new();
        servers.insert(
            "upstream".to_string(),
            e2_cache::ServerConfig {
                url: format!("file://{}/", dir.path().display()).parse().unwrap(),
                cachable: true,
                cache: true,
                islocal: true,
                writeback: false,
                push_permissions: false,
            },
        );
        let cache = Cache::new(dir.path().join("cache"), servers);
        let tree = fixture_tree(dir.path());

        resolve_fileid(&tree, &cache, &file_ref).unwrap();

        let rewritten = std::fs::read_to_string(&config_path).unwrap();
        assert!(!rewritten.contains("\"stale\""));
        assert!(rewritten.contains("location = \"hello.txt\""));
    }
}
