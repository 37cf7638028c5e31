//! The `e2` CLI: `build`, `fetch-sources`, `ls-project` (spec.md §6).

mod dsl;
mod global_config;
mod tree;
mod scm;
mod pipeline;
mod pack;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use e2_chroot::{ChrootBase, ChrootController, Escalation, ExternalHelper};
use e2_cliutil::{cli_main, LogLevelArgs, LoggingConfig};
use e2_graph::DependencyGraph;
use e2_model::{BuildMode, BuildSet, BuildSettings};

use global_config::GlobalConfig;
use tree::ProjectTree;

#[derive(Parser, Debug)]
#[clap(
    about = "Builds reproducible results from an e2 project tree.",
    author,
    version
)]
struct Cli {
    /// Path to the project root. Defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Overrides the global config file search order (spec.md §6).
    #[arg(long, global = true)]
    e2_config: Option<PathBuf>,

    #[arg(long = "enable-writeback", global = true, value_name = "SERVER")]
    enable_writeback: Vec<String>,

    #[arg(long = "disable-writeback", global = true, value_name = "SERVER")]
    disable_writeback: Vec<String>,

    #[command(subcommand)]
    verb: Verb,

    #[command(flatten)]
    levels: LogLevelArgs,
}

#[derive(Subcommand, Debug)]
enum Verb {
    /// Builds one or more results.
    Build {
        results: Vec<String>,
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value = "tag")]
        build_mode: BuildModeArg,
        #[arg(long)]
        release: bool,
        #[arg(long)]
        tag: bool,
        #[arg(long)]
        branch: bool,
        #[arg(long = "working-copy")]
        working_copy: bool,
        #[arg(long = "wc-mode", value_delimiter = ',')]
        wc_mode: Vec<String>,
        #[arg(long = "branch-mode", value_delimiter = ',')]
        branch_mode: Vec<String>,
        #[arg(long)]
        check: bool,
        #[arg(long)]
        check_remote: bool,
        #[arg(long)]
        playground: bool,
        #[arg(long)]
        keep: bool,
        #[arg(long)]
        force_rebuild: bool,
        #[arg(long)]
        buildid: bool,
    },
    /// Fetches or refreshes source working copies.
    #[command(name = "fetch-sources")]
    FetchSources {
        #[arg(long)]
        fetch: bool,
        #[arg(long)]
        update: bool,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        scm: bool,
        #[arg(long)]
        files: bool,
        #[arg(long)]
        git: bool,
        #[arg(long)]
        svn: bool,
        #[arg(long)]
        cvs: bool,
        #[arg(long)]
        gitrepo: bool,
        #[arg(long = "source", value_delimiter = ',')]
        source: Vec<String>,
        #[arg(long = "result", value_delimiter = ',')]
        result: Vec<String>,
        #[arg(long = "chroot", value_delimiter = ',')]
        chroot: Vec<String>,
    },
    /// Prints the resolved project tree.
    #[command(name = "ls-project")]
    LsProject {
        #[arg(long)]
        all: bool,
        #[arg(long)]
        dot: bool,
        #[arg(long = "dot-sources")]
        dot_sources: bool,
        #[arg(long)]
        swap: bool,
        #[arg(long)]
        chroot: bool,
        #[arg(long)]
        env: bool,
        #[arg(long)]
        unused: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum BuildModeArg {
    Release,
    Tag,
    Branch,
    #[value(name = "working-copy")]
    WorkingCopy,
}

impl From<BuildModeArg> for BuildMode {
    fn from(arg: BuildModeArg) -> Self {
        match arg {
            BuildModeArg::Release => BuildMode::Release,
            BuildModeArg::Tag => BuildMode::Tag,
            BuildModeArg::Branch => BuildMode::Branch,
            BuildModeArg::WorkingCopy => BuildMode::WorkingCopy,
        }
    }
}

fn resolve_writeback(config: &mut GlobalConfig, enable: &[String], disable: &[String]) {
    for server in enable {
        if let Some(entry) = config.servers.get_mut(server) {
            entry.writeback = true;
        }
    }
    for server in disable {
        if let Some(entry) = config.servers.get_mut(server) {
            entry.writeback = false;
        }
    }
}

const CHROOT_HELPER_TOOL: &str = "e2-chroot-helper";

/// Resolves the chroot helper's path from the global config's `[tools.e2-chroot-helper]`
/// entry, falling back to the name alone so it is looked up on `$PATH`.
fn helper_path(config: &GlobalConfig) -> Result<PathBuf> {
    match config.tools.get(CHROOT_HELPER_TOOL) {
        Some(tool) if !tool.enabled => {
            bail!("tool {CHROOT_HELPER_TOOL:?} is disabled in the global config")
        }
        Some(tool) => Ok(tool
            .path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CHROOT_HELPER_TOOL))),
        None => Ok(PathBuf::from(CHROOT_HELPER_TOOL)),
    }
}

fn run_build(
    tree: &ProjectTree,
    cache: &e2_cache::Cache,
    config: &GlobalConfig,
    results: &[String],
    all: bool,
    default_mode: BuildMode,
    wc_mode: &[String],
    branch_mode: &[String],
    settings: BuildSettings,
) -> Result<()> {
    let roots: Vec<String> = if all {
        tree.project.default_results.clone()
    } else if results.is_empty() {
        tree.project.default_results.clone()
    } else {
        results.to_vec()
    };
    if roots.is_empty() {
        bail!("no results selected: pass result names, --all, or set default_results in proj/config");
    }

    let mut graph = DependencyGraph::new();
    for result in tree.results.values() {
        graph.add_result(result.name.clone(), result.depends.clone());
    }
    let plan = graph.build_plan(&roots)?;

    let mut build_set = BuildSet::new();
    for name in &plan.order {
        let mode = if wc_mode.iter().any(|r| r == name) {
            BuildMode::WorkingCopy
        } else if branch_mode.iter().any(|r| r == name) {
            BuildMode::Branch
        } else {
            default_mode
        };
        build_set.push(name.clone(), mode, settings.clone());
    }

    let helper = ExternalHelper::new(helper_path(config)?, Escalation::Sudo);
    let chroot_base = ChrootBase::new(
        std::env::var_os("E2_CHROOT_BASE")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("e2-chroot")),
    );
    let controller = ChrootController::new(chroot_base, &helper);
    let pipeline = pipeline::BuildPipeline::new(tree, cache, &controller, &config.site);

    let mut buildids: Vec<(String, String)> = Vec::new();
    let mut depend_buildids = std::collections::HashMap::new();
    let mut depend_archives = std::collections::HashMap::new();
    for name in &plan.order {
        let mode = build_set
            .mode_for(name)
            .with_context(|| format!("no build mode resolved for {name:?}"))?;
        let entry_settings = build_set
            .entries
            .iter()
            .find(|e| &e.result == name)
            .map(|e| e.settings.clone())
            .unwrap_or_default();
        let outcome = pipeline.build_one(name, mode, &entry_settings, &depend_buildids, &depend_archives)?;
        tracing::info!(result = %outcome.result, buildid = %outcome.buildid, poisoned = outcome.poisoned, "built");
        depend_buildids.insert(name.clone(), outcome.buildid.clone());
        if let Some(archive) = &outcome.archive_path {
            depend_archives.insert(name.clone(), archive.clone());
        }
        buildids.push((name.clone(), outcome.buildid));
    }
    e2_graph::detect_buildid_collisions(&buildids)?;
    Ok(())
}

fn run_fetch_sources(tree: &ProjectTree, cache: &e2_cache::Cache, names: &[String]) -> Result<()> {
    let targets: Vec<&String> = if names.is_empty() {
        tree.sources.keys().collect()
    } else {
        names.iter().collect()
    };
    for name in targets {
        let source = tree
            .sources
            .get(name)
            .with_context(|| format!("unknown source {name:?}"))?;
        if matches!(source.kind, e2_model::SourceKind::Licence { .. }) {
            continue;
        }
        let driver = scm::build_driver(cache, &tree.root, source)?;
        let working_dir = tree.root.join("in").join(name);
        if driver.working_copy_available(&working_dir) {
            driver.check_workingcopy(&working_dir)?;
            driver.update_source(&working_dir)?;
            tracing::info!(source = %name, "updated");
        } else {
            std::fs::create_dir_all(&tree.root.join("in"))?;
            driver.fetch_source(&working_dir)?;
            tracing::info!(source = %name, "fetched");
        }
    }
    Ok(())
}

fn run_ls_project(tree: &ProjectTree, show_env: bool, show_chroot: bool) -> Result<()> {
    println!("project: {} ({})", tree.project.name, tree.project.release_id);
    println!("results:");
    for (name, result) in &tree.results {
        println!("  {name} [{}] depends={:?} sources={:?}", result.kind.as_str(), result.depends, result.sources);
    }
    println!("sources:");
    for (name, source) in &tree.sources {
        println!("  {name} [{}]", source.kind.as_str());
    }
    if show_chroot {
        println!("chroot groups:");
        for (name, group) in &tree.chroot_groups {
            println!("  {name} (default={}) files={}", group.default_member, group.files.len());
        }
    }
    if show_env {
        println!("global env:");
        for (key, value) in tree.global_env.iter() {
            println!("  {key}={value}");
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let mut config = global_config::load(cli.e2_config.as_deref())?;
    resolve_writeback(&mut config, &cli.enable_writeback, &cli.disable_writeback);

    let tree = ProjectTree::load(&cli.project)?;
    let servers = config.resolve_servers()?;
    let cache_root = config
        .cache
        .path
        .clone()
        .unwrap_or_else(|| cli.project.join(".e2/cache"));
    let cache = e2_cache::Cache::new(cache_root, servers);

    match cli.verb {
        Verb::Build {
            results,
            all,
            build_mode,
            release,
            tag,
            branch,
            working_copy,
            wc_mode,
            branch_mode,
            check: _,
            check_remote,
            playground,
            keep,
            force_rebuild,
            buildid: _,
        } => {
            let default_mode = if release {
                BuildMode::Release
            } else if tag {
                BuildMode::Tag
            } else if branch {
                BuildMode::Branch
            } else if working_copy {
                BuildMode::WorkingCopy
            } else {
                build_mode.into()
            };
            let settings = BuildSettings {
                force_rebuild,
                keep_chroot: keep,
                playground,
                check_remote,
            };
            run_build(&tree, &cache, &config, &results, all, default_mode, &wc_mode, &branch_mode, settings)
        }
        Verb::FetchSources { source, .. } => run_fetch_sources(&tree, &cache, &source),
        Verb::LsProject { env, chroot, .. } => run_ls_project(&tree, env, chroot),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match LoggingConfig::new(&cli.levels) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("FATAL: failed to set up logging: {err:?}");
            return ExitCode::FAILURE;
        }
    };
    cli_main(|| run(cli), config)
}
