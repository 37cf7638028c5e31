//! Privileged verb dispatcher for chroot construction (§4.7). Runs setuid
//! root, or under a passwordless `sudo` per `e2-chroot::Escalation::Sudo`.
//!
//! Accepts exactly one verb per invocation and refuses to touch any
//! directory lacking the `e2factory-chroot` sentinel — the sentinel check
//! happens after argv parsing but before any privileged action, so a caller
//! can never trick us into operating on an arbitrary path.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use e2_cliutil::{cli_main, LogLevelArgs, LoggingConfig};

const SENTINEL_FILE: &str = "e2factory-chroot";

#[derive(Parser, Debug)]
#[clap(
    about = "Privileged chroot verb dispatcher invoked by the e2 build pipeline.",
    author,
    version
)]
struct Cli {
    #[command(subcommand)]
    verb: Verb,

    #[command(flatten)]
    levels: LogLevelArgs,
}

#[derive(Subcommand, Debug)]
enum Verb {
    /// Runs `command` inside `<base_dir>/chroot`.
    #[command(name = "chroot_2_3")]
    Chroot {
        base_dir: PathBuf,
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Extracts an archive of `tar_type` (`tar`, `tar.gz`, `tar.bz2`,
    /// `tar.xz`) into `<base_dir>/chroot`.
    #[command(name = "extract_tar_2_3")]
    ExtractTar {
        base_dir: PathBuf,
        tar_type: String,
        tarball: PathBuf,
    },
    /// Recursively chowns `<base_dir>` to root:root.
    #[command(name = "set_permissions_2_3")]
    SetPermissions { base_dir: PathBuf },
    /// Recursively removes `<base_dir>`.
    #[command(name = "remove_chroot_2_3")]
    RemoveChroot { base_dir: PathBuf },
}

fn require_sentinel(base_dir: &Path) -> Result<()> {
    ensure!(
        base_dir.join(SENTINEL_FILE).is_file(),
        "refusing to operate on {base_dir:?}: missing {SENTINEL_FILE} sentinel"
    );
    Ok(())
}

/// Strips the caller's environment before exec'ing the underlying tool, so
/// nothing the unprivileged side set leaks into a root-owned process.
fn privileged_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_clear();
    cmd
}

fn tar_decompress_flag(tar_type: &str) -> Result<Option<&'static str>> {
    match tar_type {
        "tar" => Ok(None),
        "tar.gz" => Ok(Some("-z")),
        "tar.bz2" => Ok(Some("-j")),
        "tar.xz" => Ok(Some("-J")),
        other => anyhow::bail!("unknown tar type {other:?}"),
    }
}

fn run_verb(verb: Verb) -> Result<()> {
    match verb {
        Verb::Chroot { base_dir, command } => {
            require_sentinel(&base_dir)?;
            let chroot_dir = base_dir.join("chroot");
            let mut cmd = privileged_command("chroot");
            cmd.arg(&chroot_dir).args(&command);
            let status = cmd.status().context("failed to exec chroot")?;
            ensure!(status.success(), "chroot exited with {status}");
        }
        Verb::ExtractTar {
            base_dir,
            tar_type,
            tarball,
        } => {
            require_sentinel(&base_dir)?;
            let chroot_dir = base_dir.join("chroot");
            let flag = tar_decompress_flag(&tar_type)?;
            let mut cmd = privileged_command("tar");
            cmd.arg("-x").arg("-f").arg(&tarball).arg("-C").arg(&chroot_dir);
            if let Some(flag) = flag {
                cmd.arg(flag);
            }
            let status = cmd.status().context("failed to exec tar")?;
            ensure!(status.success(), "tar exited with {status}");
        }
        Verb::SetPermissions { base_dir } => {
            require_sentinel(&base_dir)?;
            let mut cmd = privileged_command("chown");
            cmd.arg("-R").arg("root:root").arg(&base_dir);
            let status = cmd.status().context("failed to exec chown")?;
            ensure!(status.success(), "chown exited with {status}");
        }
        Verb::RemoveChroot { base_dir } => {
            require_sentinel(&base_dir)?;
            let mut cmd = privileged_command("rm");
            cmd.arg("-rf").arg("--").arg(&base_dir);
            let status = cmd.status().context("failed to exec rm")?;
            ensure!(status.success(), "rm exited with {status}");
        }
    }
    Ok(())
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
    cli_main(|| run_verb(cli.verb), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tarball_without_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let err = require_sentinel(dir.path()).unwrap_err();
        assert!(err.to_string().contains("sentinel"));
    }

    #[test]
    fn accepts_directory_with_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SENTINEL_FILE), b"").unwrap();
        require_sentinel(dir.path()).unwrap();
    }

    #[test]
    fn decompress_flag_matches_tar_type() {
        assert_eq!(tar_decompress_flag("tar").unwrap(), None);
        assert_eq!(tar_decompress_flag("tar.gz").unwrap(), Some("-z"));
        assert_eq!(tar_decompress_flag("tar.bz2").unwrap(), Some("-j"));
        assert_eq!(tar_decompress_flag("tar.xz").unwrap(), Some("-J"));
        assert!(tar_decompress_flag("zip").is_err());
    }
}
