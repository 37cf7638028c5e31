//! The privileged-helper contract (§4.7): a fixed four-verb wire protocol
//! that either a setuid binary or a passwordless-`sudo`-wrapped dispatcher
//! can satisfy. Everything above this trait is privilege-agnostic.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use e2_scm::TarType;

/// Marker file a base directory must contain before the helper will act on
/// it (§4.7, §8 invariant 7).
pub const SENTINEL_FILE: &str = "e2factory-chroot";

/// The four operations the privileged helper performs on our behalf. A
/// trait (rather than a concrete `Command` builder) lets the build pipeline
/// depend on this without shelling out in tests.
pub trait ChrootHelper {
    fn chroot_run(&self, base_dir: &Path, command: &[String]) -> Result<()>;
    fn extract_tar(&self, base_dir: &Path, tar_type: TarType, tarball: &Path) -> Result<()>;
    fn set_permissions(&self, base_dir: &Path) -> Result<()>;
    fn remove_chroot(&self, base_dir: &Path) -> Result<()>;
}

/// How the helper binary gets its elevated privileges. §4.7 allows either a
/// setuid-root binary invoked directly, or a `sudo`-wrapped dispatcher
/// configured per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Setuid,
    Sudo,
}

/// Invokes the real `e2-chroot-helper` binary per the wire protocol: argv
/// `[verb, base_dir, extra...]`.
pub struct ExternalHelper {
    helper_path: PathBuf,
    escalation: Escalation,
}

impl ExternalHelper {
    pub fn new(helper_path: impl Into<PathBuf>, escalation: Escalation) -> Self {
        Self {
            helper_path: helper_path.into(),
            escalation,
        }
    }

    fn command(&self, verb: &str, base_dir: &Path, extra: &[String]) -> Command {
        let mut cmd = match self.escalation {
            Escalation::Setuid => Command::new(&self.helper_path),
            Escalation::Sudo => {
                let mut cmd = Command::new("sudo");
                cmd.arg(&self.helper_path);
                cmd
            }
        };
        cmd.arg(verb).arg(base_dir);
        cmd.args(extra);
        cmd
    }
}

impl ChrootHelper for ExternalHelper {
    fn chroot_run(&self, base_dir: &Path, command: &[String]) -> Result<()> {
        let mut cmd = self.command("chroot_2_3", base_dir, command);
        e2_signal::run_and_check(&mut cmd)
    }

    fn extract_tar(&self, base_dir: &Path, tar_type: TarType, tarball: &Path) -> Result<()> {
        let extra = vec![
            tar_type.helper_verb().to_string(),
            tarball.display().to_string(),
        ];
        let mut cmd = self.command("extract_tar_2_3", base_dir, &extra);
        e2_signal::run_and_check(&mut cmd)
    }

    fn set_permissions(&self, base_dir: &Path) -> Result<()> {
        let mut cmd = self.command("set_permissions_2_3", base_dir, &[]);
        e2_signal::run_and_check(&mut cmd)
    }

    fn remove_chroot(&self, base_dir: &Path) -> Result<()> {
        let mut cmd = self.command("remove_chroot_2_3", base_dir, &[]);
        e2_signal::run_and_check(&mut cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setuid_command_omits_sudo() {
        let helper = ExternalHelper::new("/usr/libexec/e2-chroot-helper", Escalation::Setuid);
        let cmd = helper.command("set_permissions_2_3", Path::new("/tmp/base"), &[]);
        assert_eq!(cmd.get_program(), "/usr/libexec/e2-chroot-helper");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["set_permissions_2_3", "/tmp/base"]);
    }

    #[test]
    fn sudo_command_prepends_sudo() {
        let helper = ExternalHelper::new("/usr/libexec/e2-chroot-helper", Escalation::Sudo);
        let cmd = helper.command("remove_chroot_2_3", Path::new("/tmp/base"), &[]);
        assert_eq!(cmd.get_program(), "sudo");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec![
                "/usr/libexec/e2-chroot-helper",
                "remove_chroot_2_3",
                "/tmp/base"
            ]
        );
    }
}
