//! Provides functions common to all `e2` binaries: CLI entry-point wiring,
//! log-level flag parsing, and tracing/logging setup (component O).

mod levels;
mod logging;

pub use levels::LogLevelArgs;
pub use logging::{LogGuard, LoggingConfig};

use itertools::Itertools;
use std::{
    ffi::OsStr,
    fmt::Debug,
    process::{ExitCode, Termination},
};

use anyhow::Result;

/// Wraps a CLI main function with the common startup/cleanup logic: sets up
/// logging, logs the command line, and maps the top-level result to an exit
/// code following the POSIX convention (0 on success, nonzero on failure;
/// signal-induced aborts are handled separately by `e2-signal` and exit with
/// `128+signo` before this ever runs).
pub fn cli_main<F, T, E>(main: F, config: LoggingConfig) -> ExitCode
where
    F: FnOnce() -> Result<T, E>,
    T: Termination,
    E: Debug,
{
    let _log_guard = config.setup().expect("failed to set up logging");
    log_current_command_line();

    match main() {
        Err(error) => {
            eprintln!("FATAL: {}: {:?}", current_process_name(), error);
            ExitCode::FAILURE
        }
        Ok(value) => value.report(),
    }
}

/// Logs the command line of the current process, escaped for shell re-entry.
pub fn log_current_command_line() {
    let escaped = std::env::args()
        .map(|s| shell_escape::escape(s.into()))
        .join(" ");
    tracing::info!("COMMAND: {}", escaped);
}

pub(crate) fn current_process_name() -> String {
    std::env::current_exe()
        .unwrap_or_default()
        .file_name()
        .unwrap_or(OsStr::new("__unknown__"))
        .to_string_lossy()
        .into_owned()
}

/// Splits a `key=value` spec, used by several `--sysroot-file`-shaped flags
/// across the `e2` binaries.
pub fn split_key_value(spec: &str) -> Result<(&str, &str)> {
    spec.split_once('=')
        .ok_or_else(|| anyhow::anyhow!("invalid key=value spec: {spec:?}"))
}
