use anyhow::{bail, Context, Result};
use itertools::Itertools;
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

use crate::levels::LogLevelArgs;

/// Name of the environment variables naming the trace directory/file. At
/// most one of the pair may be set.
pub const TRACE_DIR_ENV: &str = "E2_TRACE_DIR";
pub const TRACE_FILE_ENV: &str = "E2_TRACE_FILE";

/// Name of the environment variables naming the log directory/file.
pub const LOG_DIR_ENV: &str = "E2_LOG_DIR";
pub const LOG_FILE_ENV: &str = "E2_LOG_FILE";

/// Set to "0" to suppress console logging entirely.
pub const CONSOLE_LOG_ENV: &str = "E2_LOG_CONSOLE";

/// RAII guard performing logging cleanup (flushing the trace file) on drop.
pub struct LogGuard {
    _span_guard: tracing::span::EnteredSpan,
    _flush_guard: Option<tracing_chrome::FlushGuard>,
}

/// Configuration for the logging/tracing subscriber, resolved from CLI flags
/// and environment variables.
pub struct LoggingConfig {
    trace_file: Option<PathBuf>,
    log_file: Option<(PathBuf, EnvFilter)>,
    console_logger: Option<EnvFilter>,
}

impl LoggingConfig {
    /// Builds the config from resolved log-level flags plus the
    /// `E2_TRACE_*`/`E2_LOG_*` environment variables.
    pub fn new(levels: &LogLevelArgs) -> Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let get_file = |dir_env: &str, file_env: &str, ext: &str| -> Result<Option<PathBuf>> {
            Ok(
                match (std::env::var_os(file_env), std::env::var_os(dir_env)) {
                    (Some(_), Some(_)) => bail!("both {file_env} and {dir_env} are set"),
                    (Some(file), None) => {
                        std::env::remove_var(file_env);
                        Some(PathBuf::from(file))
                    }
                    (None, Some(dir)) => {
                        let name = format!("{}.{timestamp}.{ext}", crate::current_process_name());
                        Some(Path::new(&dir).join(name))
                    }
                    (None, None) => None,
                },
            )
        };

        let trace_file = get_file(TRACE_DIR_ENV, TRACE_FILE_ENV, "json")?;
        let log_file_path = get_file(LOG_DIR_ENV, LOG_FILE_ENV, "log")?;

        let level = levels.resolve();
        let console_logger = match std::env::var(CONSOLE_LOG_ENV).ok().as_deref() {
            Some("0") => None,
            _ => Some(
                EnvFilter::builder()
                    .with_default_directive(level.into())
                    .from_env()?,
            ),
        };

        let log_file = match log_file_path {
            Some(path) => Some((
                path,
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::DEBUG.into())
                    .from_env()?,
            )),
            None => None,
        };

        Ok(Self {
            trace_file,
            log_file,
            console_logger,
        })
    }

    /// Sets up the global tracing subscriber and starts a "main" span.
    pub fn setup(self) -> Result<LogGuard> {
        let mut layers = Vec::new();

        let flush_guard = if let Some(trace_file) = &self.trace_file {
            let (chrome_layer, flush_guard) = tracing_chrome::ChromeLayerBuilder::new()
                .file(trace_file)
                .build();
            layers.push(chrome_layer.boxed());
            Some(flush_guard)
        } else {
            None
        };

        if let Some(filter) = self.console_logger {
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
                    .with_filter(filter)
                    .boxed(),
            );
        }

        if let Some((log_file, filter)) = self.log_file {
            let f = std::fs::File::create(&log_file)
                .with_context(|| format!("failed to open log file {log_file:?}"))?;
            layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(f)
                    .with_filter(filter)
                    .boxed(),
            );
        }

        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .context("failed to start tracing; is a subscriber already running?")?;

        let args = std::env::args()
            .map(|s| shell_escape::escape(s.into()))
            .join(" ");
        let span_guard = tracing::trace_span!("main", args = args).entered();

        Ok(LogGuard {
            _span_guard: span_guard,
            _flush_guard: flush_guard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_fileutil::SafeTempDir;

    #[test]
    fn resolves_log_file_path_from_dir_env() -> Result<()> {
        let dir = SafeTempDir::new()?;
        std::env::remove_var(LOG_FILE_ENV);
        std::env::set_var(LOG_DIR_ENV, dir.path());
        std::env::set_var(CONSOLE_LOG_ENV, "0");

        let config = LoggingConfig::new(&LogLevelArgs::default())?;
        assert!(config.log_file.is_some());

        std::env::remove_var(LOG_DIR_ENV);
        Ok(())
    }

    #[test]
    fn rejects_both_dir_and_file_env() {
        std::env::set_var(LOG_DIR_ENV, "/tmp/a");
        std::env::set_var(LOG_FILE_ENV, "/tmp/b.log");
        let result = LoggingConfig::new(&LogLevelArgs::default());
        std::env::remove_var(LOG_DIR_ENV);
        std::env::remove_var(LOG_FILE_ENV);
        assert!(result.is_err());
    }
}
