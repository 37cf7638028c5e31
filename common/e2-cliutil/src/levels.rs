use tracing_subscriber::filter::LevelFilter;

/// The log-level and warning-class flags common to every `e2` tool (spec.md
/// §6, "Global flags recognized by every tool").
#[derive(Clone, Debug, Default, clap::Args)]
pub struct LogLevelArgs {
    /// Suppress all output except fatal errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (info-level engine messages).
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug-level engine messages.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable debug-level messages from invoked external tools as well.
    #[arg(long, global = true)]
    pub tooldebug: bool,

    /// Shorthand for the most verbose level (equivalent to `--v4 --tooldebug`).
    #[arg(long, global = true)]
    pub vall: bool,

    #[arg(long, global = true)]
    pub v1: bool,
    #[arg(long, global = true)]
    pub v2: bool,
    #[arg(long, global = true)]
    pub v3: bool,
    #[arg(long, global = true)]
    pub v4: bool,
}

impl LogLevelArgs {
    /// Resolves the flag combination (later/more-specific flags win) to a
    /// single [`LevelFilter`] used as the default directive for the console
    /// logger.
    pub fn resolve(&self) -> LevelFilter {
        if self.vall || self.v4 {
            LevelFilter::TRACE
        } else if self.v3 || self.debug {
            LevelFilter::DEBUG
        } else if self.v2 || self.verbose {
            LevelFilter::INFO
        } else if self.v1 {
            LevelFilter::WARN
        } else if self.quiet {
            LevelFilter::ERROR
        } else {
            LevelFilter::WARN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_suppresses_to_errors_only() {
        let args = LogLevelArgs {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(args.resolve(), LevelFilter::ERROR);
    }

    #[test]
    fn vall_wins_over_quiet() {
        let args = LogLevelArgs {
            quiet: true,
            vall: true,
            ..Default::default()
        };
        assert_eq!(args.resolve(), LevelFilter::TRACE);
    }

    #[test]
    fn default_is_warn() {
        assert_eq!(LogLevelArgs::default().resolve(), LevelFilter::WARN);
    }
}
