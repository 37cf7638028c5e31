//! Nestable error and diagnostic types shared across the engine.
//!
//! Every fallible engine operation returns an [`EngineError`] (or a
//! category-specific error that converts into one). Each leaf crate defines
//! its own `thiserror` enum for the errors it can produce; this crate only
//! owns the category taxonomy and the [`Diagnostic`] chain used for
//! non-fatal warnings, so that components don't have to agree on a single
//! god enum to report diagnostics uniformly.

mod location;
mod warning;

pub use location::SourceLocation;
pub use warning::{WarningClass, WarningFilter};

use std::fmt;

/// The error taxonomy of §7: every [`EngineError`] belongs to exactly one
/// category, which drives both logging and `--Wxxx` warning filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Identity,
    Transport,
    Scm,
    PrivilegedHelper,
    Build,
    Resource,
    Interruption,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Identity => "identity",
            Self::Transport => "transport",
            Self::Scm => "scm",
            Self::PrivilegedHelper => "privileged-helper",
            Self::Build => "build",
            Self::Resource => "resource",
            Self::Interruption => "interruption",
        };
        f.write_str(name)
    }
}

/// The top-level nestable error threaded through the engine.
///
/// Unlike a bare `anyhow::Error`, it carries a [`ErrorCategory`] so that
/// callers (the config loader's typo detector, the top-level CLI) can decide
/// whether a failure is fatal or merely a warning without string-matching
/// the message.
#[derive(thiserror::Error, Debug)]
#[error("{category}: {source}")]
pub struct EngineError {
    pub category: ErrorCategory,
    pub location: Option<SourceLocation>,
    #[source]
    pub source: anyhow::Error,
}

impl EngineError {
    pub fn new(category: ErrorCategory, source: anyhow::Error) -> Self {
        Self {
            category,
            location: None,
            source,
        }
    }

    pub fn at(category: ErrorCategory, location: SourceLocation, source: anyhow::Error) -> Self {
        Self {
            category,
            location: Some(location),
            source,
        }
    }

    /// Renders the full chain, one cause per line, the way the top-level CLI
    /// logs a fatal error before exiting nonzero.
    pub fn render_chain(&self) -> String {
        let mut lines = Vec::new();
        if let Some(loc) = &self.location {
            lines.push(format!("{}: {} ({})", self.category, self.source, loc));
        } else {
            lines.push(format!("{}: {}", self.category, self.source));
        }
        for cause in self.source.chain().skip(1) {
            lines.push(format!("  caused by: {cause}"));
        }
        lines.join("\n")
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_chain_includes_location() {
        let err = EngineError::at(
            ErrorCategory::Configuration,
            SourceLocation::new("proj/config", 3),
            anyhow::anyhow!("unknown key `nmae`"),
        );
        let rendered = err.render_chain();
        assert!(rendered.contains("configuration"));
        assert!(rendered.contains("proj/config:3"));
    }

    #[test]
    fn display_matches_category() {
        assert_eq!(ErrorCategory::Scm.to_string(), "scm");
    }
}
