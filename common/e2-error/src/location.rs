use std::fmt;
use std::path::{Path, PathBuf};

/// A position in a configuration file, attached to diagnostics raised by the
/// config loader (component D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl AsRef<Path>, line: u32) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}
