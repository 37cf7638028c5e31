use anyhow::{ensure, Result};
use e2_fileref::FileRef;
use e2_hash::IdHasher;

/// A named, ordered set of licence text files (component H).
#[derive(Debug, Clone, PartialEq)]
pub struct Licence {
    pub name: String,
    pub files: Vec<FileRef>,
}

impl Licence {
    pub fn new(name: impl Into<String>, files: Vec<FileRef>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// `licenceid = hash(name, fileid[0], fileid[1], ...)`, in file
    /// declaration order. `fileids` must line up positionally with
    /// `self.files`.
    pub fn licenceid(&self, fileids: &[String]) -> Result<String> {
        ensure!(
            fileids.len() == self.files.len(),
            "licence {:?} has {} files but {} fileids were supplied",
            self.name,
            self.files.len(),
            fileids.len()
        );
        let mut hasher = IdHasher::new();
        hasher.field(&self.name);
        hasher.fields(fileids);
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_url::ServerLocation;

    fn fileref(loc: &str) -> FileRef {
        FileRef::new(ServerLocation::new(".", loc))
    }

    #[test]
    fn licenceid_is_sensitive_to_order() {
        let licence = Licence::new("gpl2", vec![fileref("a"), fileref("b")]);
        let forward = licence.licenceid(&["fa".into(), "fb".into()]).unwrap();
        let backward = licence.licenceid(&["fb".into(), "fa".into()]).unwrap();
        assert_ne!(forward, backward);
    }

    #[test]
    fn licenceid_rejects_mismatched_fileid_count() {
        let licence = Licence::new("gpl2", vec![fileref("a")]);
        assert!(licence.licenceid(&[]).is_err());
    }
}
