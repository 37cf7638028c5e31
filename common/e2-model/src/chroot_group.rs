use anyhow::{ensure, Result};
use e2_fileref::FileRef;
use e2_hash::IdHasher;

/// A named, ordered stack of chroot filesystem archives (component H).
#[derive(Debug, Clone, PartialEq)]
pub struct ChrootGroup {
    pub name: String,
    /// Whether this group is implicitly added to every result's chroot
    /// (the project's `default_groups` list).
    pub default_member: bool,
    pub files: Vec<FileRef>,
}

impl ChrootGroup {
    pub fn new(name: impl Into<String>, default_member: bool, files: Vec<FileRef>) -> Self {
        Self {
            name: name.into(),
            default_member,
            files,
        }
    }

    /// `chrootgroupid = hash(group-name, fileid[0], fileid[1], ...)`.
    pub fn chrootgroupid(&self, fileids: &[String]) -> Result<String> {
        ensure!(
            fileids.len() == self.files.len(),
            "chroot group {:?} has {} files but {} fileids were supplied",
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

/// Merges a result's declared chroot group list with the project's
/// `default_groups`, deduplicating while preserving first-seen order (the
/// result's own list first, then any default group not already present).
pub fn augment_with_defaults(declared: &[String], default_groups: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for name in declared.iter().chain(default_groups.iter()) {
        if seen.insert(name.clone()) {
            merged.push(name.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_url::ServerLocation;

    fn fileref(loc: &str) -> FileRef {
        FileRef::new(ServerLocation::new(".", loc))
    }

    #[test]
    fn chrootgroupid_changes_with_membership() {
        let a = ChrootGroup::new("base", true, vec![fileref("a.tar")]);
        let id_a = a.chrootgroupid(&["fa".into()]).unwrap();
        let b = ChrootGroup::new("base", true, vec![fileref("a.tar"), fileref("b.tar")]);
        let id_b = b.chrootgroupid(&["fa".into(), "fb".into()]).unwrap();
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn augment_deduplicates_preserving_order() {
        let merged = augment_with_defaults(
            &["extra".to_string(), "base".to_string()],
            &["base".to_string(), "tools".to_string()],
        );
        assert_eq!(merged, vec!["extra", "base", "tools"]);
    }
}
