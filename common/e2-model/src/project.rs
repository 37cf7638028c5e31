use e2_hash::IdHasher;

/// Which checksum kinds the project accepts on File references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumKinds {
    pub sha1: bool,
    pub sha256: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub release_id: String,
    pub chroot_arch: String,
    /// Default result names, in declaration order.
    pub default_results: Vec<String>,
    pub checksums: ChecksumKinds,
    /// Chroot group names implicitly added to every result, in declaration
    /// order.
    pub default_groups: Vec<String>,
}

impl Project {
    /// `projid = hash(name, release_id, chroot_arch, default_results...,
    /// enabled checksum kinds, envid of global env, chrootgroupid of each
    /// default group in order, licenceid of every licence in name order)`.
    pub fn projid(
        &self,
        global_envid: &str,
        default_group_ids_in_order: &[String],
        licenceids_in_name_order: &[String],
    ) -> String {
        let mut hasher = IdHasher::new();
        hasher
            .field(&self.name)
            .field(&self.release_id)
            .field(&self.chroot_arch);
        hasher.fields(&self.default_results);
        hasher
            .field(if self.checksums.sha1 { "sha1" } else { "" })
            .field(if self.checksums.sha256 { "sha256" } else { "" });
        hasher.field(global_envid);
        hasher.fields(default_group_ids_in_order);
        hasher.fields(licenceids_in_name_order);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Project {
        Project {
            name: "myproj".to_string(),
            release_id: "v1".to_string(),
            chroot_arch: "amd64".to_string(),
            default_results: vec!["r1".to_string()],
            checksums: ChecksumKinds { sha1: true, sha256: false },
            default_groups: vec!["base".to_string()],
        }
    }

    #[test]
    fn projid_changes_with_release_id() {
        let a = base();
        let mut b = base();
        b.release_id = "v2".to_string();
        assert_ne!(a.projid("env", &["g1".into()], &[]), b.projid("env", &["g1".into()], &[]));
    }

    #[test]
    fn projid_is_deterministic() {
        let p = base();
        let first = p.projid("env", &["g1".into()], &["l1".into()]);
        let second = p.projid("env", &["g1".into()], &["l1".into()]);
        assert_eq!(first, second);
    }
}
