use e2_env::Environment;
use e2_fileref::FileRef;
use e2_hash::IdHasher;

/// The prefix a poisoned (working-copy-tainted) buildid carries, signifying
/// "never cacheable, never stored" (§8 invariant 8).
pub const SCRATCH_PREFIX: &str = "scratch-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Result,
    CollectProject,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Result => "result",
            Self::CollectProject => "collect_project",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultDef {
    pub name: String,
    pub kind: ResultKind,
    /// Chroot group names, already augmented with the project's
    /// `default_groups` and deduplicated (see
    /// [`crate::chroot_group::augment_with_defaults`]).
    pub chroot_groups: Vec<String>,
    /// Result names this result depends on, in declaration order.
    pub depends: Vec<String>,
    /// Source names this result consumes, in declaration order.
    pub sources: Vec<String>,
    pub env: Environment,
    pub build_script: FileRef,
}

impl ResultDef {
    /// `buildid = hash(name, type, projid, envid(merged env),
    /// chrootgroupid[i] in sorted group order, fileid of build-script,
    /// sourceid of each source in declaration order, buildid of each
    /// depend in declaration order)`.
    ///
    /// A result is poisoned — its buildid gets the `scratch-` prefix and it
    /// is never eligible for storage — if any of its own sources resolved
    /// to the working-copy sentinel, or if any dependency it built on is
    /// itself poisoned. Poisoning is therefore purely a function of the
    /// already-computed inputs, not a separately tracked build mode.
    pub fn buildid(
        &self,
        projid: &str,
        merged_envid: &str,
        chrootgroupids_sorted: &[String],
        build_script_fileid: &str,
        source_ids_in_order: &[String],
        depend_buildids_in_order: &[String],
    ) -> String {
        let mut hasher = IdHasher::new();
        hasher
            .field(&self.name)
            .field(self.kind.as_str())
            .field(projid)
            .field(merged_envid);
        hasher.fields(chrootgroupids_sorted);
        hasher.field(build_script_fileid);
        hasher.fields(source_ids_in_order);
        hasher.fields(depend_buildids_in_order);
        let id = hasher.finish();

        let poisoned = source_ids_in_order
            .iter()
            .any(|s| s == crate::source::WORKING_COPY_SOURCEID)
            || depend_buildids_in_order
                .iter()
                .any(|b| b.starts_with(SCRATCH_PREFIX));

        if poisoned {
            format!("{SCRATCH_PREFIX}{id}")
        } else {
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use e2_url::ServerLocation;

    fn base() -> ResultDef {
        ResultDef {
            name: "r1".to_string(),
            kind: ResultKind::Result,
            chroot_groups: vec![],
            depends: vec![],
            sources: vec!["s1".to_string()],
            env: Environment::new(),
            build_script: FileRef::new(ServerLocation::new(".", "build.sh")),
        }
    }

    #[test]
    fn buildid_is_deterministic() {
        let r = base();
        let a = r.buildid("proj", "env", &[], "script", &["source-id".into()], &[]);
        let b = r.buildid("proj", "env", &[], "script", &["source-id".into()], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn working_copy_source_poisons_buildid() {
        let r = base();
        let id = r.buildid(
            "proj",
            "env",
            &[],
            "script",
            &["working-copy".to_string()],
            &[],
        );
        assert!(id.starts_with(SCRATCH_PREFIX));
    }

    #[test]
    fn poisoned_dependency_propagates() {
        let r = base();
        let id = r.buildid(
            "proj",
            "env",
            &[],
            "script",
            &["source-id".to_string()],
            &["scratch-abc123".to_string()],
        );
        assert!(id.starts_with(SCRATCH_PREFIX));
    }

    #[test]
    fn clean_inputs_are_not_poisoned() {
        let r = base();
        let id = r.buildid("proj", "env", &[], "script", &["source-id".to_string()], &[]);
        assert!(!id.starts_with(SCRATCH_PREFIX));
    }
}
