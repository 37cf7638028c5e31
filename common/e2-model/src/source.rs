use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use e2_env::Environment;
use e2_fileref::FileRef;
use e2_hash::IdHasher;
use e2_url::ServerLocation;

/// The literal sourceid of any source resolved in working-copy mode: never
/// cached, never compared for equality against another source's identity.
pub const WORKING_COPY_SOURCEID: &str = "working-copy";

/// Which checked-out state a source's identity is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSet {
    Tag,
    Branch,
    WorkingCopy,
}

impl SourceSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Branch => "branch",
            Self::WorkingCopy => "working-copy",
        }
    }
}

impl fmt::Display for SourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-file action a `files`-type source performs on checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Unpack,
    Copy,
    Patch,
}

impl FileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpack => "unpack",
            Self::Copy => "copy",
            Self::Patch => "patch",
        }
    }
}

/// Attributes shared by the SCM-backed source types (git, gitrepo, svn).
#[derive(Debug, Clone, PartialEq)]
pub struct ScmAttrs {
    pub location: ServerLocation,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub working_dir: PathBuf,
}

/// Attributes of a cvs source. Branch-mode identity is unsupported (§9): the
/// loader must refuse a cvs source configured with `branch` and no `tag`
/// rather than invent an identity scheme for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CvsAttrs {
    pub server: String,
    pub cvsroot: String,
    pub module: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Files(Vec<(FileRef, FileAction)>),
    Git(ScmAttrs),
    GitRepo(ScmAttrs),
    Svn(ScmAttrs),
    Cvs(CvsAttrs),
    /// Materializes the licence texts of every named result/source into the
    /// build tree; its own identity is derived from theirs.
    Licence { materialize: Vec<String> },
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files(_) => "files",
            Self::Git(_) => "git",
            Self::GitRepo(_) => "gitrepo",
            Self::Svn(_) => "svn",
            Self::Cvs(_) => "cvs",
            Self::Licence { .. } => "licence",
        }
    }
}

/// The externally resolved data a sourceid computation needs beyond the
/// source's own static configuration: a fetched fileid, a resolved SCM
/// revision, or a dependent source's own sourceid. Resolving these requires
/// network or filesystem access (component J's job); this crate only knows
/// the hash formula they feed into.
pub enum ResolvedPayload {
    Files { fileids: Vec<String> },
    /// The commit object id (git/gitrepo) or "Last Changed Rev" (svn) that
    /// `branch`/`tag` currently resolves to.
    ScmRevision(String),
    Cvs,
    LicenceSource { dependent_sourceids: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub kind: SourceKind,
    pub env: Environment,
    /// Licence names this source references, in declaration order.
    pub licences: Vec<String>,
}

impl Source {
    pub fn new(name: impl Into<String>, kind: SourceKind, env: Environment, licences: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            env,
            licences,
        }
    }

    /// Computes `sourceid(sourceset)`.
    ///
    /// `licenceids` must be given in the same order as `self.licences`.
    /// `payload` supplies whatever this source kind's type-specific hash
    /// input requires resolving externally; `sourceset` is folded into every
    /// non-working-copy hash so that, e.g., a git source's tag and branch
    /// identities never collide even when they currently resolve to the
    /// same commit.
    pub fn sourceid(
        &self,
        sourceset: SourceSet,
        licenceids: &[String],
        payload: &ResolvedPayload,
    ) -> Result<String> {
        if sourceset == SourceSet::WorkingCopy {
            return Ok(WORKING_COPY_SOURCEID.to_string());
        }

        let mut hasher = IdHasher::new();
        hasher.field(&self.name);
        hasher.field(self.kind.as_str());
        hasher.field(self.env.envid());
        hasher.field(sourceset.as_str());
        hasher.fields(licenceids);

        match (&self.kind, payload) {
            (SourceKind::Files(files), ResolvedPayload::Files { fileids }) => {
                if fileids.len() != files.len() {
                    bail!(
                        "source {:?} has {} files but {} fileids were supplied",
                        self.name,
                        files.len(),
                        fileids.len()
                    );
                }
                for ((file_ref, action), fileid) in files.iter().zip(fileids) {
                    hasher
                        .field(fileid)
                        .field(&file_ref.location.location)
                        .field(&file_ref.location.server)
                        .field(action.as_str());
                }
            }
            (SourceKind::Git(attrs) | SourceKind::GitRepo(attrs), ResolvedPayload::ScmRevision(rev)) => {
                hasher
                    .field(&attrs.location.server)
                    .field(&attrs.location.location)
                    .field(rev);
            }
            (SourceKind::Svn(attrs), ResolvedPayload::ScmRevision(rev)) => {
                let ref_path = attrs.tag.as_deref().or(attrs.branch.as_deref()).unwrap_or("");
                hasher
                    .field(&attrs.location.server)
                    .field(&attrs.location.location)
                    .field(ref_path)
                    .field(rev);
            }
            (SourceKind::Cvs(attrs), ResolvedPayload::Cvs) => {
                let tag = attrs
                    .tag
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("cvs source {:?} has no tag: branch mode has no sourceid", self.name))?;
                if sourceset != SourceSet::Tag {
                    bail!("cvs sources only support sourceid in tag mode");
                }
                hasher
                    .field(&self.name)
                    .field(&attrs.server)
                    .field(&attrs.cvsroot)
                    .field(&attrs.module)
                    .field(tag);
            }
            (SourceKind::Licence { .. }, ResolvedPayload::LicenceSource { dependent_sourceids }) => {
                hasher.fields(dependent_sourceids);
            }
            _ => bail!(
                "resolved payload does not match source kind for {:?}",
                self.name
            ),
        }

        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_source(location: &str, sha1: &str) -> Source {
        let mut file_ref = FileRef::new(ServerLocation::new(".", location));
        file_ref.sha1 = Some(sha1.to_string());
        Source::new(
            "s1",
            SourceKind::Files(vec![(file_ref, FileAction::Unpack)]),
            Environment::new(),
            vec![],
        )
    }

    #[test]
    fn working_copy_sourceid_is_the_literal_sentinel() {
        let source = files_source("hello.txt", "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        let id = source
            .sourceid(
                SourceSet::WorkingCopy,
                &[],
                &ResolvedPayload::Files { fileids: vec!["ignored".into()] },
            )
            .unwrap();
        assert_eq!(id, "working-copy");
    }

    #[test]
    fn tag_and_branch_sourceids_differ_even_with_same_revision() {
        let attrs = ScmAttrs {
            location: ServerLocation::new("upstream", "repo.git"),
            branch: Some("master".to_string()),
            tag: Some("v1.0".to_string()),
            working_dir: PathBuf::from("."),
        };
        let source = Source::new("s1", SourceKind::Git(attrs), Environment::new(), vec![]);
        let payload = ResolvedPayload::ScmRevision("deadbeef".to_string());

        let tag_id = source.sourceid(SourceSet::Tag, &[], &payload).unwrap();
        let branch_id = source.sourceid(SourceSet::Branch, &[], &payload).unwrap();
        assert_ne!(tag_id, branch_id);
    }

    #[test]
    fn files_sourceid_is_deterministic() {
        let source = files_source("hello.txt", "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        let payload = ResolvedPayload::Files {
            fileids: vec!["fileid123".to_string()],
        };
        let a = source.sourceid(SourceSet::Tag, &[], &payload).unwrap();
        let b = source.sourceid(SourceSet::Tag, &[], &payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cvs_branch_mode_is_refused() {
        let attrs = CvsAttrs {
            server: "cvs-server".to_string(),
            cvsroot: ":pserver:anon@cvs.example.com:/cvsroot".to_string(),
            module: "mymodule".to_string(),
            tag: None,
        };
        let source = Source::new("s1", SourceKind::Cvs(attrs), Environment::new(), vec![]);
        let err = source
            .sourceid(SourceSet::Branch, &[], &ResolvedPayload::Cvs)
            .unwrap_err();
        assert!(err.to_string().contains("branch mode"));
    }
}
