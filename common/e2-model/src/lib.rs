//! Typed configuration objects and their identity derivations (component H):
//! [`Project`], [`Licence`], [`ChrootGroup`], [`Source`], [`ResultDef`], and
//! [`BuildSet`].
//!
//! Every `*id` method here is a pure function of already-resolved inputs
//! (fileids, envids, dependent sourceids/buildids) — resolving those inputs
//! from the filesystem, cache, or an SCM remote is the job of the crates
//! layered on top of this one (`e2-cache`, `e2-scm`, `e2-graph`).

mod buildset;
mod chroot_group;
mod licence;
mod project;
mod result;
mod source;

pub use buildset::{BuildMode, BuildSet, BuildSetEntry, BuildSettings};
pub use chroot_group::{augment_with_defaults, ChrootGroup};
pub use licence::Licence;
pub use project::{ChecksumKinds, Project};
pub use result::{ResultDef, ResultKind, SCRATCH_PREFIX};
pub use source::{
    CvsAttrs, FileAction, ResolvedPayload, ScmAttrs, Source, SourceKind, SourceSet,
    WORKING_COPY_SOURCEID,
};
