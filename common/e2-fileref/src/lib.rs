//! The File reference value (component E): `(server, location, sha1?,
//! sha256?, hashupdate?)` plus its derived fileid.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use e2_hash::{hash_sha256, IdHasher};
use e2_url::{ServerLocation, IN_PROJECT_SERVER};

/// Which checksum kinds a project accepts on File references (spec.md §3,
/// Project: "enabled checksum kinds (sha1 and/or sha256)").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumKinds {
    pub sha1: bool,
    pub sha256: bool,
}

impl ChecksumKinds {
    pub fn any_enabled(&self) -> bool {
        self.sha1 || self.sha256
    }
}

/// An immutable File reference: where to fetch content from, and how to
/// verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub location: ServerLocation,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    /// If set, the checksum is recomputed from actual bytes on every access
    /// and the on-disk config is rewritten with the new value (component D's
    /// one config-mutating side effect).
    pub hashupdate: bool,
    /// The config file this entry was parsed from, needed to act on
    /// `hashupdate`. `None` for File references that were never loaded from
    /// a config file (a result's generated build-script reference, test
    /// fixtures).
    pub config_path: Option<PathBuf>,
}

impl FileRef {
    pub fn new(location: ServerLocation) -> Self {
        Self {
            location,
            sha1: None,
            sha256: None,
            hashupdate: false,
            config_path: None,
        }
    }

    pub fn is_in_project(&self) -> bool {
        self.location.server == IN_PROJECT_SERVER
    }

    /// Validates the "at least one required checksum kind, unless in-project"
    /// invariant of spec.md §3.
    pub fn validate(&self, enabled: ChecksumKinds) -> Result<()> {
        if self.is_in_project() {
            return Ok(());
        }
        let has_required = (enabled.sha1 && self.sha1.is_some())
            || (enabled.sha256 && self.sha256.is_some());
        if !enabled.any_enabled() {
            bail!(
                "project enables no checksum kinds, so {} cannot be validated",
                self.location
            );
        }
        if !has_required {
            bail!(
                "{} is missing a required checksum (project requires {}{}{})",
                self.location,
                if enabled.sha1 { "sha1" } else { "" },
                if enabled.sha1 && enabled.sha256 { " or " } else { "" },
                if enabled.sha256 { "sha256" } else { "" },
            );
        }
        Ok(())
    }

    /// Verifies `reader`'s bytes against whichever checksum is configured.
    /// Mismatch is always fatal (spec.md §4.2: "Configured checksums must
    /// verify against the bytes on every fetch; mismatch is fatal.").
    pub fn verify_bytes(&self, reader: impl Read) -> Result<()> {
        let checksum = if let Some(sha256) = &self.sha256 {
            e2_hash::FileChecksum::parse_sha256(sha256)?
        } else if let Some(sha1) = &self.sha1 {
            e2_hash::FileChecksum::parse_sha1(sha1)?
        } else {
            return Ok(());
        };
        if !checksum.verify(reader)? {
            bail!(
                "checksum mismatch for {}: configured {} does not match fetched bytes",
                self.location,
                checksum.as_hex()
            );
        }
        Ok(())
    }

    /// Computes the fileid (§4.2): hash over (sha256 if present, else sha1 if
    /// present, else a locally computed SHA-256 of `local_bytes`) plus the
    /// location. `local_bytes` is required exactly when neither checksum is
    /// configured, which (after `validate`) only happens for in-project
    /// files.
    pub fn fileid(&self, local_bytes: Option<impl Read>) -> Result<String> {
        let checksum_hex = if let Some(sha256) = &self.sha256 {
            sha256.clone()
        } else if let Some(sha1) = &self.sha1 {
            sha1.clone()
        } else {
            let reader = local_bytes
                .ok_or_else(|| anyhow!("{} has no checksum and no local bytes to hash", self.location))?;
            hash_sha256(reader)?
        };

        let mut hasher = IdHasher::new();
        hasher.field(&checksum_hex).field(&self.location.location);
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sl(server: &str, location: &str) -> ServerLocation {
        ServerLocation::new(server, location)
    }

    #[test]
    fn validate_requires_checksum_for_remote_file() {
        let f = FileRef::new(sl("upstream", "archive.tar"));
        let err = f
            .validate(ChecksumKinds {
                sha1: true,
                sha256: false,
            })
            .unwrap_err();
        assert!(err.to_string().contains("missing a required checksum"));
    }

    #[test]
    fn validate_skips_in_project_files() {
        let f = FileRef::new(sl(".", "hello.txt"));
        f.validate(ChecksumKinds::default()).unwrap();
    }

    #[test]
    fn fileid_prefers_sha256_over_sha1() {
        let mut f = FileRef::new(sl(".", "hello.txt"));
        f.sha1 = Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string());
        let without_sha256 = f.fileid(None::<&[u8]>).unwrap();

        f.sha256 =
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde".to_string());
        let with_sha256 = f.fileid(None::<&[u8]>).unwrap();

        assert_ne!(without_sha256, with_sha256);
    }

    #[test]
    fn fileid_requires_local_bytes_when_no_checksum() {
        let f = FileRef::new(sl(".", "hello.txt"));
        assert!(f.fileid(None::<&[u8]>).is_err());
        assert!(f.fileid(Some("hello world".as_bytes())).is_ok());
    }

    #[test]
    fn verify_bytes_rejects_mismatch() {
        let mut f = FileRef::new(sl(".", "hello.txt"));
        f.sha1 = Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string());
        assert!(f.verify_bytes("hello world".as_bytes()).is_ok());
        assert!(f.verify_bytes("goodbye world".as_bytes()).is_err());
    }
}
