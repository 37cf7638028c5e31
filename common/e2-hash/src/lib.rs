//! Incremental hash engine (component B).
//!
//! Two independent things live here:
//!
//! - [`FileChecksum`]: SHA-1/SHA-256 of a byte stream, used to verify File
//!   references (component E) against configured checksums.
//! - [`IdHasher`]: the NUL-separated field encoding used by every `*id` in
//!   §4.2 (envid, fileid, licenceid, chrootgroupid, projid, sourceid,
//!   buildid). All engine-internal identity hashes are SHA-256 hex digests
//!   (see SPEC_FULL.md §4.2's resolution of the hash-algorithm open
//!   question); `FileChecksum` additionally supports SHA-1 because projects
//!   may configure either checksum kind on a File reference.

use std::io::Read;

use anyhow::Result;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// A verified checksum of file content, either SHA-1 (40 hex chars) or
/// SHA-256 (64 hex chars).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChecksum {
    Sha1(String),
    Sha256(String),
}

impl FileChecksum {
    /// Parses a checksum from its configured hex representation, rejecting
    /// anything that isn't exactly 40 or 64 lowercase hex characters.
    pub fn parse_sha1(hex: &str) -> Result<Self> {
        ensure_hex_len(hex, 40)?;
        Ok(Self::Sha1(hex.to_ascii_lowercase()))
    }

    pub fn parse_sha256(hex: &str) -> Result<Self> {
        ensure_hex_len(hex, 64)?;
        Ok(Self::Sha256(hex.to_ascii_lowercase()))
    }

    pub fn as_hex(&self) -> &str {
        match self {
            Self::Sha1(h) => h,
            Self::Sha256(h) => h,
        }
    }

    /// Computes the checksum of a byte stream, using the same algorithm as
    /// `self`, and compares it for equality. Reads the stream incrementally
    /// rather than buffering it whole, since result tarballs and chroot
    /// group archives can be large.
    pub fn verify(&self, reader: impl Read) -> Result<bool> {
        let actual = match self {
            Self::Sha1(_) => Self::Sha1(hash_sha1(reader)?),
            Self::Sha256(_) => Self::Sha256(hash_sha256(reader)?),
        };
        Ok(&actual == self)
    }
}

/// Hashes a byte stream with SHA-1, incrementally.
pub fn hash_sha1(mut reader: impl Read) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes a byte stream with SHA-256, incrementally.
pub fn hash_sha256(mut reader: impl Read) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn ensure_hex_len(s: &str, want_len: usize) -> Result<()> {
    anyhow::ensure!(
        s.len() == want_len && s.bytes().all(|b| b.is_ascii_hexdigit()),
        "expected {want_len} hex characters, got {:?}",
        s
    );
    Ok(())
}

/// Builds one of the engine's `*id` values by hashing an ordered sequence of
/// NUL-separated fields, exactly as spec.md's worked examples describe
/// (`sha1(s1\0files\0<envid>\0\0<fileid>\0...)`  generalized to SHA-256 for
/// engine-computed ids). Field order is part of the identity contract:
/// callers must push fields in the exact order spec.md §4.2 defines for the
/// id they're computing.
#[derive(Default)]
pub struct IdHasher {
    hasher: Sha256,
}

impl IdHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Appends one field, followed by a NUL separator.
    pub fn field(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.hasher.update(value.as_ref());
        self.hasher.update([0u8]);
        self
    }

    /// Appends every field of an ordered sequence.
    pub fn fields<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for value in values {
            self.field(value);
        }
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_of_hello_world() {
        let digest = hash_sha1("hello world".as_bytes()).unwrap();
        assert_eq!(digest, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
    }

    #[test]
    fn id_hasher_is_order_sensitive() {
        let mut a = IdHasher::new();
        a.field("x").field("y");
        let mut b = IdHasher::new();
        b.field("y").field("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn id_hasher_is_deterministic() {
        let mut a = IdHasher::new();
        a.fields(["r1", "result", "proj123"]);
        let mut b = IdHasher::new();
        b.fields(["r1", "result", "proj123"]);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn checksum_rejects_bad_length() {
        assert!(FileChecksum::parse_sha1("deadbeef").is_err());
    }

    #[test]
    fn checksum_verify_matches_bytes() {
        let checksum =
            FileChecksum::parse_sha1("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed").unwrap();
        assert!(checksum.verify("hello world".as_bytes()).unwrap());
        assert!(!checksum.verify("goodbye world".as_bytes()).unwrap());
    }
}
