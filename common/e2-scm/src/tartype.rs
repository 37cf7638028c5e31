use anyhow::{bail, Result};

/// The archive formats chroot-group tarballs and `files`-source `unpack`
/// entries may use, detected by filename suffix (§4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarType {
    Plain,
    Gzip,
    Bzip2,
    Xz,
}

impl TarType {
    pub fn detect(filename: &str) -> Result<Self> {
        if filename.ends_with(".tar.gz") || filename.ends_with(".tgz") {
            Ok(Self::Gzip)
        } else if filename.ends_with(".tar.bz2") || filename.ends_with(".tbz2") {
            Ok(Self::Bzip2)
        } else if filename.ends_with(".tar.xz") {
            Ok(Self::Xz)
        } else if filename.ends_with(".tar") {
            Ok(Self::Plain)
        } else {
            bail!("cannot determine archive type of {filename:?} from its suffix")
        }
    }

    /// The verb argument passed to the privileged helper's
    /// `extract_tar_2_3 <tartype>` command.
    pub fn helper_verb(&self) -> &'static str {
        match self {
            Self::Plain => "tar",
            Self::Gzip => "tar.gz",
            Self::Bzip2 => "tar.bz2",
            Self::Xz => "tar.xz",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_every_known_suffix() {
        assert_eq!(TarType::detect("base.tar").unwrap(), TarType::Plain);
        assert_eq!(TarType::detect("base.tar.gz").unwrap(), TarType::Gzip);
        assert_eq!(TarType::detect("base.tgz").unwrap(), TarType::Gzip);
        assert_eq!(TarType::detect("base.tar.bz2").unwrap(), TarType::Bzip2);
        assert_eq!(TarType::detect("base.tbz2").unwrap(), TarType::Bzip2);
        assert_eq!(TarType::detect("base.tar.xz").unwrap(), TarType::Xz);
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(TarType::detect("base.zip").is_err());
    }
}
