//! Packs a finished result directory into the deterministic archive that
//! gets published to the cache under its buildid (component L, step 11
//! "store"; spec.md §4.6 invariant: byte-identical output for byte-identical
//! inputs).
//!
//! Determinism comes from two choices: entries are added in lexicographic
//! path order (readdir order is unspecified, so we always sort first), and
//! the archive itself is an uncompressed tar — only the build log member is
//! compressed, with zstd, whose frame format is itself deterministic for a
//! fixed compression level and input.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

const BUILD_LOG_MEMBER: &str = ".e2/build.log.zst";

/// Tars `result_dir`'s contents plus `build_log` (compressed) into
/// `out_tar`, in deterministic order.
pub fn pack_result(result_dir: &Path, build_log: &Path, out_tar: &Path) -> Result<()> {
    if let Some(parent) = out_tar.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {parent:?}"))?;
    }
    let file = File::create(out_tar).with_context(|| format!("failed to create {out_tar:?}"))?;
    let mut builder = tar::Builder::new(file);

    let mut entries: Vec<_> = WalkDir::new(result_dir)
        .min_depth(1)
        .into_iter()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to walk {result_dir:?}"))?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in &entries {
        let rel = entry
            .path()
            .strip_prefix(result_dir)
            .with_context(|| format!("{:?} is not under {result_dir:?}", entry.path()))?;
        if entry.file_type().is_dir() {
            builder
                .append_dir(rel, entry.path())
                .with_context(|| format!("failed to add directory {rel:?} to archive"))?;
        } else {
            let mut f = File::open(entry.path())
                .with_context(|| format!("failed to open {:?}", entry.path()))?;
            builder
                .append_file(rel, &mut f)
                .with_context(|| format!("failed to add {rel:?} to archive"))?;
        }
    }

    append_compressed_log(&mut builder, build_log)?;

    builder.into_inner().context("failed to finalize archive")?.flush()?;
    Ok(())
}

fn append_compressed_log(builder: &mut tar::Builder<File>, build_log: &Path) -> Result<()> {
    let raw = std::fs::read(build_log).with_context(|| format!("failed to read {build_log:?}"))?;
    let compressed = zstd::stream::encode_all(raw.as_slice(), 0)
        .with_context(|| format!("failed to compress {build_log:?}"))?;

    let mut header = tar::Header::new_gnu();
    header.set_size(compressed.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, BUILD_LOG_MEMBER, compressed.as_slice())
        .context("failed to add build log to archive")
}
