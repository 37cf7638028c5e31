//! Content-addressed cache / transport layer (component F).
//!
//! A [`Cache`] maps `(server, location)` to a local path, mirroring each
//! server's tree under its own subdirectory of the cache root. Fetches are
//! locked per-entry (§4.4 invariant: at most one concurrent fetch per
//! `(server, location)`), written to a temp file, checksum-verified, and
//! published atomically — so a crash or checksum mismatch mid-transfer never
//! leaves a corrupt file in the cache (§8 invariant 5/6).

mod transport;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use e2_fileutil::{publish_atomically, DirLock};
use e2_hash::FileChecksum;
use e2_url::TransportUrl;
use tracing::instrument;

/// One entry of the global config's `servers[name]` table (spec.md §6).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub url: TransportUrl,
    pub cachable: bool,
    pub cache: bool,
    pub islocal: bool,
    pub writeback: bool,
    pub push_permissions: bool,
}

pub struct Cache {
    root: PathBuf,
    servers: HashMap<String, ServerConfig>,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>, servers: HashMap<String, ServerConfig>) -> Self {
        Self {
            root: root.into(),
            servers,
        }
    }

    fn server(&self, name: &str) -> Result<&ServerConfig> {
        self.servers
            .get(name)
            .with_context(|| format!("unknown server {name:?}"))
    }

    pub fn valid_server(&self, server: &str) -> bool {
        self.servers.contains_key(server)
    }

    pub fn cache_enabled(&self, server: &str) -> bool {
        self.servers
            .get(server)
            .is_some_and(|s| s.cachable && s.cache)
    }

    /// Writeback requires both the server's `writeback` flag and
    /// `push_permissions`; `--enable-writeback`/`--disable-writeback` toggle
    /// the former per spec.md §6.
    pub fn writeback_enabled(&self, server: &str) -> bool {
        self.servers
            .get(server)
            .is_some_and(|s| s.writeback && s.push_permissions)
    }

    pub fn remote_url(&self, server: &str, location: &str) -> Result<url::Url> {
        self.server(server)?.url.join(location)
    }

    fn entry_path(&self, server: &str, location: &str) -> PathBuf {
        self.root.join(server).join(location)
    }

    /// `fetch_file_path(server, location)`: returns a local path to the
    /// content, fetching it first if it isn't already cached.
    #[instrument(skip(self))]
    pub fn fetch_file_path(
        &self,
        server: &str,
        location: &str,
        checksum: Option<&FileChecksum>,
    ) -> Result<PathBuf> {
        let entry = self.entry_path(server, location);
        if self.cache_enabled(server) {
            if let Some(path) = self.check_hit(&entry, checksum)? {
                return Ok(path);
            }
        }
        self.fetch_into_cache(server, location, checksum)
    }

    /// `fetch_file(server, location, destdir, destname?)`: like
    /// `fetch_file_path`, but additionally materializes the content at
    /// `destdir/destname` (hardlinked when possible, copied otherwise).
    #[instrument(skip(self))]
    pub fn fetch_file(
        &self,
        server: &str,
        location: &str,
        destdir: &Path,
        destname: Option<&str>,
        checksum: Option<&FileChecksum>,
    ) -> Result<PathBuf> {
        let cached = self.fetch_file_path(server, location, checksum)?;
        let basename = destname
            .map(str::to_string)
            .unwrap_or_else(|| basename_of(location));
        let dest = destdir.join(basename);
        fs::create_dir_all(destdir)?;
        if fs::hard_link(&cached, &dest).is_err() {
            fs::copy(&cached, &dest)
                .with_context(|| format!("failed to materialize {cached:?} at {dest:?}"))?;
        }
        Ok(dest)
    }

    /// `push_file(localpath, server, location)`.
    #[instrument(skip(self))]
    pub fn push_file(&self, local_path: &Path, server: &str, location: &str) -> Result<()> {
        let cfg = self.server(server)?;
        if !self.writeback_enabled(server) {
            bail!("writeback is not enabled for server {server:?}");
        }
        transport::push(&cfg.url, location, local_path)?;

        if self.cache_enabled(server) {
            let entry = self.entry_path(server, location);
            if let Some(parent) = entry.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(local_path, &entry)
                .with_context(|| format!("failed to mirror push into local cache at {entry:?}"))?;
        }
        Ok(())
    }

    fn check_hit(&self, entry: &Path, checksum: Option<&FileChecksum>) -> Result<Option<PathBuf>> {
        if !entry.exists() {
            return Ok(None);
        }
        if let Some(checksum) = checksum {
            let file = fs::File::open(entry)?;
            if !checksum.verify(file)? {
                // A stale or corrupted cache entry is treated as a miss, not
                // a fatal error: re-fetching repairs it.
                return Ok(None);
            }
        }
        Ok(Some(entry.to_path_buf()))
    }

    #[instrument(skip(self))]
    fn fetch_into_cache(
        &self,
        server: &str,
        location: &str,
        checksum: Option<&FileChecksum>,
    ) -> Result<PathBuf> {
        let cfg = self.server(server)?;
        let entry = self.entry_path(server, location);
        let lock_dir = entry
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&lock_dir)?;

        let _lock = DirLock::acquire(&lock_dir)
            .with_context(|| format!("failed to lock cache entry directory {lock_dir:?}"))?;

        // Another process may have populated the entry while we waited for
        // the lock.
        if self.cache_enabled(server) {
            if let Some(path) = self.check_hit(&entry, checksum)? {
                return Ok(path);
            }
        }

        let tmp_path = lock_dir.join(format!(".{}.part", basename_of(location)));
        transport::fetch(&cfg.url, location, &tmp_path)
            .with_context(|| format!("failed to fetch {server}:{location}"))?;

        if let Some(checksum) = checksum {
            let file = fs::File::open(&tmp_path)?;
            if !checksum.verify(file)? {
                let _ = fs::remove_file(&tmp_path);
                bail!(
                    "checksum mismatch fetching {server}:{location}: expected {}",
                    checksum.as_hex()
                );
            }
        }

        publish_atomically(&tmp_path, &entry)?;
        Ok(entry)
    }
}

fn basename_of(location: &str) -> String {
    Path::new(location)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_server(path: &Path) -> ServerConfig {
        ServerConfig {
            url: format!("file://{}/", path.display()).parse().unwrap(),
            cachable: true,
            cache: true,
            islocal: true,
            writeback: true,
            push_permissions: true,
        }
    }

    #[test]
    fn fetch_populates_cache_then_hits() {
        let origin = tempfile::tempdir().unwrap();
        fs::write(origin.path().join("hello.txt"), b"hello world").unwrap();

        let cache_root = tempfile::tempdir().unwrap();
        let mut servers = HashMap::new();
        servers.insert("origin".to_string(), file_server(origin.path()));
        let cache = Cache::new(cache_root.path(), servers);

        let checksum = FileChecksum::parse_sha1("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed").unwrap();
        let path1 = cache
            .fetch_file_path("origin", "hello.txt", Some(&checksum))
            .unwrap();
        assert_eq!(fs::read(&path1).unwrap(), b"hello world");

        // Remove the origin file: a second fetch must still hit the cache.
        fs::remove_file(origin.path().join("hello.txt")).unwrap();
        let path2 = cache
            .fetch_file_path("origin", "hello.txt", Some(&checksum))
            .unwrap();
        assert_eq!(path1, path2);
    }

    #[test]
    fn checksum_mismatch_is_fatal_and_does_not_populate_cache() {
        let origin = tempfile::tempdir().unwrap();
        fs::write(origin.path().join("hello.txt"), b"hello world").unwrap();

        let cache_root = tempfile::tempdir().unwrap();
        let mut servers = HashMap::new();
        servers.insert("origin".to_string(), file_server(origin.path()));
        let cache = Cache::new(cache_root.path(), servers);

        let wrong = FileChecksum::parse_sha1("0000000000000000000000000000000000000f").unwrap();
        let err = cache
            .fetch_file_path("origin", "hello.txt", Some(&wrong))
            .unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(!cache_root.path().join("origin/hello.txt").exists());
    }

    #[test]
    fn fetch_file_hardlinks_into_destdir() {
        let origin = tempfile::tempdir().unwrap();
        fs::write(origin.path().join("hello.txt"), b"hi").unwrap();

        let cache_root = tempfile::tempdir().unwrap();
        let mut servers = HashMap::new();
        servers.insert("origin".to_string(), file_server(origin.path()));
        let cache = Cache::new(cache_root.path(), servers);

        let destdir = tempfile::tempdir().unwrap();
        let dest = cache
            .fetch_file("origin", "hello.txt", destdir.path(), None, None)
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }

    #[test]
    fn writeback_requires_permission() {
        let root = tempfile::tempdir().unwrap();
        let mut servers = HashMap::new();
        let mut cfg = file_server(root.path());
        cfg.push_permissions = false;
        servers.insert("origin".to_string(), cfg);
        let cache = Cache::new(root.path(), servers);

        let local = root.path().join("artifact.tar");
        fs::write(&local, b"data").unwrap();
        let err = cache.push_file(&local, "origin", "artifact.tar").unwrap_err();
        assert!(err.to_string().contains("writeback"));
    }
}
