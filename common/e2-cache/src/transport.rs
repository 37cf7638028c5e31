//! The actual byte-moving side of component F: one function per transport
//! scheme, each writing its fetched bytes to a caller-supplied temp path so
//! the cache layer can publish (or discard) the result atomically.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use e2_url::{Transport, TransportUrl};

pub fn fetch(server_url: &TransportUrl, location: &str, dest_tmp: &Path) -> Result<()> {
    match server_url.transport {
        Transport::File => fetch_file_transport(server_url, location, dest_tmp),
        Transport::Http | Transport::Https => fetch_http(server_url, location, dest_tmp),
        Transport::Rsync | Transport::RsyncSsh => fetch_rsync(server_url, location, dest_tmp),
        Transport::Scp | Transport::Ssh => fetch_scp(server_url, location, dest_tmp),
        other => bail!("{other:?} is not a file-fetch transport (SCM drivers handle it)"),
    }
}

pub fn push(server_url: &TransportUrl, location: &str, local_path: &Path) -> Result<()> {
    match server_url.transport {
        Transport::File => {
            let remote = remote_path(server_url, location)?;
            if let Some(parent) = remote.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(local_path, &remote)
                .with_context(|| format!("failed to copy {local_path:?} to {remote:?}"))?;
            Ok(())
        }
        Transport::Rsync | Transport::RsyncSsh => {
            let dest = rsync_spec(server_url, location)?;
            e2_signal::run_and_check(Command::new("rsync").arg("-a").arg(local_path).arg(dest))
        }
        Transport::Scp | Transport::Ssh => {
            let dest = scp_spec(server_url, location)?;
            e2_signal::run_and_check(Command::new("scp").arg(local_path).arg(dest))
        }
        other => bail!("{other:?} servers do not support writeback"),
    }
}

fn remote_path(server_url: &TransportUrl, location: &str) -> Result<std::path::PathBuf> {
    let url = server_url.join(location)?;
    url.to_file_path()
        .map_err(|()| anyhow::anyhow!("file:// URL {url} has no local path"))
}

fn fetch_file_transport(server_url: &TransportUrl, location: &str, dest_tmp: &Path) -> Result<()> {
    let source = remote_path(server_url, location)?;
    fs::copy(&source, dest_tmp)
        .with_context(|| format!("failed to copy {source:?} to {dest_tmp:?}"))?;
    Ok(())
}

fn fetch_http(server_url: &TransportUrl, location: &str, dest_tmp: &Path) -> Result<()> {
    let url = server_url.join(location)?;
    let response = reqwest::blocking::get(url.clone())
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("{url} returned an error status"))?;
    let bytes = response
        .bytes()
        .with_context(|| format!("failed to read response body from {url}"))?;
    let mut out = fs::File::create(dest_tmp)?;
    out.write_all(&bytes)?;
    Ok(())
}

/// Builds the `host:path` (or `user@host:path`) argument rsync/scp expect,
/// joining the server's base path with `location`.
fn host_path_spec(server_url: &TransportUrl, location: &str) -> Result<String> {
    let url = &server_url.url;
    let host = url
        .host_str()
        .with_context(|| format!("{url} has no host"))?;
    let userinfo = if url.username().is_empty() {
        String::new()
    } else {
        format!("{}@", url.username())
    };
    let base = url.path().trim_start_matches('/');
    let joined = if base.is_empty() {
        location.to_string()
    } else {
        format!("{base}/{location}")
    };
    Ok(format!("{userinfo}{host}:{joined}"))
}

fn rsync_spec(server_url: &TransportUrl, location: &str) -> Result<String> {
    host_path_spec(server_url, location)
}

fn scp_spec(server_url: &TransportUrl, location: &str) -> Result<String> {
    host_path_spec(server_url, location)
}

fn fetch_rsync(server_url: &TransportUrl, location: &str, dest_tmp: &Path) -> Result<()> {
    let source = rsync_spec(server_url, location)?;
    e2_signal::run_and_check(Command::new("rsync").arg("-a").arg(source).arg(dest_tmp))
}

fn fetch_scp(server_url: &TransportUrl, location: &str, dest_tmp: &Path) -> Result<()> {
    let source = scp_spec(server_url, location)?;
    e2_signal::run_and_check(Command::new("scp").arg(source).arg(dest_tmp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_transport_copies_bytes() {
        let srcdir = tempfile::tempdir().unwrap();
        fs::write(srcdir.path().join("a.txt"), b"hello").unwrap();
        let url: TransportUrl = format!("file://{}/", srcdir.path().display())
            .parse()
            .unwrap();

        let destdir = tempfile::tempdir().unwrap();
        let dest_tmp = destdir.path().join("dl.tmp");
        fetch(&url, "a.txt", &dest_tmp).unwrap();

        assert_eq!(fs::read(&dest_tmp).unwrap(), b"hello");
    }

    #[test]
    fn host_path_spec_includes_user_and_base() {
        let url: TransportUrl = "scp://builder@cache.example.com/srv/cache".parse().unwrap();
        let spec = host_path_spec(&url, "hello.txt").unwrap();
        assert_eq!(spec, "builder@cache.example.com:srv/cache/hello.txt");
    }
}
