//! Server/location references and external transport URLs (component C).
//!
//! Two distinct things get parsed here:
//!
//! - A [`ServerLocation`] is how File references (component E) and SCM
//!   sources name where to fetch from: a symbolic server name known to the
//!   project's global config, plus a path on that server. The special
//!   server name `.` means "in-project" (the file lives alongside the
//!   config, not on a remote server).
//! - A [`TransportUrl`] is how the global config's `servers[name].url` key
//!   names the actual remote endpoint a server resolves to, and is a real
//!   URL with one of the transport schemes component F supports.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// The special server name meaning "the file lives next to the project
/// config, not on a remote server" (spec.md §3, File reference).
pub const IN_PROJECT_SERVER: &str = ".";

/// A `server:location` reference, as written in project config.
///
/// Unlike a URL, the server component is a symbolic name resolved later
/// against the project's `servers` table (component F); it is *not* a host
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerLocation {
    pub server: String,
    pub location: String,
}

impl ServerLocation {
    pub fn new(server: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            location: location.into(),
        }
    }

    pub fn is_in_project(&self) -> bool {
        self.server == IN_PROJECT_SERVER
    }
}

impl fmt::Display for ServerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.location)
    }
}

impl FromStr for ServerLocation {
    type Err = anyhow::Error;

    /// Parses `server:location`. The location may itself contain colons
    /// (e.g. a Windows-style path is never expected here, but a location
    /// like `archive:v2/foo.tar` containing a literal colon is), so only the
    /// first colon is treated as the separator.
    fn from_str(s: &str) -> Result<Self> {
        let (server, location) = s
            .split_once(':')
            .with_context(|| format!("not a server:location reference: {s:?}"))?;
        if server.is_empty() {
            bail!("empty server name in {s:?}");
        }
        if location.is_empty() {
            bail!("empty location in {s:?}");
        }
        Ok(Self::new(server, location))
    }
}

/// The transport schemes component F knows how to fetch/push through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    File,
    Http,
    Https,
    Rsync,
    RsyncSsh,
    Scp,
    Ssh,
    Git,
    Svn,
    Cvs,
}

impl Transport {
    fn from_scheme(scheme: &str) -> Result<Self> {
        Ok(match scheme {
            "file" => Self::File,
            "http" => Self::Http,
            "https" => Self::Https,
            "rsync" => Self::Rsync,
            "rsync+ssh" => Self::RsyncSsh,
            "scp" => Self::Scp,
            "ssh" => Self::Ssh,
            "git" => Self::Git,
            "svn" => Self::Svn,
            "cvs" => Self::Cvs,
            other => bail!("unsupported transport scheme: {other:?}"),
        })
    }
}

/// An external URL naming where a server actually resolves to, e.g.
/// `rsync://cache.example.com/artifacts`.
#[derive(Debug, Clone)]
pub struct TransportUrl {
    pub transport: Transport,
    pub url: url::Url,
}

impl FromStr for TransportUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = url::Url::parse(s).with_context(|| format!("invalid server URL: {s:?}"))?;
        let transport = Transport::from_scheme(url.scheme())?;
        Ok(Self { transport, url })
    }
}

impl TransportUrl {
    /// Joins a location onto this server's base URL, used when resolving a
    /// `ServerLocation` to a concrete remote address.
    pub fn join(&self, location: &str) -> Result<url::Url> {
        self.url
            .join(location)
            .with_context(|| format!("cannot join {location:?} onto {}", self.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_location() {
        let sl: ServerLocation = "myserver:path/to/file.tar".parse().unwrap();
        assert_eq!(sl.server, "myserver");
        assert_eq!(sl.location, "path/to/file.tar");
    }

    #[test]
    fn in_project_server_recognized() {
        let sl: ServerLocation = ".:hello.txt".parse().unwrap();
        assert!(sl.is_in_project());
    }

    #[test]
    fn location_may_contain_colons() {
        let sl: ServerLocation = "archive:v2:foo.tar".parse().unwrap();
        assert_eq!(sl.location, "v2:foo.tar");
    }

    #[test]
    fn rejects_missing_colon() {
        assert!("no-colon-here".parse::<ServerLocation>().is_err());
    }

    #[test]
    fn parses_transport_url() {
        let t: TransportUrl = "rsync://cache.example.com/artifacts".parse().unwrap();
        assert_eq!(t.transport, Transport::Rsync);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!("ftp://example.com".parse::<TransportUrl>().is_err());
    }
}
