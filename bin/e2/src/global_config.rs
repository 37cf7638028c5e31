//! Global configuration file (spec.md §6): site defaults, tool paths, and
//! the `servers` table the cache/transport layer resolves against.
//!
//! Grounded on the teacher pack's `shipper-config` crate: a plain
//! `serde`+`toml` struct with `#[serde(default)]` on every section, loaded
//! from disk and handed to the rest of the binary as a value, not a global.
//! Unlike `shipper-config`'s single-directory lookup, e2's search order is a
//! fixed list of well-known absolute locations rather than a walk-up, so
//! `find_config` here enumerates candidates instead of climbing parents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use e2_cache::ServerConfig;
use serde::Deserialize;

/// The e2 "protocol version" baked into versioned config file names
/// (`e2.conf-2.3`) and the chroot-helper wire protocol (`chroot_2_3`).
pub const VERSION: &str = "2.3";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub log: LogConfig,
    pub site: SiteConfig,
    pub tools: HashMap<String, ToolConfig>,
    pub cache: CacheConfig,
    pub servers: HashMap<String, ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub logrotate: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { logrotate: 5 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub e2_server: Option<String>,
    pub e2_location: Option<String>,
    pub e2_base: Option<String>,
    pub e2_branch: Option<String>,
    pub e2_tag: Option<String>,
    pub tmpdir: Option<PathBuf>,
    pub default_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub path: Option<String>,
    pub flags: Vec<String>,
    pub enabled: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: None,
            flags: Vec::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub url: String,
    #[serde(default)]
    pub cachable: bool,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub islocal: bool,
    #[serde(default)]
    pub writeback: bool,
    #[serde(default)]
    pub push_permissions: bool,
}

impl GlobalConfig {
    /// Resolves the `servers` table into the form `e2-cache::Cache` wants,
    /// parsing each entry's URL eagerly so a malformed server is caught at
    /// startup rather than on first fetch.
    pub fn resolve_servers(&self) -> Result<HashMap<String, ServerConfig>> {
        self.servers
            .iter()
            .map(|(name, entry)| {
                let url = entry
                    .url
                    .parse()
                    .with_context(|| format!("server {name:?} has an invalid url: {:?}", entry.url))?;
                Ok((
                    name.clone(),
                    ServerConfig {
                        url,
                        cachable: entry.cachable,
                        cache: entry.cache,
                        islocal: entry.islocal,
                        writeback: entry.writeback,
                        push_permissions: entry.push_permissions,
                    },
                ))
            })
            .collect()
    }
}

/// The fixed, ordered list of places a global config file may live
/// (spec.md §6). Earlier entries win; `--e2-config`/`$E2_CONFIG` always take
/// precedence over anything installed on the system.
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var("E2_CONFIG") {
        candidates.push(PathBuf::from(env_path));
    }
    candidates.push(PathBuf::from(".e2/e2config"));
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        candidates.push(home.join(format!(".e2/e2.conf-{VERSION}")));
        candidates.push(home.join(".e2/e2.conf"));
    }
    candidates.push(PathBuf::from(format!("/etc/e2/e2.conf-{VERSION}")));
    candidates.push(PathBuf::from("/etc/e2/e2.conf"));
    candidates
}

/// Loads the first config file found along [`search_paths`], applying a
/// sibling `e2.conf.local` as a deep-merged override if one exists next to
/// it.
pub fn load(explicit: Option<&Path>) -> Result<GlobalConfig> {
    let candidates = search_paths(explicit);
    let chosen = candidates
        .iter()
        .find(|path| path.is_file())
        .with_context(|| {
            format!(
                "no e2 configuration file found (searched: {})",
                candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
            )
        })?;
    load_file(chosen)
}

fn load_file(path: &Path) -> Result<GlobalConfig> {
    let base_text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read global config {path:?}"))?;
    let mut value: toml::Value = base_text
        .parse()
        .with_context(|| format!("failed to parse {path:?} as TOML"))?;

    let local_path = path.with_file_name("e2.conf.local");
    if local_path.is_file() {
        let local_text = std::fs::read_to_string(&local_path)
            .with_context(|| format!("failed to read {local_path:?}"))?;
        let local_value: toml::Value = local_text
            .parse()
            .with_context(|| format!("failed to parse {local_path:?} as TOML"))?;
        merge_toml(&mut value, local_value);
    }

    value.try_into().with_context(|| format!("invalid global config in {path:?}"))
}

/// Deep-merges `overlay` into `base`, `overlay`'s scalars and tables winning
/// at every key; arrays are replaced wholesale rather than concatenated.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(base_value) => merge_toml(base_value, overlay_value),
                    None => {
                        base_table.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_everything_else() {
        std::env::set_var("E2_CONFIG", "/should/not/be/used");
        let candidates = search_paths(Some(Path::new("/explicit/e2.conf")));
        std::env::remove_var("E2_CONFIG");
        assert_eq!(candidates[0], PathBuf::from("/explicit/e2.conf"));
    }

    #[test]
    fn parses_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2.conf");
        std::fs::write(
            &path,
            r#"
            [log]
            logrotate = 3

            [servers.upstream]
            url = "https://example.com/artifacts"
            cachable = true
            cache = true
            "#,
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.log.logrotate, 3);
        assert!(config.servers.get("upstream").unwrap().cachable);
    }

    #[test]
    fn local_override_merges_over_base() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2.conf");
        std::fs::write(
            &path,
            r#"
            [log]
            logrotate = 3
            [servers.upstream]
            url = "https://example.com"
            cachable = true
            "#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("e2.conf.local"),
            r#"
            [log]
            logrotate = 9
            "#,
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.log.logrotate, 9);
        assert!(config.servers.get("upstream").unwrap().cachable);
    }

    #[test]
    fn missing_config_is_a_clear_error() {
        std::env::remove_var("E2_CONFIG");
        let err = load(Some(Path::new("/definitely/not/there.conf"))).unwrap_err();
        assert!(err.to_string().contains("no e2 configuration file found"));
    }
}
