//! Small extraction helpers for pulling typed values out of an
//! [`e2_config::ConfigValue`] dict, shared by every entity builder in
//! `tree.rs`. Centralized here so every "wrong type for key X" error reads
//! the same way across `e2project`/`e2source`/`e2result`/`e2chroot`/
//! `e2licence`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use e2_config::ConfigValue;
use e2_env::Environment;
use e2_fileref::FileRef;
use e2_url::ServerLocation;

pub type Dict = BTreeMap<String, ConfigValue>;

pub fn str_field<'a>(map: &'a Dict, key: &str) -> Result<&'a str> {
    map.get(key)
        .with_context(|| format!("missing required key `{key}`"))?
        .as_str()
        .with_context(|| format!("key `{key}` must be a string"))
}

pub fn opt_str_field<'a>(map: &'a Dict, key: &str) -> Result<Option<&'a str>> {
    match map.get(key) {
        None | Some(ConfigValue::Nil) => Ok(None),
        Some(value) => Ok(Some(
            value.as_str().with_context(|| format!("key `{key}` must be a string"))?,
        )),
    }
}

pub fn bool_field(map: &Dict, key: &str, default: bool) -> Result<bool> {
    match map.get(key) {
        None => Ok(default),
        Some(value) => value.as_bool().with_context(|| format!("key `{key}` must be a bool")),
    }
}

/// A list of plain strings, e.g. `default_results = {"a", "b"}`.
pub fn str_list_field(map: &Dict, key: &str) -> Result<Vec<String>> {
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(value) => {
            let list = value.as_list().with_context(|| format!("key `{key}` must be a list"))?;
            list.iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .with_context(|| format!("every entry of `{key}` must be a string"))
                })
                .collect()
        }
    }
}

/// A list of file-entry dicts, e.g. `file = { { server = ".", location = "x" } }`.
/// A single bare dict (not wrapped in a list) is also accepted, for the
/// common case of exactly one file.
pub fn dict_list_field<'a>(map: &'a Dict, key: &str) -> Result<Vec<&'a Dict>> {
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(ConfigValue::Dict(single)) => Ok(vec![single]),
        Some(ConfigValue::List(items)) => items
            .iter()
            .map(|item| {
                item.as_dict()
                    .with_context(|| format!("every entry of `{key}` must be a table"))
            })
            .collect(),
        Some(other) => bail!("key `{key}` must be a table or a list of tables, found {}", other.type_name()),
    }
}

/// Parses a `{ server = ..., location = ..., sha1 = ..., sha256 = ...,
/// hashupdate = ... }` table into a [`FileRef`]. `config_path` is recorded on
/// the result so a later `hashupdate` can find its way back to the file it
/// came from.
pub fn file_ref_from_dict(entry: &Dict, config_path: &Path) -> Result<FileRef> {
    let server = str_field(entry, "server")?;
    let location = str_field(entry, "location")?;
    let mut file_ref = FileRef::new(ServerLocation::new(server, location));
    file_ref.sha1 = opt_str_field(entry, "sha1")?.map(str::to_string);
    file_ref.sha256 = opt_str_field(entry, "sha256")?.map(str::to_string);
    file_ref.hashupdate = bool_field(entry, "hashupdate", false)?;
    file_ref.config_path = Some(config_path.to_path_buf());
    Ok(file_ref)
}

/// Parses an inline `env = { KEY = "value", ... }` table, defaulting to an
/// empty [`Environment`] when the key is absent.
pub fn env_field(map: &Dict, key: &str) -> Result<Environment> {
    match map.get(key) {
        None => Ok(Environment::new()),
        Some(value) => {
            let dict = value
                .as_dict()
                .with_context(|| format!("key `{key}` must be a table of KEY = \"value\" entries"))?;
            let mut env = Environment::new();
            for (k, v) in dict {
                let v = v
                    .as_str()
                    .with_context(|| format!("environment value for `{k}` must be a string"))?;
                env.insert(k.clone(), v);
            }
            Ok(env)
        }
    }
}

pub fn as_dict(value: &ConfigValue, what: &str) -> Result<&Dict> {
    value.as_dict().with_context(|| format!("{what} must be a table"))
}
