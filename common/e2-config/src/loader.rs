//! Drives the evaluator over a project tree: resolves `env "path"`
//! inclusion, detects inclusion cycles, and enforces "one top-level builder
//! call per file" for every file except `proj/env` (and files it includes),
//! which is allowed to compose several `env` calls.

use std::fs;
use std::path::{Path, PathBuf};

use e2_error::{EngineError, ErrorCategory, SourceLocation};
use e2_env::Environment;

use crate::ast::ConfigValue;
use crate::eval::{self, Diagnostic, EvaluatedEntry};

/// Loads a single non-`env` config file (`proj/config`, `proj/chroot`,
/// `proj/licence/*`, `src/*/config`, `res/*/config`) and checks that it
/// declares exactly one top-level builder call.
pub fn load_entity_file(file: &Path) -> Result<(EvaluatedEntry, Vec<Diagnostic>), EngineError> {
    let source = read_file(file)?;
    let outcome = eval::eval_file(file, &source)?;

    if outcome.entries.len() != 1 {
        return Err(EngineError::at(
            ErrorCategory::Configuration,
            SourceLocation::new(file, 1),
            anyhow::anyhow!(
                "{} must declare exactly one top-level builder call, found {}",
                file.display(),
                outcome.entries.len()
            ),
        ));
    }

    Ok((outcome.entries.into_iter().next().unwrap(), outcome.diagnostics))
}

/// Loads `proj/env`, recursively resolving `env "relative/path"` inclusions
/// against `root`, and merges every `env { ... }` call's entries in
/// declaration order (later entries win, matching [`Environment::insert`]'s
/// overwrite semantics).
pub fn load_env_tree(root: &Path) -> Result<Environment, EngineError> {
    let mut env = Environment::new();
    let mut visiting = Vec::new();
    load_env_file(root, Path::new("proj/env"), &mut visiting, &mut env)?;
    Ok(env)
}

fn load_env_file(
    root: &Path,
    rel: &Path,
    visiting: &mut Vec<PathBuf>,
    env: &mut Environment,
) -> Result<(), EngineError> {
    let rel = rel.to_path_buf();
    if visiting.contains(&rel) {
        let mut cycle: Vec<String> = visiting.iter().map(|p| p.display().to_string()).collect();
        cycle.push(rel.display().to_string());
        return Err(EngineError::at(
            ErrorCategory::Configuration,
            SourceLocation::new(&rel, 1),
            anyhow::anyhow!("environment inclusion cycle: {}", cycle.join(" -> ")),
        ));
    }

    let full = root.join(&rel);
    let source = read_file(&full)?;
    let outcome = eval::eval_file(&rel, &source)?;

    visiting.push(rel.clone());
    for entry in outcome.entries {
        if entry.builder != "env" {
            return Err(EngineError::at(
                ErrorCategory::Configuration,
                entry.location.clone(),
                anyhow::anyhow!("only `env` calls are allowed in an environment file"),
            ));
        }
        match (&entry.name, &entry.table) {
            (Some(path), ConfigValue::Dict(map)) if map.is_empty() => {
                load_env_file(root, Path::new(path), visiting, env)?;
            }
            (None, ConfigValue::Dict(map)) => {
                for (key, value) in map {
                    let value = value.as_str().ok_or_else(|| {
                        EngineError::at(
                            ErrorCategory::Configuration,
                            entry.location.clone(),
                            anyhow::anyhow!("environment value for `{key}` must be a string"),
                        )
                    })?;
                    env.insert(key.clone(), value);
                }
            }
            _ => {
                return Err(EngineError::at(
                    ErrorCategory::Configuration,
                    entry.location.clone(),
                    anyhow::anyhow!(r#"`env` must be called as `env {{ ... }}` or `env "path"`"#),
                ));
            }
        }
    }
    visiting.pop();
    Ok(())
}

fn read_file(path: &Path) -> Result<String, EngineError> {
    fs::read_to_string(path).map_err(|e| {
        EngineError::at(
            ErrorCategory::Configuration,
            SourceLocation::new(path, 1),
            anyhow::anyhow!(e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_two_builder_calls_in_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config");
        fs::write(&file, r#"e2project("a", {}) e2project("b", {})"#).unwrap();
        let err = load_entity_file(&file).unwrap_err();
        assert!(err.to_string().contains("exactly one top-level builder call"));
    }

    #[test]
    fn loads_env_with_inclusion() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proj")).unwrap();
        fs::write(
            dir.path().join("proj/env"),
            r#"env { TOP = "1" }
env "proj/extra_env""#,
        )
        .unwrap();
        fs::write(dir.path().join("proj/extra_env"), r#"env { NESTED = "2" }"#).unwrap();

        let env = load_env_tree(dir.path()).unwrap();
        assert_eq!(env.get("TOP"), Some("1"));
        assert_eq!(env.get("NESTED"), Some("2"));
    }

    #[test]
    fn detects_inclusion_cycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proj")).unwrap();
        fs::write(dir.path().join("proj/env"), r#"env "proj/env""#).unwrap();

        let err = load_env_tree(dir.path()).unwrap_err();
        assert!(err.to_string().contains("cycle") || format!("{err:?}").contains("cycle"));
    }

    #[test]
    fn later_env_entry_overrides_earlier() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proj")).unwrap();
        fs::write(
            dir.path().join("proj/env"),
            r#"env { A = "first" }
env { A = "second" }"#,
        )
        .unwrap();
        let env = load_env_tree(dir.path()).unwrap();
        assert_eq!(env.get("A"), Some("second"));
    }
}
