//! Tree-walking evaluator: turns parsed [`BuilderCall`]s into
//! [`EvaluatedEntry`] values, checking that only whitelisted builders are
//! called and that their dict keys are recognized.
//!
//! This is the sandbox boundary: nothing past this module ever executes
//! anything from the config file other than reading the [`ConfigValue`]
//! tree it produced. There is no way for a config file to reach the
//! filesystem, spawn a process, or call an arbitrary function.

use std::path::Path;

use e2_error::{EngineError, ErrorCategory, SourceLocation, WarningClass};

use crate::ast::{BuilderCall, ConfigValue};
use crate::{parser, schema};

/// The builders a config file may call at all (spec.md §4.1).
const WHITELISTED_BUILDERS: &[&str] = &[
    "e2project",
    "e2source",
    "e2result",
    "e2chroot",
    "e2licence",
    "env",
    "extensions",
    "e2rc",
];

/// One evaluated top-level call, with its originating file attached for
/// diagnostics further down the pipeline (component H's model builders).
#[derive(Debug, Clone)]
pub struct EvaluatedEntry {
    pub builder: String,
    pub name: Option<String>,
    pub table: ConfigValue,
    pub location: SourceLocation,
}

/// A non-fatal diagnostic raised while evaluating a file, e.g. a deprecated
/// key. Fatal problems are returned as `Err` instead.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub class: WarningClass,
    pub message: String,
    pub location: SourceLocation,
}

pub struct EvalOutcome {
    pub entries: Vec<EvaluatedEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parses and evaluates one file's source text, without following any
/// inclusion (`env "path"` is returned as-is in `name` with an empty table,
/// for the loader to resolve).
pub fn eval_file(file: &Path, source: &str) -> Result<EvalOutcome, EngineError> {
    let calls = parser::parse_calls(source).map_err(|message| {
        EngineError::at(
            ErrorCategory::Configuration,
            SourceLocation::new(file, 1),
            anyhow::anyhow!("{message}"),
        )
    })?;

    let mut entries = Vec::new();
    let mut diagnostics = Vec::new();

    for call in calls {
        let loc = SourceLocation::new(file, call.line);
        check_whitelisted(&call, &loc)?;
        check_keys(&call, &loc, &mut diagnostics)?;

        let table = call.table_arg.clone().unwrap_or(ConfigValue::Dict(Default::default()));
        entries.push(EvaluatedEntry {
            builder: call.builder,
            name: call.name_arg,
            table,
            location: loc,
        });
    }

    Ok(EvalOutcome { entries, diagnostics })
}

fn check_whitelisted(call: &BuilderCall, loc: &SourceLocation) -> Result<(), EngineError> {
    if WHITELISTED_BUILDERS.contains(&call.builder.as_str()) {
        return Ok(());
    }
    Err(EngineError::at(
        ErrorCategory::Configuration,
        loc.clone(),
        anyhow::anyhow!("`{}` is not a recognized builder", call.builder),
    ))
}

fn check_keys(
    call: &BuilderCall,
    loc: &SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<(), EngineError> {
    let Some(allowed) = schema::allowed_keys(&call.builder) else {
        return Ok(());
    };
    let Some(ConfigValue::Dict(map)) = &call.table_arg else {
        return Ok(());
    };
    for key in map.keys() {
        if allowed.contains(&key.as_str()) {
            continue;
        }
        if let Some(reason) = schema::deprecated_key(&call.builder, key) {
            diagnostics.push(Diagnostic {
                class: WarningClass::Deprecated,
                message: format!("`{key}` in `{}` is deprecated: {reason}", call.builder),
                location: loc.clone(),
            });
            continue;
        }
        return Err(EngineError::at(
            ErrorCategory::Configuration,
            loc.clone(),
            anyhow::anyhow!(
                "unknown key `{key}` in `{}` (known keys: {})",
                call.builder,
                allowed.join(", ")
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_typo_key() {
        let src = r#"e2project("x", { nmae = "x" })"#;
        let err = eval_file(&PathBuf::from("proj/config"), src).unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn rejects_unknown_builder() {
        let src = r#"e2bogus("x", { })"#;
        let err = eval_file(&PathBuf::from("proj/config"), src).unwrap_err();
        assert!(err.to_string().contains("not a recognized builder"));
    }

    #[test]
    fn accepts_known_keys() {
        let src = r#"e2project("x", { release_id = "v1" })"#;
        let outcome = eval_file(&PathBuf::from("proj/config"), src).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn flags_deprecated_key_as_warning_not_error() {
        let src = r#"e2source("hello", { type = "files", sourceid = "abc" })"#;
        let outcome = eval_file(&PathBuf::from("src/hello/config"), src).unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].class, WarningClass::Deprecated);
    }

    #[test]
    fn env_dict_keys_are_unchecked() {
        let src = r#"env { ANYTHING_GOES = "1" }"#;
        let outcome = eval_file(&PathBuf::from("proj/env"), src).unwrap();
        assert!(outcome.diagnostics.is_empty());
    }
}
