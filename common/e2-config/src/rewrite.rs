//! The one config-mutating operation the engine performs: rewriting a File
//! reference's checksum field in place after a `hashupdate` recomputation
//! (component E, spec.md §9).
//!
//! The config language (§4.1) has no writer of its own — entries are parsed
//! once and never round-tripped back through the AST — so this works
//! directly on the source text, locating the `{ ... }` table that declares
//! `location` and patching just its checksum field.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

/// Rewrites (or inserts) `field = "value"` inside the file entry whose
/// `location` key matches `location`, within `path`'s source text.
pub fn persist_checksum_field(path: &Path, location: &str, field: &str, value: &str) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let updated = rewrite_checksum_field(&text, location, field, value)
        .with_context(|| format!("{path:?} has no file entry for location {location:?}"))?;
    fs::write(path, updated).with_context(|| format!("failed to write {path:?}"))
}

fn rewrite_checksum_field(text: &str, location: &str, field: &str, value: &str) -> Option<String> {
    let location_re = Regex::new(&format!(r#"location\s*=\s*"{}""#, regex::escape(location))).unwrap();
    let loc_match = location_re.find(text)?;

    // The entry's closing brace is the first `}` after `location` that isn't
    // closing a nested table opened after it.
    let mut depth = 0i32;
    let mut close = None;
    for (i, c) in text[loc_match.end()..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => {
                close = Some(loc_match.end() + i);
                break;
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    let close = close?;
    let entry = &text[loc_match.end()..close];

    let field_re = Regex::new(&format!(r#"{field}\s*=\s*"[^"]*""#)).unwrap();
    let new_field = format!(r#"{field} = "{value}""#);
    let rewritten_entry = if let Some(m) = field_re.find(entry) {
        let mut s = entry.to_string();
        s.replace_range(m.range(), &new_field);
        s
    } else {
        format!("{entry}, {new_field}")
    };

    let mut result = String::with_capacity(text.len() + new_field.len() + 2);
    result.push_str(&text[..loc_match.end()]);
    result.push_str(&rewritten_entry);
    result.push_str(&text[close..]);
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_checksum_field_when_absent() {
        let text = r#"e2source("s", { type = "files", file = { server = ".", location = "hello.txt" } })"#;
        let out = rewrite_checksum_field(text, "hello.txt", "sha256", "abc123").unwrap();
        assert!(out.contains(r#"sha256 = "abc123""#));
        assert!(out.contains(r#"location = "hello.txt""#));
    }

    #[test]
    fn replaces_existing_checksum_field() {
        let text = r#"file = { location = "hello.txt", sha256 = "old" }"#;
        let out = rewrite_checksum_field(text, "hello.txt", "sha256", "new").unwrap();
        assert!(out.contains(r#"sha256 = "new""#));
        assert!(!out.contains("\"old\""));
    }

    #[test]
    fn leaves_other_entries_untouched() {
        let text = r#"file = { { server = ".", location = "a.txt" }, { server = ".", location = "b.txt", sha256 = "keep" } }"#;
        let out = rewrite_checksum_field(text, "a.txt", "sha256", "new").unwrap();
        assert!(out.contains(r#"location = "a.txt", sha256 = "new""#));
        assert!(out.contains(r#"sha256 = "keep""#));
    }

    #[test]
    fn unknown_location_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, r#"file = { location = "a.txt" }"#).unwrap();
        let err = persist_checksum_field(&path, "missing.txt", "sha256", "x").unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
