//! Per-builder key whitelists, used to catch the "typo in a key name"
//! failure mode (spec.md scenario S2: `nmae = "x"` in `proj/config`).
//!
//! Builders whose dict keys are themselves user-chosen names (`env`,
//! `extensions`, `e2rc`) have no whitelist: any key is legal there by
//! construction. Builders with a fixed, well-known set of fields get a
//! whitelist, and anything else is a hard load error.

/// Known keys for each whitelisted builder's table argument. `None` means
/// "don't check" — the table's keys are themselves data, not schema.
pub fn allowed_keys(builder: &str) -> Option<&'static [&'static str]> {
    match builder {
        "e2project" => Some(&[
            "release_id",
            "default_results",
            "chroot_arch",
            "checksums",
            "chroot_groups",
        ]),
        "e2chroot" => Some(&["groups"]),
        "e2licence" => Some(&["file"]),
        "e2result" => Some(&[
            "type",
            "sources",
            "depends",
            "env",
            "chroot",
            "licences",
        ]),
        "e2source" => Some(&[
            "type",
            "env",
            "licences",
            "file",
            "server",
            "location",
            "branch",
            "tag",
            "working",
            "cvsroot",
            "module",
            "materialize",
            "sourceid",
        ]),
        "env" | "extensions" | "e2rc" => None,
        _ => None,
    }
}

/// A handful of renamed-but-still-accepted keys, reported as
/// [`e2_error::WarningClass::Deprecated`] rather than rejected outright.
pub fn deprecated_key(builder: &str, key: &str) -> Option<&'static str> {
    match (builder, key) {
        ("e2source", "sourceid") => Some("sourceid is derived automatically and no longer read from config"),
        _ => None,
    }
}
