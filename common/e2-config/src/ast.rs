use std::collections::BTreeMap;

/// A value in the restricted configuration language.
///
/// Deliberately has no function type, no variable lookup beyond builder
/// arguments, and no way to construct an arbitrary callable: the language is
/// data, not code, which is what makes the evaluator (component D) safe to
/// run over untrusted-ish project config without a real sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Nil,
    /// A table written with only positional entries, e.g. `{"a", "b"}`.
    /// Order is preserved because several identity hashes (sourceid,
    /// licenceid, chrootgroupid) are sensitive to declaration order.
    List(Vec<ConfigValue>),
    /// A table written with only `key = value` entries, e.g.
    /// `{ server = ".", location = "x" }`.
    Dict(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Num(_) => "number",
            Self::Bool(_) => "bool",
            Self::Nil => "nil",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }
}

/// A single call to one of the whitelisted top-level builders
/// (`e2project`, `e2source`, `e2result`, `e2chroot`, `e2licence`, `env`,
/// `extensions`, `e2rc`), as written literally in a config file.
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderCall {
    pub builder: String,
    /// Positional string argument, e.g. the name in `e2source("foo", {...})`
    /// or the include path in `env "path/to/file"`.
    pub name_arg: Option<String>,
    /// The table argument, if any (`e2source("foo", { ... })` or
    /// `env { ... }`).
    pub table_arg: Option<ConfigValue>,
    /// 1-based line number the call starts on, for diagnostics.
    pub line: u32,
}
