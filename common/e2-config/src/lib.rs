//! The configuration loader (component D): a restricted declarative
//! language (§4.1) that the rest of the engine evaluates into project,
//! source, result, chroot, and licence definitions.
//!
//! A config file calls exactly one of a fixed set of builders
//! (`e2project`, `e2source`, `e2result`, `e2chroot`, `e2licence`, `env`,
//! `extensions`, `e2rc`) with a name and/or a table argument. The language
//! has no variables, no control flow, and no access to the filesystem or
//! process beyond what the builder call itself captures — evaluating a
//! config file can't do anything but build a [`ConfigValue`] tree.
//!
//! ```text
//! ast    — the ConfigValue/BuilderCall data model
//! parser — nom combinators turning source text into BuilderCalls
//! schema — per-builder key whitelists (catches typos like `nmae`)
//! eval   — whitelist + schema checking, one file at a time
//! loader — drives eval over a project tree, resolving `env` inclusion
//! ```

mod ast;
mod eval;
mod loader;
mod parser;
mod rewrite;
mod schema;

pub use ast::{BuilderCall, ConfigValue};
pub use eval::{eval_file, Diagnostic, EvalOutcome, EvaluatedEntry};
pub use loader::{load_entity_file, load_env_tree};
pub use parser::parse_calls;
pub use rewrite::persist_checksum_field;
