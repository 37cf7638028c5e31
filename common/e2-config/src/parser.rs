//! Parser for the declarative configuration language (spec.md §4.1).
//!
//! The grammar is small on purpose: literals, lists, dicts, and calls to a
//! builder name. There is no arithmetic, no control flow, and no way to
//! reference a value other than through a builder's own arguments.
//!
//! ```text
//! file      := (ws | comment)* call ((ws | comment)* call)* (ws | comment)*
//! call      := ident ws* ( "(" arg_list? ")" | table | string )
//! arg_list  := value (ws* "," ws* value)* ws* ","?
//! value     := string | number | bool | nil | table | list
//! table     := "{" (ws|comment)* entries? (ws|comment)* "}"
//! entries   := entry ((ws|comment)* "," (ws|comment)* entry)* (ws|comment)* ","?
//! entry     := (ident ws* "=" ws* value) | value
//! comment   := "--" (not newline)* newline
//! ```

use std::collections::BTreeMap;

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_while, take_while1};
use nom::character::complete::{anychar, char, digit1, multispace1};
use nom::combinator::{cut, map, opt, recognize, value as nom_value, verify};
use nom::error::{context, VerboseError};
use nom::multi::{many0, many_till, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated, tuple};
use nom::{IResult, Offset};

use crate::ast::{BuilderCall, ConfigValue};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn line_comment(input: &str) -> PResult<'_, ()> {
    nom_value((), pair(tag("--"), is_not("\n\r")))(input)
}

fn ws_or_comment0(input: &str) -> PResult<'_, ()> {
    nom_value((), many0(alt((nom_value((), multispace1), line_comment))))(input)
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn string_char(input: &str) -> PResult<'_, char> {
    alt((
        preceded(
            char('\\'),
            alt((
                nom_value('"', char('"')),
                nom_value('\\', char('\\')),
                nom_value('\n', char('n')),
                nom_value('\t', char('t')),
            )),
        ),
        verify(anychar, |c| *c != '"'),
    ))(input)
}

fn string_literal(input: &str) -> PResult<'_, String> {
    let (rest, (chars, _)) = delimited(
        char('"'),
        many_till(string_char, nom::combinator::peek(char('"'))),
        char('"'),
    )(input)?;
    Ok((rest, chars.into_iter().collect()))
}

fn number_literal(input: &str) -> PResult<'_, f64> {
    alt((
        double,
        map(recognize(pair(opt(char('-')), digit1)), |s: &str| {
            s.parse::<f64>().unwrap_or(f64::NAN)
        }),
    ))(input)
}

fn bool_literal(input: &str) -> PResult<'_, bool> {
    alt((
        nom_value(true, tag("true")),
        nom_value(false, tag("false")),
    ))(input)
}

fn nil_literal(input: &str) -> PResult<'_, ()> {
    nom_value((), tag("nil"))(input)
}

fn value(input: &str) -> PResult<'_, ConfigValue> {
    alt((
        map(string_literal, ConfigValue::Str),
        map(table_literal, |t| t),
        nom_value(ConfigValue::Nil, nil_literal),
        map(bool_literal, ConfigValue::Bool),
        map(number_literal, ConfigValue::Num),
    ))(input)
}

/// A table entry is either `key = value` (dict) or a bare `value` (list).
enum Entry {
    Named(String, ConfigValue),
    Positional(ConfigValue),
}

fn table_entry(input: &str) -> PResult<'_, Entry> {
    alt((
        map(
            separated_pair(
                identifier,
                tuple((ws_or_comment0, char('='), ws_or_comment0)),
                value,
            ),
            |(key, val)| Entry::Named(key.to_string(), val),
        ),
        map(value, Entry::Positional),
    ))(input)
}

/// Parses `{ ... }`. A table is either all-named (a [`ConfigValue::Dict`]) or
/// all-positional (a [`ConfigValue::List`]); mixing the two in one literal is
/// rejected by the caller once entries are collected, since this engine's
/// config language never needs it and an explicit rejection is clearer than
/// silently dropping one half.
fn table_literal(input: &str) -> PResult<'_, ConfigValue> {
    let (rest, entries) = delimited(
        char('{'),
        terminated(
            separated_list0(
                delimited(ws_or_comment0, char(','), ws_or_comment0),
                preceded(ws_or_comment0, table_entry),
            ),
            tuple((ws_or_comment0, opt(char(',')), ws_or_comment0)),
        ),
        cut(char('}')),
    )(input)?;

    let named = entries.iter().any(|e| matches!(e, Entry::Named(..)));
    let positional = entries.iter().any(|e| matches!(e, Entry::Positional(_)));

    if named && positional {
        return Err(nom::Err::Failure(VerboseError {
            errors: vec![(
                input,
                nom::error::VerboseErrorKind::Context(
                    "table mixes named and positional entries, which this language does not support",
                ),
            )],
        }));
    }

    if named {
        let map: BTreeMap<String, ConfigValue> = entries
            .into_iter()
            .filter_map(|e| match e {
                Entry::Named(k, v) => Some((k, v)),
                Entry::Positional(_) => None,
            })
            .collect();
        Ok((rest, ConfigValue::Dict(map)))
    } else {
        let list: Vec<ConfigValue> = entries
            .into_iter()
            .map(|e| match e {
                Entry::Positional(v) => v,
                Entry::Named(..) => unreachable!(),
            })
            .collect();
        Ok((rest, ConfigValue::List(list)))
    }
}

/// Parses the parenthesised argument list of a call: `("name", { ... })`.
fn paren_args(input: &str) -> PResult<'_, (Option<String>, Option<ConfigValue>)> {
    delimited(
        char('('),
        preceded(
            ws_or_comment0,
            terminated(
                map(
                    opt(pair(
                        value,
                        opt(preceded(
                            tuple((ws_or_comment0, char(','), ws_or_comment0)),
                            value,
                        )),
                    )),
                    split_call_args,
                ),
                tuple((ws_or_comment0, opt(char(',')), ws_or_comment0)),
            ),
        ),
        cut(char(')')),
    )(input)
}

fn split_call_args(
    args: Option<(ConfigValue, Option<ConfigValue>)>,
) -> (Option<String>, Option<ConfigValue>) {
    match args {
        None => (None, None),
        Some((first, None)) => match first {
            ConfigValue::Str(s) => (Some(s), None),
            other => (None, Some(other)),
        },
        Some((first, Some(second))) => {
            let name = match first {
                ConfigValue::Str(s) => Some(s),
                _ => None,
            };
            (name, Some(second))
        }
    }
}

/// Parses the unparenthesised single-argument sugar: `env "path"` or
/// `env { ... }`.
fn bare_arg(input: &str) -> PResult<'_, (Option<String>, Option<ConfigValue>)> {
    alt((
        map(string_literal, |s| (Some(s), None)),
        map(table_literal, |t| (None, Some(t))),
    ))(input)
}

fn one_call(input: &str) -> PResult<'_, BuilderCall> {
    let (rest, builder) = identifier(input)?;
    let (rest, _) = ws_or_comment0(rest)?;
    let (rest, (name_arg, table_arg)) = context(
        "expected arguments after builder name",
        cut(alt((paren_args, bare_arg))),
    )(rest)?;
    Ok((
        rest,
        BuilderCall {
            builder: builder.to_string(),
            name_arg,
            table_arg,
            line: 0,
        },
    ))
}

/// Parses a whole file's worth of top-level calls and fills in accurate line
/// numbers by measuring each call's offset into the original input.
pub fn parse_calls(input: &str) -> Result<Vec<BuilderCall>, String> {
    let (rest, (_, calls)) = terminated(
        pair(
            ws_or_comment0,
            many0(terminated(located(input, one_call), ws_or_comment0)),
        ),
        nom::combinator::eof,
    )(input)
    .map_err(|e| render_parse_error(input, e))?;
    debug_assert!(rest.is_empty());
    Ok(calls)
}

/// Wraps a parser so the returned `BuilderCall.line` reflects where in the
/// *original* input this call started, computed via nom's offset tracking
/// rather than a dedicated position-tracking input type.
fn located<'a, F>(
    original: &'a str,
    mut inner: F,
) -> impl FnMut(&'a str) -> PResult<'a, BuilderCall>
where
    F: FnMut(&'a str) -> PResult<'a, BuilderCall>,
{
    move |input: &'a str| {
        let start_offset = original.offset(input);
        let line = 1 + original[..start_offset].matches('\n').count() as u32;
        let (rest, mut call) = inner(input)?;
        call.line = line;
        Ok((rest, call))
    }
}

fn render_parse_error(input: &str, err: nom::Err<VerboseError<&str>>) -> String {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            nom::error::convert_error(input, e)
        }
        nom::Err::Incomplete(_) => "unexpected end of input".to_string(),
    }
}
