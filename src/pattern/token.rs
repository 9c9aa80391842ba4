//! Pattern tokens: `(string)`, `(Person)`, `(number?)`, `(date*)`.
//!
//! A token in an expectation, example row or fact means "match by type, not
//! by value". `?` makes the type nullable, `*` makes it a list.

use super::{Pattern, Resolver};
use crate::errors::ContractError;
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*([?*]?)\s*\)$").expect("valid token regex")
});

static NAMED_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*:\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*([?*]?)\s*\)$")
        .expect("valid named token regex")
});

pub fn is_token(text: &str) -> bool {
    TOKEN_RE.is_match(text.trim())
}

/// Built-in type names, or `None` for names that refer to contract definitions.
pub fn builtin(type_name: &str) -> Option<Pattern> {
    let pattern = match type_name {
        "string" => Pattern::string(),
        "number" => Pattern::number(),
        "integer" => Pattern::integer(),
        "boolean" => Pattern::Boolean,
        "date" => Pattern::Date,
        "datetime" => Pattern::DateTime,
        "uuid" => Pattern::Uuid,
        "null" => Pattern::Null,
        "anything" | "any" => Pattern::Any,
        _ => return None,
    };
    Some(pattern)
}

/// Pattern for a bare type name: a built-in, or a reference to a definition.
pub fn from_type_name(type_name: &str) -> Pattern {
    builtin(type_name).unwrap_or_else(|| Pattern::reference(type_name))
}

fn apply_suffix(pattern: Pattern, suffix: &str) -> Pattern {
    match suffix {
        "?" => Pattern::nullable(pattern),
        "*" => Pattern::list_of(pattern),
        _ => pattern,
    }
}

pub fn parse_token(text: &str) -> Result<Pattern, ContractError> {
    let captures = TOKEN_RE
        .captures(text.trim())
        .ok_or_else(|| ContractError::InvalidPattern(format!("'{}' is not a pattern token", text)))?;
    let base = from_type_name(&captures[1]);
    Ok(apply_suffix(base, &captures[2]))
}

/// Like [`parse_token`], but only for types that are built in or defined in
/// `resolver`. Text such as `(none)` that names nothing stays literal.
pub fn parse_known_token(text: &str, resolver: &Resolver) -> Option<Pattern> {
    let captures = TOKEN_RE.captures(text.trim())?;
    let name = &captures[1];
    if builtin(name).is_none() && resolver.resolve(name).is_err() {
        return None;
    }
    Some(apply_suffix(from_type_name(name), &captures[2]))
}

/// Parse a `(name:type)` token as used in path templates.
pub fn parse_named_token(text: &str) -> Option<(String, Pattern)> {
    let captures = NAMED_TOKEN_RE.captures(text.trim())?;
    let pattern = apply_suffix(from_type_name(&captures[2]), &captures[3]);
    Some((captures[1].to_string(), pattern))
}
