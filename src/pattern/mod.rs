//! Pattern engine
//!
//! A [`Pattern`] describes one piece of contract shape (a body, a header
//! value, a path parameter) and supports five operations, all of which take
//! a [`Resolver`]:
//!
//! - `matches` compares a concrete JSON value against the pattern
//! - `generate` produces a value the pattern accepts
//! - `new_based_on` specialises the pattern using an example [`Row`]
//! - `parse` turns wire text into the pattern's native value
//! - `encompasses` decides whether every value another pattern accepts is
//!   also accepted by this one
//!
//! Expected mismatches are returned as [`MatchResult`] values. Only defects in
//! the contract itself surface as [`ContractError`].

mod any_of;
mod list;
mod object;
mod reference;
pub mod resolver;
pub mod result;
pub mod row;
mod scalar;
pub mod token;

pub use any_of::{AnyOfPattern, Discriminator};
pub use list::{ListPattern, TuplePattern};
pub use object::ObjectPattern;
pub use reference::ReferencePattern;
pub use resolver::{
    MismatchMessages, NewVsOldContract, PartyMessages, Resolver, CONTRACT_VS_EXAMPLE,
    CONTRACT_VS_REQUEST, CONTRACT_VS_RESPONSE, CONTRACT_VS_STUB, STUB_VS_REQUEST,
};
pub use result::{Failure, FailureReason, FailureReport, MatchResult, ReportEntry, Results};
pub use row::Row;
pub use scalar::{EnumPattern, ExactValuePattern, NumberPattern, StringPattern};

use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Pattern {
    String(StringPattern),
    Number(NumberPattern),
    Boolean,
    Date,
    DateTime,
    Uuid,
    Null,
    Any,
    Enum(EnumPattern),
    Exact(ExactValuePattern),
    Object(ObjectPattern),
    List(ListPattern),
    Tuple(TuplePattern),
    AnyOf(AnyOfPattern),
    Reference(ReferencePattern),
}

impl Pattern {
    pub fn string() -> Self {
        Pattern::String(StringPattern::default())
    }

    pub fn number() -> Self {
        Pattern::Number(NumberPattern::default())
    }

    pub fn integer() -> Self {
        Pattern::Number(NumberPattern::integer())
    }

    pub fn exact(value: Value) -> Self {
        Pattern::Exact(ExactValuePattern::new(value))
    }

    pub fn enumeration(values: Vec<Value>) -> Self {
        Pattern::Enum(EnumPattern::new(values))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Pattern::Reference(ReferencePattern::new(name))
    }

    pub fn nullable(pattern: Pattern) -> Self {
        Pattern::AnyOf(AnyOfPattern::new(vec![Pattern::Null, pattern]))
    }

    pub fn list_of(element: Pattern) -> Self {
        Pattern::List(ListPattern::new(element))
    }

    pub fn any_of(branches: Vec<Pattern>) -> Self {
        Pattern::AnyOf(AnyOfPattern::new(branches))
    }

    /// Object with the given keys; a key ending in `?` is optional.
    pub fn object<K: Into<String>>(properties: impl IntoIterator<Item = (K, Pattern)>) -> Self {
        Pattern::Object(ObjectPattern::new(
            properties.into_iter().map(|(k, p)| (k.into(), p)).collect(),
        ))
    }

    /// Build a pattern from an example value as written in a stub.
    ///
    /// Strings that are tokens for a known type become typed patterns,
    /// objects keep exactly the keys they list, arrays become fixed tuples
    /// and every other value must match literally.
    pub fn from_example_value(value: &Value, resolver: &Resolver) -> Self {
        match value {
            Value::String(text) => token::parse_known_token(text, resolver)
                .unwrap_or_else(|| Pattern::exact(value.clone())),
            Value::Object(map) => Pattern::Object(ObjectPattern::new(
                map.iter()
                    .map(|(k, v)| (k.clone(), Pattern::from_example_value(v, resolver)))
                    .collect(),
            )),
            Value::Array(items) => Pattern::Tuple(TuplePattern::new(
                items
                    .iter()
                    .map(|item| Pattern::from_example_value(item, resolver))
                    .collect(),
            )),
            other => Pattern::exact(other.clone()),
        }
    }

    /// Short description used in mismatch messages.
    pub fn type_name(&self) -> String {
        match self {
            Pattern::String(_) => "string".to_string(),
            Pattern::Number(n) if n.is_integer() => "integer".to_string(),
            Pattern::Number(_) => "number".to_string(),
            Pattern::Boolean => "boolean".to_string(),
            Pattern::Date => "date".to_string(),
            Pattern::DateTime => "datetime".to_string(),
            Pattern::Uuid => "uuid".to_string(),
            Pattern::Null => "null".to_string(),
            Pattern::Any => "anything".to_string(),
            Pattern::Enum(e) => e.type_name(),
            Pattern::Exact(e) => describe(e.value()),
            Pattern::Object(_) => "json object".to_string(),
            Pattern::List(l) => format!("list of {}", l.element().type_name()),
            Pattern::Tuple(_) => "json array".to_string(),
            Pattern::AnyOf(a) => a.type_name(),
            Pattern::Reference(r) => format!("({})", r.name()),
        }
    }

    pub fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        if resolver.is_generation_mode() {
            if let Value::String(text) = value {
                if let Some(typed) = token::parse_known_token(text, resolver) {
                    return self.encompasses(&typed, resolver, resolver);
                }
            }
        }

        match self {
            Pattern::String(s) => s.matches(value, resolver),
            Pattern::Number(n) => n.matches(value, resolver),
            Pattern::Boolean => scalar::match_boolean(value, resolver),
            Pattern::Date => scalar::match_date(value, resolver),
            Pattern::DateTime => scalar::match_datetime(value, resolver),
            Pattern::Uuid => scalar::match_uuid(value, resolver),
            Pattern::Null => scalar::match_null(value, resolver),
            Pattern::Any => MatchResult::Success,
            Pattern::Enum(e) => e.matches(value, resolver),
            Pattern::Exact(e) => e.matches(value, resolver),
            Pattern::Object(o) => o.matches(value, resolver),
            Pattern::List(l) => l.matches(value, resolver),
            Pattern::Tuple(t) => t.matches(value, resolver),
            Pattern::AnyOf(a) => a.matches(value, resolver),
            Pattern::Reference(r) => r.matches(value, resolver),
        }
    }

    pub fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        match self {
            Pattern::String(s) => s.generate(),
            Pattern::Number(n) => n.generate(),
            Pattern::Boolean => Ok(scalar::generate_boolean()),
            Pattern::Date => Ok(scalar::generate_date()),
            Pattern::DateTime => Ok(scalar::generate_datetime()),
            Pattern::Uuid => Ok(scalar::generate_uuid()),
            Pattern::Null | Pattern::Any => Ok(Value::Null),
            Pattern::Enum(e) => e.generate(),
            Pattern::Exact(e) => Ok(e.value().clone()),
            Pattern::Object(o) => o.generate(resolver),
            Pattern::List(l) => l.generate(resolver),
            Pattern::Tuple(t) => t.generate(resolver),
            Pattern::AnyOf(a) => a.generate(resolver),
            Pattern::Reference(r) => r.generate(resolver),
        }
    }

    /// Specialise this pattern using an example row. Returns every variant
    /// worth exercising, capped at the resolver's variant limit.
    pub fn new_based_on(&self, row: &Row, resolver: &Resolver) -> Result<Vec<Pattern>, ContractError> {
        match self {
            Pattern::Object(o) => o.new_based_on(row, resolver),
            Pattern::List(l) => l.new_based_on(row, resolver),
            Pattern::Tuple(t) => t.new_based_on(row, resolver),
            Pattern::AnyOf(a) => a.new_based_on(row, resolver),
            Pattern::Reference(r) => r.new_based_on(row, resolver),
            scalar => Ok(vec![scalar.clone()]),
        }
    }

    /// Convert wire text (a path segment, header value or raw body) into the
    /// value this pattern expects, without matching it.
    pub fn parse(&self, raw: &str, resolver: &Resolver) -> Result<Value, Failure> {
        match self {
            Pattern::String(_) | Pattern::Date | Pattern::DateTime | Pattern::Uuid => {
                Ok(Value::String(raw.to_string()))
            }
            Pattern::Number(_) => scalar::parse_number(raw)
                .ok_or_else(|| parse_failure(resolver, &self.type_name(), raw)),
            Pattern::Boolean => match raw.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(parse_failure(resolver, "boolean", raw)),
            },
            Pattern::Null => match raw.trim() {
                "" | "null" => Ok(Value::Null),
                _ => Err(parse_failure(resolver, "null", raw)),
            },
            Pattern::Any => Ok(parse_json_or_text(raw)),
            Pattern::Enum(e) => Ok(e.parse(raw)),
            Pattern::Exact(e) => Ok(e.parse(raw)),
            Pattern::Object(_) | Pattern::List(_) | Pattern::Tuple(_) => {
                serde_json::from_str(raw).map_err(|_| parse_failure(resolver, &self.type_name(), raw))
            }
            Pattern::AnyOf(a) => a.parse(raw, resolver),
            Pattern::Reference(r) => r.parse(raw, resolver),
        }
    }

    /// Does every value accepted by `other` also satisfy `self`?
    pub fn encompasses(
        &self,
        other: &Pattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
    ) -> MatchResult {
        self.encompasses_with(other, this_resolver, other_resolver, &mut Vec::new())
    }

    /// `seen` holds the reference pairs already being compared further up the
    /// stack; meeting one again means the recursive shapes agree so far.
    pub(crate) fn encompasses_with(
        &self,
        other: &Pattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        seen: &mut Vec<(String, String)>,
    ) -> MatchResult {
        match (self, other) {
            (Pattern::Reference(mine), Pattern::Reference(theirs)) => {
                let pair = (mine.name().to_string(), theirs.name().to_string());
                if seen.contains(&pair) {
                    return MatchResult::Success;
                }
                let resolved = (
                    this_resolver.resolve(mine.name()),
                    other_resolver.resolve(theirs.name()),
                );
                match resolved {
                    (Ok(a), Ok(b)) => {
                        seen.push(pair);
                        let result = a.encompasses_with(b, this_resolver, other_resolver, seen);
                        seen.pop();
                        result
                    }
                    (Err(e), _) | (_, Err(e)) => contract_failure(&e),
                }
            }
            (_, Pattern::Reference(theirs)) => match other_resolver.resolve(theirs.name()) {
                Ok(b) => self.encompasses_with(b, this_resolver, other_resolver, seen),
                Err(e) => contract_failure(&e),
            },
            (Pattern::Reference(mine), _) => match this_resolver.resolve(mine.name()) {
                Ok(a) => a.encompasses_with(other, this_resolver, other_resolver, seen),
                Err(e) => contract_failure(&e),
            },
            (Pattern::Any, _) => MatchResult::Success,
            (_, other) if other.finite_values().is_some() => {
                let values = other.finite_values().unwrap_or_default();
                let failures: Vec<Failure> = values
                    .iter()
                    .filter_map(|v| self.matches(v, this_resolver).into_failure())
                    .collect();
                MatchResult::from_failures(failures)
            }
            (_, Pattern::AnyOf(theirs)) => {
                let failures: Vec<Failure> = theirs
                    .branches()
                    .iter()
                    .filter_map(|branch| {
                        self.encompasses_with(branch, this_resolver, other_resolver, seen)
                            .into_failure()
                    })
                    .collect();
                MatchResult::from_failures(failures)
            }
            (Pattern::AnyOf(mine), _) => {
                mine.encompasses_single(other, this_resolver, other_resolver, seen)
            }
            (_, Pattern::Any) => type_mismatch(this_resolver, self, other),
            (Pattern::String(a), Pattern::String(b)) => a.encompasses(b, this_resolver),
            (Pattern::String(a), Pattern::Date | Pattern::DateTime | Pattern::Uuid)
                if a.is_unbounded() =>
            {
                MatchResult::Success
            }
            (Pattern::Number(a), Pattern::Number(b)) => a.encompasses(b, this_resolver),
            (Pattern::Date, Pattern::Date)
            | (Pattern::DateTime, Pattern::DateTime)
            | (Pattern::Uuid, Pattern::Uuid) => MatchResult::Success,
            (Pattern::Object(a), Pattern::Object(b)) => {
                a.encompasses(b, this_resolver, other_resolver, seen)
            }
            (Pattern::List(a), Pattern::List(b)) => {
                a.element()
                    .encompasses_with(b.element(), this_resolver, other_resolver, seen)
            }
            (Pattern::List(a), Pattern::Tuple(b)) => {
                a.encompasses_tuple(b, this_resolver, other_resolver, seen)
            }
            (Pattern::Tuple(a), Pattern::Tuple(b)) => {
                a.encompasses(b, this_resolver, other_resolver, seen)
            }
            _ => type_mismatch(this_resolver, self, other),
        }
    }

    /// Every value this pattern accepts, when that set is small and known.
    fn finite_values(&self) -> Option<Vec<Value>> {
        match self {
            Pattern::Exact(e) => Some(vec![e.value().clone()]),
            Pattern::Enum(e) => Some(e.values().to_vec()),
            Pattern::Null => Some(vec![Value::Null]),
            Pattern::Boolean => Some(vec![Value::Bool(true), Value::Bool(false)]),
            _ => None,
        }
    }

    /// Check the pattern for definition defects: dangling references,
    /// discriminator mappings that point past the branch list, empty enums
    /// and contradictory bounds. Named definitions are not followed.
    pub fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        match self {
            Pattern::String(s) => s.validate(),
            Pattern::Number(n) => n.validate(),
            Pattern::Enum(e) => e.validate(),
            Pattern::Object(o) => o.validate(resolver),
            Pattern::List(l) => l.element().validate(resolver),
            Pattern::Tuple(t) => t.elements().iter().try_for_each(|p| p.validate(resolver)),
            Pattern::AnyOf(a) => a.validate(resolver),
            Pattern::Reference(r) => resolver.resolve(r.name()).map(|_| ()),
            _ => Ok(()),
        }
    }
}

/// Render a value for a mismatch message.
pub(crate) fn describe(value: &Value) -> String {
    const MAX_SHOWN: usize = 64;
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) if s.chars().count() > MAX_SHOWN => {
            let shown: String = s.chars().take(MAX_SHOWN).collect();
            format!("\"{}...\"", shown)
        }
        Value::String(s) => format!("\"{}\"", s),
        Value::Object(_) => "json object".to_string(),
        Value::Array(_) => "json array".to_string(),
        other => other.to_string(),
    }
}

/// JSON equality that treats `1` and `1.0` as the same number.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

pub(crate) fn mismatch(resolver: &Resolver, expected: &str, actual: &Value) -> MatchResult {
    MatchResult::failure(resolver.messages().mismatch(expected, &describe(actual)))
}

fn type_mismatch(resolver: &Resolver, expected: &Pattern, actual: &Pattern) -> MatchResult {
    MatchResult::failure(
        resolver
            .messages()
            .mismatch(&expected.type_name(), &actual.type_name()),
    )
}

/// A contract defect found while matching. Marked fatal so callers abort
/// the operation instead of trying the next scenario.
pub(crate) fn contract_failure(error: &ContractError) -> MatchResult {
    MatchResult::Failure(Failure::new(error.to_string()).with_reason(FailureReason::InvalidContract))
}

fn parse_failure(resolver: &Resolver, expected: &str, raw: &str) -> Failure {
    Failure::new(
        resolver
            .messages()
            .mismatch(expected, &describe(&Value::String(raw.to_string()))),
    )
}

pub(crate) fn parse_json_or_text(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
