//! Leaf patterns: strings, numbers, dates, enums and exact values.

use super::{describe, mismatch, parse_json_or_text, values_equal, Failure, MatchResult, Resolver};
use crate::errors::ContractError;
use chrono::{NaiveDate, SecondsFormat, Utc};
use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_MIN_GENERATED_LENGTH: usize = 5;
const DEFAULT_MAX_GENERATED_LENGTH: usize = 10;
const DEFAULT_NUMBER_RANGE: f64 = 1000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,
}

impl StringPattern {
    pub fn with_min_length(mut self, length: usize) -> Self {
        self.min_length = Some(length);
        self
    }

    pub fn with_max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn min_length(&self) -> Option<usize> {
        self.min_length
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    pub fn is_unbounded(&self) -> bool {
        self.min_length.is_none() && self.max_length.is_none()
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        let Value::String(text) = value else {
            return mismatch(resolver, "string", value);
        };
        let length = text.chars().count();
        let actual = format!("{} of length {}", describe(value), length);
        if let Some(min) = self.min_length {
            if length < min {
                return MatchResult::failure(
                    resolver
                        .messages()
                        .mismatch(&format!("string with minLength {}", min), &actual),
                );
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return MatchResult::failure(
                    resolver
                        .messages()
                        .mismatch(&format!("string with maxLength {}", max), &actual),
                );
            }
        }
        MatchResult::Success
    }

    pub(super) fn generate(&self) -> Result<Value, ContractError> {
        let min = self.min_length.unwrap_or(0);
        let max = self
            .max_length
            .unwrap_or_else(|| min.max(DEFAULT_MAX_GENERATED_LENGTH));
        if max < min {
            return Err(ContractError::InvalidPattern(format!(
                "string minLength {} exceeds maxLength {}",
                min, max
            )));
        }
        let low = min.max(DEFAULT_MIN_GENERATED_LENGTH).min(max);
        let mut rng = rand::rng();
        let length = rng.random_range(low..=max);
        Ok(Value::String(Alphanumeric.sample_string(&mut rng, length)))
    }

    /// Widening bounds keeps compatibility; narrowing them breaks it.
    pub(super) fn encompasses(&self, other: &StringPattern, resolver: &Resolver) -> MatchResult {
        let messages = resolver.messages();
        let mut failures = Vec::new();

        if let Some(min) = self.min_length {
            let other_min = other.min_length.unwrap_or(0);
            if other_min < min {
                failures.push(
                    Failure::new(messages.mismatch(
                        &format!("minLength {}", min),
                        &format!("minLength {}", other_min),
                    ))
                    .breadcrumb("minLength"),
                );
            }
        }

        if let Some(max) = self.max_length {
            match other.max_length {
                Some(other_max) if other_max <= max => {}
                other_max => {
                    let actual = other_max
                        .map(|m| format!("maxLength {}", m))
                        .unwrap_or_else(|| "no maxLength".to_string());
                    failures.push(
                        Failure::new(messages.mismatch(&format!("maxLength {}", max), &actual))
                            .breadcrumb("maxLength"),
                    );
                }
            }
        }

        MatchResult::from_failures(failures)
    }

    pub(super) fn validate(&self) -> Result<(), ContractError> {
        match (self.min_length, self.max_length) {
            (Some(min), Some(max)) if min > max => Err(ContractError::InvalidPattern(format!(
                "string minLength {} exceeds maxLength {}",
                min, max
            ))),
            _ => Ok(()),
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberPattern {
    #[serde(default, skip_serializing_if = "is_false")]
    integer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    maximum: Option<f64>,
}

impl NumberPattern {
    pub fn integer() -> Self {
        Self {
            integer: true,
            ..Self::default()
        }
    }

    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn is_integer(&self) -> bool {
        self.integer
    }

    fn label(&self) -> &'static str {
        if self.integer {
            "integer"
        } else {
            "number"
        }
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        let Some(number) = value.as_f64() else {
            return mismatch(resolver, self.label(), value);
        };
        if self.integer && number.fract() != 0.0 {
            return mismatch(resolver, "integer", value);
        }
        if let Some(min) = self.minimum {
            if number < min {
                return mismatch(resolver, &format!("{} >= {}", self.label(), min), value);
            }
        }
        if let Some(max) = self.maximum {
            if number > max {
                return mismatch(resolver, &format!("{} <= {}", self.label(), max), value);
            }
        }
        MatchResult::Success
    }

    pub(super) fn generate(&self) -> Result<Value, ContractError> {
        let low = match (self.minimum, self.maximum) {
            (Some(min), _) => min,
            (None, Some(max)) => (max - DEFAULT_NUMBER_RANGE).max(f64::MIN),
            (None, None) => 1.0,
        };
        let high = self
            .maximum
            .unwrap_or_else(|| (low + DEFAULT_NUMBER_RANGE - 1.0).min(f64::MAX));
        if !low.is_finite() || !high.is_finite() {
            return Err(ContractError::InvalidPattern(format!(
                "number bounds must be finite, got {} and {}",
                low, high
            )));
        }
        let mut rng = rand::rng();

        if self.integer {
            let (low, high) = (low.ceil(), high.floor());
            if low > high {
                return Err(ContractError::InvalidPattern(
                    "no integer lies between minimum and maximum".to_string(),
                ));
            }
            if low >= i64::MIN as f64 && high <= i64::MAX as f64 {
                return Ok(Value::from(rng.random_range(low as i64..=high as i64)));
            }
            // Floats this large are integral already.
            let raw = sample_between(&mut rng, low, high).round().clamp(low, high);
            return number_value(raw);
        }

        if low > high {
            return Err(ContractError::InvalidPattern(
                "number minimum exceeds maximum".to_string(),
            ));
        }
        let raw = sample_between(&mut rng, low, high);
        let rounded = if raw.abs() < 1e15 {
            ((raw * 100.0).round() / 100.0).clamp(low, high)
        } else {
            raw
        };
        number_value(rounded)
    }

    pub(super) fn encompasses(&self, other: &NumberPattern, resolver: &Resolver) -> MatchResult {
        let messages = resolver.messages();
        let mut failures = Vec::new();

        if self.integer && !other.integer {
            failures.push(Failure::new(messages.mismatch("integer", "number")));
        }
        if let Some(min) = self.minimum {
            if other.minimum.map_or(true, |other_min| other_min < min) {
                failures.push(
                    Failure::new(messages.mismatch(
                        &format!("minimum {}", min),
                        &bound_text("minimum", other.minimum),
                    ))
                    .breadcrumb("minimum"),
                );
            }
        }
        if let Some(max) = self.maximum {
            if other.maximum.map_or(true, |other_max| other_max > max) {
                failures.push(
                    Failure::new(messages.mismatch(
                        &format!("maximum {}", max),
                        &bound_text("maximum", other.maximum),
                    ))
                    .breadcrumb("maximum"),
                );
            }
        }
        MatchResult::from_failures(failures)
    }

    pub(super) fn validate(&self) -> Result<(), ContractError> {
        match (self.minimum, self.maximum) {
            (Some(min), Some(max)) if min > max => Err(ContractError::InvalidPattern(format!(
                "number minimum {} exceeds maximum {}",
                min, max
            ))),
            _ => Ok(()),
        }
    }
}

/// Uniform sample from `[low, high)`; halves the bounds when the span
/// itself overflows.
fn sample_between(rng: &mut impl Rng, low: f64, high: f64) -> f64 {
    if low >= high {
        low
    } else if (high - low).is_finite() {
        rng.random_range(low..high)
    } else {
        rng.random_range(low / 2.0..high / 2.0) * 2.0
    }
}

fn number_value(raw: f64) -> Result<Value, ContractError> {
    serde_json::Number::from_f64(raw)
        .map(Value::Number)
        .ok_or_else(|| ContractError::InvalidPattern(format!("cannot represent {} as JSON", raw)))
}

fn bound_text(name: &str, bound: Option<f64>) -> String {
    match bound {
        Some(b) => format!("{} {}", name, b),
        None => format!("no {}", name),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumPattern {
    values: Vec<Value>,
}

impl EnumPattern {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(super) fn type_name(&self) -> String {
        let options: Vec<String> = self.values.iter().map(describe).collect();
        format!("one of [{}]", options.join(", "))
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        if self.values.iter().any(|v| values_equal(v, value)) {
            MatchResult::Success
        } else {
            mismatch(resolver, &self.type_name(), value)
        }
    }

    pub(super) fn generate(&self) -> Result<Value, ContractError> {
        if self.values.is_empty() {
            return Err(ContractError::InvalidPattern(
                "enum has no values".to_string(),
            ));
        }
        let index = rand::rng().random_range(0..self.values.len());
        Ok(self.values[index].clone())
    }

    /// Text that names one of the string options stays text; anything else
    /// is read as JSON.
    pub(super) fn parse(&self, raw: &str) -> Value {
        let text = Value::String(raw.to_string());
        if self.values.contains(&text) {
            return text;
        }
        parse_json_or_text(raw)
    }

    pub(super) fn validate(&self) -> Result<(), ContractError> {
        if self.values.is_empty() {
            return Err(ContractError::InvalidPattern(
                "enum has no values".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactValuePattern {
    value: Value,
}

impl ExactValuePattern {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        if values_equal(&self.value, value) {
            MatchResult::Success
        } else {
            mismatch(resolver, &describe(&self.value), value)
        }
    }

    pub(super) fn parse(&self, raw: &str) -> Value {
        match self.value {
            Value::String(_) => Value::String(raw.to_string()),
            _ => parse_json_or_text(raw),
        }
    }
}

pub(super) fn match_boolean(value: &Value, resolver: &Resolver) -> MatchResult {
    match value {
        Value::Bool(_) => MatchResult::Success,
        other => mismatch(resolver, "boolean", other),
    }
}

pub(super) fn match_null(value: &Value, resolver: &Resolver) -> MatchResult {
    match value {
        Value::Null => MatchResult::Success,
        other => mismatch(resolver, "null", other),
    }
}

pub(super) fn match_date(value: &Value, resolver: &Resolver) -> MatchResult {
    match value {
        Value::String(text) if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok() => {
            MatchResult::Success
        }
        other => mismatch(resolver, "date (yyyy-mm-dd)", other),
    }
}

pub(super) fn match_datetime(value: &Value, resolver: &Resolver) -> MatchResult {
    match value {
        Value::String(text) if chrono::DateTime::parse_from_rfc3339(text).is_ok() => {
            MatchResult::Success
        }
        other => mismatch(resolver, "datetime (RFC 3339)", other),
    }
}

pub(super) fn match_uuid(value: &Value, resolver: &Resolver) -> MatchResult {
    match value {
        Value::String(text) if uuid::Uuid::parse_str(text).is_ok() => MatchResult::Success,
        other => mismatch(resolver, "uuid", other),
    }
}

pub(super) fn generate_boolean() -> Value {
    Value::Bool(rand::rng().random_bool(0.5))
}

pub(super) fn generate_date() -> Value {
    Value::String(Utc::now().date_naive().format("%Y-%m-%d").to_string())
}

pub(super) fn generate_datetime() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

pub(super) fn generate_uuid() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}

pub(super) fn parse_number(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(whole) = trimmed.parse::<i64>() {
        return Some(Value::from(whole));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_length_bounds() {
        let resolver = Resolver::default();
        let pattern = StringPattern::default().with_min_length(2).with_max_length(4);
        assert!(pattern.matches(&json!("abc"), &resolver).is_success());
        assert!(pattern.matches(&json!("a"), &resolver).is_failure());
        assert!(pattern.matches(&json!("abcde"), &resolver).is_failure());
        assert!(pattern.matches(&json!(3), &resolver).is_failure());
    }

    #[test]
    fn test_string_generation_respects_bounds() {
        let resolver = Resolver::default();
        let pattern = StringPattern::default().with_max_length(3);
        for _ in 0..20 {
            let value = pattern.generate().unwrap();
            assert!(pattern.matches(&value, &resolver).is_success());
        }
        let impossible = StringPattern::default().with_min_length(5).with_max_length(2);
        assert!(impossible.generate().is_err());
        assert!(impossible.validate().is_err());
    }

    #[test]
    fn test_integer_rejects_fractions() {
        let resolver = Resolver::default();
        let pattern = NumberPattern::integer();
        assert!(pattern.matches(&json!(3), &resolver).is_success());
        assert!(pattern.matches(&json!(3.0), &resolver).is_success());
        assert!(pattern.matches(&json!(3.5), &resolver).is_failure());
    }

    #[test]
    fn test_number_bounds_generation() {
        let resolver = Resolver::default();
        let pattern = NumberPattern::integer().with_minimum(5.0).with_maximum(7.0);
        for _ in 0..20 {
            let value = pattern.generate().unwrap();
            assert!(pattern.matches(&value, &resolver).is_success(), "{}", value);
        }
    }

    #[test]
    fn test_number_generation_with_extreme_bounds() {
        let resolver = Resolver::default();
        let widest = NumberPattern::default()
            .with_minimum(-1.7e308)
            .with_maximum(1.7e308);
        let huge_integers = NumberPattern::integer().with_minimum(1e300);
        for pattern in [widest, huge_integers] {
            for _ in 0..20 {
                let value = pattern.generate().unwrap();
                assert!(pattern.matches(&value, &resolver).is_success(), "{}", value);
            }
        }
        let unbounded = NumberPattern::default().with_minimum(f64::NEG_INFINITY);
        assert!(matches!(
            unbounded.generate(),
            Err(ContractError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_number_encompasses() {
        let resolver = Resolver::default();
        let wide = NumberPattern::default();
        let narrow = NumberPattern::integer().with_minimum(0.0);
        assert!(wide.encompasses(&narrow, &resolver).is_success());
        let result = narrow.encompasses(&wide, &resolver);
        let failure = result.as_failure().unwrap();
        assert!(failure.has_breadcrumb("minimum"));
    }

    #[test]
    fn test_string_min_length_narrowing() {
        let resolver = Resolver::default();
        let older = StringPattern::default();
        let newer = StringPattern::default().with_min_length(3);
        assert!(newer
            .encompasses(&older, &resolver)
            .as_failure()
            .unwrap()
            .has_breadcrumb("minLength"));
    }

    #[test]
    fn test_date_time_and_uuid_formats() {
        let resolver = Resolver::default();
        assert!(match_date(&json!("2024-02-29"), &resolver).is_success());
        assert!(match_date(&json!("2023-02-29"), &resolver).is_failure());
        assert!(match_datetime(&json!("2024-01-01T10:00:00Z"), &resolver).is_success());
        assert!(match_datetime(&json!("yesterday"), &resolver).is_failure());
        assert!(match_uuid(&generate_uuid(), &resolver).is_success());
        assert!(match_date(&generate_date(), &resolver).is_success());
        assert!(match_datetime(&generate_datetime(), &resolver).is_success());
    }

    #[test]
    fn test_enum_parse_prefers_declared_text() {
        let pattern = EnumPattern::new(vec![json!("10"), json!(20)]);
        assert_eq!(pattern.parse("10"), json!("10"));
        assert_eq!(pattern.parse("20"), json!(20));
    }

    #[test]
    fn test_exact_value_mismatch_message() {
        let resolver = Resolver::default();
        let pattern = ExactValuePattern::new(json!("abc"));
        let result = pattern.matches(&json!("xyz"), &resolver);
        assert!(result.report().to_string().contains("\"abc\""));
    }
}
