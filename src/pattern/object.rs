//! JSON object patterns.
//!
//! Keys ending in `?` are optional. Keys a value carries beyond the declared
//! ones are checked against `additional`; when that is `None` they are
//! rejected.

use super::row::{narrow_keyed, product};
use super::{mismatch, Failure, MatchResult, Pattern, Resolver, Row};
use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Split `name?` into (`name`, optional).
pub(crate) fn split_key(key: &str) -> (&str, bool) {
    match key.strip_suffix('?') {
        Some(bare) => (bare, true),
        None => (key, false),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPattern {
    #[serde(default)]
    properties: BTreeMap<String, Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    additional: Option<Box<Pattern>>,
}

impl ObjectPattern {
    pub fn new(properties: BTreeMap<String, Pattern>) -> Self {
        Self {
            properties,
            additional: None,
        }
    }

    /// Accept undeclared keys whose values match `pattern`.
    pub fn with_additional(mut self, pattern: Pattern) -> Self {
        self.additional = Some(Box::new(pattern));
        self
    }

    /// Replace `bare` (optional or not) with a required key of `pattern`.
    pub(super) fn with_required_property(mut self, bare: &str, pattern: Pattern) -> Self {
        self.properties.remove(&format!("{}?", bare));
        self.properties.insert(bare.to_string(), pattern);
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, Pattern> {
        &self.properties
    }

    pub fn additional(&self) -> Option<&Pattern> {
        self.additional.as_deref()
    }

    /// Look a key up by its bare name, returning the pattern and whether
    /// the key is optional.
    pub fn property(&self, bare: &str) -> Option<(&Pattern, bool)> {
        if let Some(pattern) = self.properties.get(bare) {
            return Some((pattern, false));
        }
        self.properties
            .get(&format!("{}?", bare))
            .map(|pattern| (pattern, true))
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        let Value::Object(map) = value else {
            return mismatch(resolver, "json object", value);
        };

        let mut failures = Vec::new();
        for (key, pattern) in &self.properties {
            let (bare, optional) = split_key(key);
            match map.get(bare) {
                Some(child) => {
                    if let Some(failure) = pattern.matches(child, resolver).into_failure() {
                        failures.push(failure.breadcrumb(bare));
                    }
                }
                None if optional => {}
                None => failures.push(
                    Failure::new(resolver.messages().expected_key_missing("key", bare))
                        .breadcrumb(bare),
                ),
            }
        }

        for (key, child) in map {
            if self.property(key).is_some() {
                continue;
            }
            match &self.additional {
                Some(extra) => {
                    if let Some(failure) = extra.matches(child, resolver).into_failure() {
                        failures.push(failure.breadcrumb(key.as_str()));
                    }
                }
                None => failures.push(
                    Failure::new(resolver.messages().unexpected_key("key", key))
                        .breadcrumb(key.as_str()),
                ),
            }
        }

        MatchResult::from_failures(failures)
    }

    /// Optional keys are generated too, unless doing so would recurse
    /// without end; then they are left out.
    pub(super) fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        let mut out = Map::new();
        for (key, pattern) in &self.properties {
            let (bare, optional) = split_key(key);
            match resolver.generate_keyed(bare, pattern) {
                Ok(value) => {
                    out.insert(bare.to_string(), value);
                }
                Err(ContractError::CyclicGeneration { .. }) if optional => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Object(out))
    }

    pub(super) fn new_based_on(
        &self,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        let mut slots: Vec<Vec<Option<(String, Pattern)>>> = Vec::new();
        for (key, pattern) in &self.properties {
            let (bare, optional) = split_key(key);
            let mut options: Vec<Option<(String, Pattern)>> = narrow_keyed(bare, pattern, row, resolver)?
                .into_iter()
                .map(|narrowed| Some((bare.to_string(), narrowed)))
                .collect();
            // An optional key the row says nothing about is tried both ways.
            if optional && !row.contains(bare) {
                options.push(None);
            }
            slots.push(options);
        }

        Ok(product(slots, resolver.variant_limit())
            .into_iter()
            .map(|combination| {
                Pattern::Object(ObjectPattern {
                    properties: combination.into_iter().flatten().collect(),
                    additional: self.additional.clone(),
                })
            })
            .collect())
    }

    pub(super) fn encompasses(
        &self,
        other: &ObjectPattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        seen: &mut Vec<(String, String)>,
    ) -> MatchResult {
        let messages = this_resolver.messages();
        let mut failures = Vec::new();

        for (key, mine) in &self.properties {
            let (bare, optional) = split_key(key);
            match other.property(bare) {
                Some((_, true)) if !optional => failures.push(
                    Failure::new(messages.expected_key_missing("key", bare)).breadcrumb(bare),
                ),
                Some((theirs, _)) => {
                    if let Some(failure) = mine
                        .encompasses_with(theirs, this_resolver, other_resolver, seen)
                        .into_failure()
                    {
                        failures.push(failure.breadcrumb(bare));
                    }
                }
                None if optional => {}
                None => failures.push(
                    Failure::new(messages.expected_key_missing("key", bare)).breadcrumb(bare),
                ),
            }
        }

        for (key, theirs) in &other.properties {
            let (bare, _) = split_key(key);
            if self.property(bare).is_some() {
                continue;
            }
            match &self.additional {
                Some(extra) => {
                    if let Some(failure) = extra
                        .encompasses_with(theirs, this_resolver, other_resolver, seen)
                        .into_failure()
                    {
                        failures.push(failure.breadcrumb(bare));
                    }
                }
                None => failures.push(
                    Failure::new(messages.unexpected_key("key", bare)).breadcrumb(bare),
                ),
            }
        }

        if let Some(theirs) = &other.additional {
            match &self.additional {
                Some(mine) => {
                    if let Some(failure) = mine
                        .encompasses_with(theirs, this_resolver, other_resolver, seen)
                        .into_failure()
                    {
                        failures.push(failure);
                    }
                }
                None => failures.push(Failure::new(messages.mismatch(
                    "an object without additional properties",
                    "an object that allows additional properties",
                ))),
            }
        }

        MatchResult::from_failures(failures)
    }

    pub(super) fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        for pattern in self.properties.values() {
            pattern.validate(resolver)?;
        }
        match &self.additional {
            Some(extra) => extra.validate(resolver),
            None => Ok(()),
        }
    }
}
