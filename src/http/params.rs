//! Query parameter and header patterns.

use super::{parse_wire, value_to_text};
use crate::errors::ContractError;
use crate::pattern::row::{narrow_keyed, product};
use crate::pattern::{Failure, MatchResult, Pattern, Resolver, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query parameters reject names the contract does not declare; headers
/// ignore them and compare names case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsKind {
    Query,
    Headers,
}

impl ParamsKind {
    fn label(self) -> &'static str {
        match self {
            ParamsKind::Query => "query param",
            ParamsKind::Headers => "header",
        }
    }
}

/// Named text parameters; a name ending in `?` is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsPattern {
    params: BTreeMap<String, Pattern>,
}

fn split_name(name: &str) -> (&str, bool) {
    match name.strip_suffix('?') {
        Some(bare) => (bare, true),
        None => (name, false),
    }
}

impl ParamsPattern {
    pub fn new(params: BTreeMap<String, Pattern>) -> Self {
        Self { params }
    }

    pub fn with(mut self, name: impl Into<String>, pattern: Pattern) -> Self {
        self.params.insert(name.into(), pattern);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &BTreeMap<String, Pattern> {
        &self.params
    }

    fn find<'a>(
        &self,
        actual: &'a BTreeMap<String, String>,
        bare: &str,
        kind: ParamsKind,
    ) -> Option<&'a String> {
        match kind {
            ParamsKind::Query => actual.get(bare),
            ParamsKind::Headers => actual
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(bare))
                .map(|(_, v)| v),
        }
    }

    fn declares(&self, name: &str, kind: ParamsKind) -> bool {
        self.params.keys().any(|key| {
            let (bare, _) = split_name(key);
            match kind {
                ParamsKind::Query => bare == name,
                ParamsKind::Headers => bare.eq_ignore_ascii_case(name),
            }
        })
    }

    pub fn matches(
        &self,
        actual: &BTreeMap<String, String>,
        resolver: &Resolver,
        kind: ParamsKind,
    ) -> MatchResult {
        let messages = resolver.messages();
        let mut failures = Vec::new();

        for (name, pattern) in &self.params {
            let (bare, optional) = split_name(name);
            match self.find(actual, bare, kind) {
                Some(raw) => {
                    let result = match parse_wire(pattern, raw, resolver) {
                        Ok(value) => pattern.matches(&value, resolver),
                        Err(failure) => MatchResult::Failure(failure),
                    };
                    if let Some(failure) = result.into_failure() {
                        failures.push(failure.breadcrumb(bare));
                    }
                }
                None if optional => {}
                None => failures.push(
                    Failure::new(messages.expected_key_missing(kind.label(), bare))
                        .breadcrumb(bare),
                ),
            }
        }

        if kind == ParamsKind::Query {
            for name in actual.keys() {
                if !self.declares(name, kind) {
                    failures.push(
                        Failure::new(messages.unexpected_key(kind.label(), name))
                            .breadcrumb(name.as_str()),
                    );
                }
            }
        }

        MatchResult::from_failures(failures)
    }

    /// Optional parameters are included unless they recurse without end.
    pub fn generate(&self, resolver: &Resolver) -> Result<BTreeMap<String, String>, ContractError> {
        let mut out = BTreeMap::new();
        for (name, pattern) in &self.params {
            let (bare, optional) = split_name(name);
            match resolver.generate_keyed(bare, pattern) {
                Ok(value) => {
                    out.insert(bare.to_string(), value_to_text(&value));
                }
                Err(ContractError::CyclicGeneration { .. }) if optional => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub fn new_based_on(&self, row: &Row, resolver: &Resolver) -> Result<Vec<ParamsPattern>, ContractError> {
        let mut slots: Vec<Vec<Option<(String, Pattern)>>> = Vec::new();
        for (name, pattern) in &self.params {
            let (bare, optional) = split_name(name);
            let mut options: Vec<Option<(String, Pattern)>> = narrow_keyed(bare, pattern, row, resolver)?
                .into_iter()
                .map(|narrowed| Some((bare.to_string(), narrowed)))
                .collect();
            if optional && !row.contains(bare) {
                options.push(None);
            }
            slots.push(options);
        }
        Ok(product(slots, resolver.variant_limit())
            .into_iter()
            .map(|combination| ParamsPattern {
                params: combination.into_iter().flatten().collect(),
            })
            .collect())
    }

    /// Does every parameter set `other` accepts also satisfy `self`?
    pub fn encompasses(
        &self,
        other: &ParamsPattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        kind: ParamsKind,
    ) -> MatchResult {
        let messages = this_resolver.messages();
        let mut failures = Vec::new();

        for (name, mine) in &self.params {
            let (bare, optional) = split_name(name);
            let theirs = other.params.iter().find(|(key, _)| {
                let (other_bare, _) = split_name(key);
                match kind {
                    ParamsKind::Query => other_bare == bare,
                    ParamsKind::Headers => other_bare.eq_ignore_ascii_case(bare),
                }
            });
            match theirs {
                Some((key, _)) if !optional && split_name(key).1 => failures.push(
                    Failure::new(messages.expected_key_missing(kind.label(), bare)).breadcrumb(bare),
                ),
                Some((_, pattern)) => {
                    if let Some(failure) = mine
                        .encompasses(pattern, this_resolver, other_resolver)
                        .into_failure()
                    {
                        failures.push(failure.breadcrumb(bare));
                    }
                }
                None if optional => {}
                None => failures.push(
                    Failure::new(messages.expected_key_missing(kind.label(), bare)).breadcrumb(bare),
                ),
            }
        }

        if kind == ParamsKind::Query {
            for name in other.params.keys() {
                let (bare, _) = split_name(name);
                if !self.declares(bare, kind) {
                    failures.push(
                        Failure::new(messages.unexpected_key(kind.label(), bare)).breadcrumb(bare),
                    );
                }
            }
        }

        MatchResult::from_failures(failures)
    }

    pub fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        self.params.values().try_for_each(|p| p.validate(resolver))
    }
}
