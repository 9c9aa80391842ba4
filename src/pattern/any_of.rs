//! Composed patterns: a value matches when any branch does.
//!
//! With a [`Discriminator`], the value of one property picks exactly one
//! branch up front and only that branch is tried.

use super::{
    contract_failure, describe, mismatch, parse_json_or_text, Failure, FailureReason, MatchResult,
    Pattern, Resolver, Row,
};
use crate::errors::ContractError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discriminator {
    pub property: String,
    /// Discriminator value to branch index.
    pub mapping: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyOfPattern {
    branches: Vec<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    discriminator: Option<Discriminator>,
}

impl AnyOfPattern {
    pub fn new(branches: Vec<Pattern>) -> Self {
        Self {
            branches,
            discriminator: None,
        }
    }

    pub fn with_discriminator(
        mut self,
        property: impl Into<String>,
        mapping: BTreeMap<String, usize>,
    ) -> Self {
        self.discriminator = Some(Discriminator {
            property: property.into(),
            mapping,
        });
        self
    }

    pub fn branches(&self) -> &[Pattern] {
        &self.branches
    }

    pub fn discriminator(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    /// The single non-null branch of a nullable pattern.
    fn nullable_inner(&self) -> Option<&Pattern> {
        let mut non_null = self.branches.iter().filter(|b| **b != Pattern::Null);
        match (non_null.next(), non_null.next()) {
            (Some(inner), None) if self.branches.len() == 2 => Some(inner),
            _ => None,
        }
    }

    pub(super) fn type_name(&self) -> String {
        if let Some(inner) = self.nullable_inner() {
            return format!("{} or null", inner.type_name());
        }
        let names: Vec<String> = self.branches.iter().map(Pattern::type_name).collect();
        format!("one of ({})", names.join(", "))
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        if let Some(discriminator) = &self.discriminator {
            return self.match_discriminated(discriminator, value, resolver);
        }

        if !value.is_null() {
            if let Some(inner) = self.nullable_inner() {
                return inner.matches(value, resolver);
            }
        }

        if self.branches.is_empty() {
            return MatchResult::failure(format!(
                "anyOf has no branches, so {} cannot match",
                describe(value)
            ));
        }

        let mut failures = Vec::new();
        for branch in &self.branches {
            match branch.matches(value, resolver) {
                MatchResult::Success => return MatchResult::Success,
                result if result.is_fatal() => return result,
                MatchResult::Failure(failure) => failures.push(failure),
            }
        }
        MatchResult::Failure(Failure::caused_by(
            resolver
                .messages()
                .mismatch(&self.type_name(), &describe(value)),
            Failure::combine(failures),
        ))
    }

    fn match_discriminated(
        &self,
        discriminator: &Discriminator,
        value: &Value,
        resolver: &Resolver,
    ) -> MatchResult {
        let Value::Object(map) = value else {
            return mismatch(resolver, "json object", value);
        };
        let property = discriminator.property.as_str();
        let Some(raw) = map.get(property) else {
            return MatchResult::Failure(
                Failure::new(
                    resolver
                        .messages()
                        .expected_key_missing("discriminator property", property),
                )
                .breadcrumb(property),
            );
        };
        let key = match raw {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let Some(&index) = discriminator.mapping.get(&key) else {
            let known: Vec<&str> = discriminator.mapping.keys().map(String::as_str).collect();
            return MatchResult::Failure(
                Failure::new(format!(
                    "Unrecognized discriminator value {}; expected one of [{}]",
                    describe(raw),
                    known.join(", ")
                ))
                .with_reason(FailureReason::DiscriminatorMismatch)
                .breadcrumb(property),
            );
        };
        match self.branches.get(index) {
            Some(branch) => branch.matches(value, resolver),
            None => contract_failure(&ContractError::DiscriminatorMapping {
                value: key,
                index,
                branches: self.branches.len(),
            }),
        }
    }

    /// Branches are tried from a random starting point; one that recurses
    /// without end is skipped in favour of the next.
    pub(super) fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        if let Some(discriminator) = &self.discriminator {
            return self.generate_discriminated(discriminator, resolver);
        }
        if self.branches.is_empty() {
            return Err(ContractError::InvalidPattern(
                "anyOf has no branches".to_string(),
            ));
        }

        let start = rand::rng().random_range(0..self.branches.len());
        let mut last_error = None;
        for offset in 0..self.branches.len() {
            let branch = &self.branches[(start + offset) % self.branches.len()];
            match branch.generate(resolver) {
                Ok(value) => return Ok(value),
                Err(e @ ContractError::CyclicGeneration { .. }) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ContractError::InvalidPattern("anyOf has no branches".to_string())
        }))
    }

    fn generate_discriminated(
        &self,
        discriminator: &Discriminator,
        resolver: &Resolver,
    ) -> Result<Value, ContractError> {
        let entries: Vec<(&String, &usize)> = discriminator.mapping.iter().collect();
        if entries.is_empty() {
            return Err(ContractError::InvalidPattern(format!(
                "discriminator '{}' has no mapping",
                discriminator.property
            )));
        }

        let start = rand::rng().random_range(0..entries.len());
        let mut last_error = None;
        for offset in 0..entries.len() {
            let (value, &index) = entries[(start + offset) % entries.len()];
            let branch =
                self.branches
                    .get(index)
                    .ok_or_else(|| ContractError::DiscriminatorMapping {
                        value: value.clone(),
                        index,
                        branches: self.branches.len(),
                    })?;
            match branch.generate(resolver) {
                Ok(mut generated) => {
                    if let Value::Object(map) = &mut generated {
                        map.insert(discriminator.property.clone(), Value::String(value.clone()));
                    }
                    return Ok(generated);
                }
                Err(e @ ContractError::CyclicGeneration { .. }) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ContractError::InvalidPattern("discriminator has no usable branch".to_string())
        }))
    }

    pub(super) fn new_based_on(
        &self,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        if let Some(discriminator) = &self.discriminator {
            return self.new_based_on_discriminated(discriminator, row, resolver);
        }
        let limit = resolver.variant_limit();
        let mut variants = Vec::new();
        for branch in &self.branches {
            for variant in branch.new_based_on(row, resolver)? {
                if variants.len() >= limit {
                    return Ok(variants);
                }
                variants.push(variant);
            }
        }
        Ok(variants)
    }

    /// One group of variants per mapped value, each carrying that value as
    /// its discriminator property.
    fn new_based_on_discriminated(
        &self,
        discriminator: &Discriminator,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        let limit = resolver.variant_limit();
        let mut variants = Vec::new();
        for (value, &index) in &discriminator.mapping {
            let branch =
                self.branches
                    .get(index)
                    .ok_or_else(|| ContractError::DiscriminatorMapping {
                        value: value.clone(),
                        index,
                        branches: self.branches.len(),
                    })?;
            for variant in branch.new_based_on(row, resolver)? {
                if variants.len() >= limit {
                    return Ok(variants);
                }
                variants.push(pin_discriminator(variant, &discriminator.property, value));
            }
        }
        Ok(variants)
    }

    pub(super) fn parse(&self, raw: &str, resolver: &Resolver) -> Result<Value, Failure> {
        for branch in &self.branches {
            if let Ok(value) = branch.parse(raw, resolver) {
                if branch.matches(&value, resolver).is_success() {
                    return Ok(value);
                }
            }
        }
        Ok(parse_json_or_text(raw))
    }

    /// Some branch of `self` must accept everything `other` accepts.
    pub(super) fn encompasses_single(
        &self,
        other: &Pattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        seen: &mut Vec<(String, String)>,
    ) -> MatchResult {
        let mut failures = Vec::new();
        for branch in &self.branches {
            match branch.encompasses_with(other, this_resolver, other_resolver, seen) {
                MatchResult::Success => return MatchResult::Success,
                result if result.is_fatal() => return result,
                MatchResult::Failure(failure) => failures.push(failure),
            }
        }

        if let Some(inner) = self.nullable_inner() {
            return inner.encompasses_with(other, this_resolver, other_resolver, seen);
        }
        MatchResult::Failure(Failure::caused_by(
            this_resolver
                .messages()
                .mismatch(&self.type_name(), &other.type_name()),
            Failure::combine(failures),
        ))
    }

    pub(super) fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        if self.branches.is_empty() {
            return Err(ContractError::InvalidPattern(
                "anyOf has no branches".to_string(),
            ));
        }
        for branch in &self.branches {
            branch.validate(resolver)?;
        }
        if let Some(discriminator) = &self.discriminator {
            for (value, &index) in &discriminator.mapping {
                if index >= self.branches.len() {
                    return Err(ContractError::DiscriminatorMapping {
                        value: value.clone(),
                        index,
                        branches: self.branches.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn pin_discriminator(variant: Pattern, property: &str, value: &str) -> Pattern {
    match variant {
        Pattern::Object(object) => Pattern::Object(
            object.with_required_property(property, Pattern::exact(Value::String(value.to_string()))),
        ),
        // References left unexpanded keep the discriminated form.
        other => Pattern::AnyOf(
            AnyOfPattern::new(vec![other])
                .with_discriminator(property, [(value.to_string(), 0)].into()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pets() -> AnyOfPattern {
        let cat = Pattern::object([("kind", Pattern::string()), ("meows", Pattern::Boolean)]);
        let dog = Pattern::object([("kind", Pattern::string()), ("barks", Pattern::Boolean)]);
        AnyOfPattern::new(vec![cat, dog]).with_discriminator(
            "kind",
            [("cat".to_string(), 0), ("dog".to_string(), 1)].into(),
        )
    }

    #[test]
    fn test_discriminator_picks_one_branch() {
        let resolver = Resolver::default();
        let pattern = pets();
        assert!(pattern
            .matches(&json!({"kind": "dog", "barks": true}), &resolver)
            .is_success());
        let wrong_branch = pattern.matches(&json!({"kind": "dog", "meows": true}), &resolver);
        let report = wrong_branch.report().to_string();
        assert!(report.contains("barks"));
    }

    #[test]
    fn test_unrecognized_discriminator_value() {
        let resolver = Resolver::default();
        let result = pets().matches(&json!({"kind": "fish"}), &resolver);
        let failure = result.as_failure().unwrap();
        assert_eq!(failure.reason(), Some(FailureReason::DiscriminatorMismatch));
        assert!(failure.report().to_string().contains("Unrecognized discriminator value"));
    }

    #[test]
    fn test_discriminated_generation_sets_property() {
        let resolver = Resolver::default();
        let pattern = pets();
        for _ in 0..10 {
            let value = pattern.generate(&resolver).unwrap();
            assert!(pattern.matches(&value, &resolver).is_success(), "{}", value);
        }
    }

    #[test]
    fn test_bad_mapping_is_a_contract_error() {
        let resolver = Resolver::default();
        let pattern = AnyOfPattern::new(vec![Pattern::object([("kind", Pattern::string())])])
            .with_discriminator("kind", [("ghost".to_string(), 3)].into());
        assert!(matches!(
            pattern.validate(&resolver),
            Err(ContractError::DiscriminatorMapping { index: 3, .. })
        ));
        assert!(pattern
            .matches(&json!({"kind": "ghost"}), &resolver)
            .is_fatal());
    }

    #[test]
    fn test_nullable_reports_inner_failure() {
        let resolver = Resolver::default();
        let pattern = AnyOfPattern::new(vec![Pattern::Null, Pattern::number()]);
        assert!(pattern.matches(&json!(null), &resolver).is_success());
        let result = pattern.matches(&json!("x"), &resolver);
        assert!(result.report().to_string().contains("expected number"));
    }

    #[test]
    fn test_new_based_on_expands_each_branch() {
        let resolver = Resolver::default();
        let variants = pets().new_based_on(&Row::new(), &resolver).unwrap();
        assert_eq!(variants.len(), 2);
    }

    #[test]
    fn test_discriminated_variants_generate_matching_values() {
        let resolver = Resolver::default();
        let pattern = pets();
        let variants = pattern.new_based_on(&Row::new(), &resolver).unwrap();
        let mut kinds = Vec::new();
        for variant in &variants {
            for _ in 0..5 {
                let value = variant.generate(&resolver).unwrap();
                assert!(pattern.matches(&value, &resolver).is_success(), "{}", value);
                kinds.push(value["kind"].clone());
            }
        }
        assert!(kinds.contains(&json!("cat")));
        assert!(kinds.contains(&json!("dog")));
    }

    #[test]
    fn test_discriminated_reference_variant_keeps_mapping() {
        let resolver = Resolver::default().with_additional_pattern(
            "Cat",
            Pattern::object([("kind", Pattern::string()), ("meows", Pattern::Boolean)]),
        );
        let pattern = AnyOfPattern::new(vec![Pattern::reference("Cat")])
            .with_discriminator("kind", [("cat".to_string(), 0)].into());
        let pinned = pin_discriminator(Pattern::reference("Cat"), "kind", "cat");
        let value = pinned.generate(&resolver).unwrap();
        assert_eq!(value["kind"], json!("cat"));
        assert!(pattern.matches(&value, &resolver).is_success());
    }

    #[test]
    fn test_empty_any_of_reports_a_message() {
        let resolver = Resolver::default();
        let result = AnyOfPattern::new(Vec::new()).matches(&json!(1), &resolver);
        let report = result.report().to_string();
        assert!(report.contains("no branches"), "{}", report);
    }
}
