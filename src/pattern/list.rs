//! Homogeneous lists and fixed-shape tuples.

use super::row::product;
use super::{mismatch, Failure, MatchResult, Pattern, Resolver, Row};
use crate::errors::ContractError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_GENERATED_ITEMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPattern {
    element: Box<Pattern>,
}

impl ListPattern {
    pub fn new(element: Pattern) -> Self {
        Self {
            element: Box::new(element),
        }
    }

    pub fn element(&self) -> &Pattern {
        &self.element
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        let Value::Array(items) = value else {
            return mismatch(resolver, "json array", value);
        };
        let failures: Vec<Failure> = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                self.element
                    .matches(item, resolver)
                    .into_failure()
                    .map(|f| f.breadcrumb(format!("[{}]", i)))
            })
            .collect();
        MatchResult::from_failures(failures)
    }

    /// A list whose element type recurses into itself is generated empty.
    pub(super) fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        let count = rand::rng().random_range(1..=MAX_GENERATED_ITEMS);
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            match self.element.generate(resolver) {
                Ok(item) => items.push(item),
                Err(ContractError::CyclicGeneration { .. }) => return Ok(Value::Array(Vec::new())),
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Array(items))
    }

    pub(super) fn new_based_on(
        &self,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        Ok(self
            .element
            .new_based_on(row, resolver)?
            .into_iter()
            .map(Pattern::list_of)
            .collect())
    }

    pub(super) fn encompasses_tuple(
        &self,
        other: &TuplePattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        seen: &mut Vec<(String, String)>,
    ) -> MatchResult {
        let failures: Vec<Failure> = other
            .elements
            .iter()
            .enumerate()
            .filter_map(|(i, theirs)| {
                self.element
                    .encompasses_with(theirs, this_resolver, other_resolver, seen)
                    .into_failure()
                    .map(|f| f.breadcrumb(format!("[{}]", i)))
            })
            .collect();
        MatchResult::from_failures(failures)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuplePattern {
    elements: Vec<Pattern>,
}

impl TuplePattern {
    pub fn new(elements: Vec<Pattern>) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[Pattern] {
        &self.elements
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        let Value::Array(items) = value else {
            return mismatch(resolver, "json array", value);
        };
        if items.len() != self.elements.len() {
            return MatchResult::failure(resolver.messages().mismatch(
                &format!("{} items", self.elements.len()),
                &format!("{} items", items.len()),
            ));
        }
        let failures: Vec<Failure> = self
            .elements
            .iter()
            .zip(items)
            .enumerate()
            .filter_map(|(i, (pattern, item))| {
                pattern
                    .matches(item, resolver)
                    .into_failure()
                    .map(|f| f.breadcrumb(format!("[{}]", i)))
            })
            .collect();
        MatchResult::from_failures(failures)
    }

    pub(super) fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        self.elements
            .iter()
            .map(|p| p.generate(resolver))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    pub(super) fn new_based_on(
        &self,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        let slots = self
            .elements
            .iter()
            .map(|p| p.new_based_on(row, resolver))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(product(slots, resolver.variant_limit())
            .into_iter()
            .map(|elements| Pattern::Tuple(TuplePattern { elements }))
            .collect())
    }

    pub(super) fn encompasses(
        &self,
        other: &TuplePattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
        seen: &mut Vec<(String, String)>,
    ) -> MatchResult {
        if self.elements.len() != other.elements.len() {
            return MatchResult::failure(this_resolver.messages().mismatch(
                &format!("{} items", self.elements.len()),
                &format!("{} items", other.elements.len()),
            ));
        }
        let failures: Vec<Failure> = self
            .elements
            .iter()
            .zip(&other.elements)
            .enumerate()
            .filter_map(|(i, (mine, theirs))| {
                mine.encompasses_with(theirs, this_resolver, other_resolver, seen)
                    .into_failure()
                    .map(|f| f.breadcrumb(format!("[{}]", i)))
            })
            .collect();
        MatchResult::from_failures(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_reports_index_breadcrumb() {
        let resolver = Resolver::default();
        let pattern = ListPattern::new(Pattern::number());
        let result = pattern.matches(&json!([1, 2, "three"]), &resolver);
        assert_eq!(result.report().entries()[0].rendered_path(), "[2]");
        assert!(pattern.matches(&json!([]), &resolver).is_success());
    }

    #[test]
    fn test_tuple_length_must_agree() {
        let resolver = Resolver::default();
        let pattern = TuplePattern::new(vec![Pattern::string(), Pattern::number()]);
        assert!(pattern.matches(&json!(["a", 1]), &resolver).is_success());
        assert!(pattern.matches(&json!(["a"]), &resolver).is_failure());
    }

    #[test]
    fn test_list_generation_matches() {
        let resolver = Resolver::default();
        let pattern = ListPattern::new(Pattern::Uuid);
        let value = pattern.generate(&resolver).unwrap();
        let items = value.as_array().unwrap();
        assert!(!items.is_empty() && items.len() <= MAX_GENERATED_ITEMS);
        assert!(pattern.matches(&value, &resolver).is_success());
    }

    #[test]
    fn test_list_encompasses_tuple_of_compatible_items() {
        let resolver = Resolver::default();
        let list = ListPattern::new(Pattern::string());
        let tuple = TuplePattern::new(vec![Pattern::exact(json!("a")), Pattern::Uuid]);
        assert!(list
            .encompasses_tuple(&tuple, &resolver, &resolver, &mut Vec::new())
            .is_success());
    }
}
