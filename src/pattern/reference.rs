//! Deferred patterns, resolved by name when used.

use super::{contract_failure, Failure, FailureReason, MatchResult, Pattern, Resolver, Row};
use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePattern {
    name: String,
}

impl ReferencePattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(super) fn matches(&self, value: &Value, resolver: &Resolver) -> MatchResult {
        match resolver.resolve(&self.name) {
            Ok(target) => target.matches(value, resolver),
            Err(e) => contract_failure(&e),
        }
    }

    pub(super) fn generate(&self, resolver: &Resolver) -> Result<Value, ContractError> {
        let inner = resolver.enter_type(&self.name)?;
        let target = inner.resolve(&self.name)?;
        target.generate(&inner)
    }

    /// Expansion stops at the unrolling bound and keeps the reference itself.
    pub(super) fn new_based_on(
        &self,
        row: &Row,
        resolver: &Resolver,
    ) -> Result<Vec<Pattern>, ContractError> {
        let inner = match resolver.enter_type(&self.name) {
            Ok(inner) => inner,
            Err(ContractError::CyclicGeneration { .. }) => {
                return Ok(vec![Pattern::Reference(self.clone())])
            }
            Err(e) => return Err(e),
        };
        let target = inner.resolve(&self.name)?;
        target.new_based_on(row, &inner)
    }

    pub(super) fn parse(&self, raw: &str, resolver: &Resolver) -> Result<Value, Failure> {
        match resolver.resolve(&self.name) {
            Ok(target) => target.parse(raw, resolver),
            Err(e) => Err(Failure::new(e.to_string()).with_reason(FailureReason::InvalidContract)),
        }
    }
}
