//! The context threaded through every pattern operation.
//!
//! A [`Resolver`] is a cheap-to-clone snapshot: named pattern definitions and
//! facts live behind `Arc`s, and every `with_*` method returns a new resolver
//! instead of mutating one that other matches may be sharing.

use super::{token, Pattern};
use crate::errors::ContractError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// How many times a named type may appear on the generation stack before
/// generation treats it as a cycle.
pub const MAX_TYPE_OCCURRENCES: usize = 2;

/// Upper bound on the number of variants produced by example-row expansion.
pub const DEFAULT_VARIANT_LIMIT: usize = 64;

/// Wording strategy for mismatch messages.
pub trait MismatchMessages: Send + Sync {
    fn mismatch(&self, expected: &str, actual: &str) -> String;
    fn unexpected_key(&self, key_label: &str, key: &str) -> String;
    fn expected_key_missing(&self, key_label: &str, key: &str) -> String;
}

/// Names the two parties being compared, e.g. "Contract" and "request".
#[derive(Debug, Clone, Copy)]
pub struct PartyMessages {
    expected_by: &'static str,
    actual_in: &'static str,
}

impl PartyMessages {
    pub const fn new(expected_by: &'static str, actual_in: &'static str) -> Self {
        Self {
            expected_by,
            actual_in,
        }
    }
}

impl MismatchMessages for PartyMessages {
    fn mismatch(&self, expected: &str, actual: &str) -> String {
        format!(
            "{} expected {} but {} contained {}",
            self.expected_by, expected, self.actual_in, actual
        )
    }

    fn unexpected_key(&self, key_label: &str, key: &str) -> String {
        format!(
            "{} named \"{}\" in the {} was not in the {}",
            capitalize(key_label),
            key,
            self.actual_in,
            self.expected_by.to_lowercase()
        )
    }

    fn expected_key_missing(&self, key_label: &str, key: &str) -> String {
        format!(
            "{} expected {} named \"{}\" but it was missing from the {}",
            self.expected_by, key_label, key, self.actual_in
        )
    }
}

pub const DEFAULT_MESSAGES: PartyMessages = PartyMessages::new("Pattern", "value");
pub const CONTRACT_VS_REQUEST: PartyMessages = PartyMessages::new("Contract", "request");
pub const CONTRACT_VS_RESPONSE: PartyMessages = PartyMessages::new("Contract", "response");
pub const CONTRACT_VS_STUB: PartyMessages = PartyMessages::new("Contract", "stub");
pub const CONTRACT_VS_EXAMPLE: PartyMessages = PartyMessages::new("Contract", "example");
pub const STUB_VS_REQUEST: PartyMessages = PartyMessages::new("Stub", "request");

/// Wording used when comparing two versions of a contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewVsOldContract;

impl MismatchMessages for NewVsOldContract {
    fn mismatch(&self, expected: &str, actual: &str) -> String {
        format!(
            "This is {} in the new contract but {} in the old contract",
            expected, actual
        )
    }

    fn unexpected_key(&self, key_label: &str, key: &str) -> String {
        format!(
            "The old contract has {} \"{}\" which the new contract does not accept",
            key_label, key
        )
    }

    fn expected_key_missing(&self, key_label: &str, key: &str) -> String {
        format!(
            "The new contract requires {} \"{}\" which the old contract does not always provide",
            key_label, key
        )
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Clone)]
pub struct Resolver {
    patterns: Arc<BTreeMap<String, Pattern>>,
    facts: Arc<BTreeMap<String, Value>>,
    generation_mode: bool,
    messages: Arc<dyn MismatchMessages>,
    type_stack: Vec<String>,
    variant_limit: usize,
}

impl Resolver {
    pub fn new(patterns: BTreeMap<String, Pattern>) -> Self {
        Self {
            patterns: Arc::new(patterns),
            ..Self::default()
        }
    }

    pub fn with_additional_pattern(&self, name: impl Into<String>, pattern: Pattern) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.patterns).insert(name.into(), pattern);
        next
    }

    pub fn with_facts(&self, facts: BTreeMap<String, Value>) -> Self {
        Self {
            facts: Arc::new(facts),
            ..self.clone()
        }
    }

    pub fn with_fact(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.facts).insert(key.into(), value);
        next
    }

    /// In generation mode, values that are pattern tokens such as `(string)`
    /// are matched by type instead of by value.
    pub fn in_generation_mode(&self) -> Self {
        Self {
            generation_mode: true,
            ..self.clone()
        }
    }

    pub fn with_mismatch_messages(&self, messages: Arc<dyn MismatchMessages>) -> Self {
        Self {
            messages,
            ..self.clone()
        }
    }

    pub fn with_variant_limit(&self, limit: usize) -> Self {
        Self {
            variant_limit: limit.max(1),
            ..self.clone()
        }
    }

    pub fn is_generation_mode(&self) -> bool {
        self.generation_mode
    }

    pub fn messages(&self) -> &dyn MismatchMessages {
        self.messages.as_ref()
    }

    pub fn variant_limit(&self) -> usize {
        self.variant_limit
    }

    pub fn patterns(&self) -> &BTreeMap<String, Pattern> {
        &self.patterns
    }

    pub fn facts(&self) -> &BTreeMap<String, Value> {
        &self.facts
    }

    pub fn fact(&self, key: &str) -> Option<&Value> {
        self.facts.get(key)
    }

    /// Look up a named pattern, following alias chains (`A` defined as `(B)`).
    pub fn resolve(&self, name: &str) -> Result<&Pattern, ContractError> {
        let mut current = name;
        let mut seen: Vec<&str> = Vec::new();
        loop {
            let pattern = self
                .patterns
                .get(current)
                .ok_or_else(|| ContractError::UnknownPattern {
                    name: current.to_string(),
                })?;
            match pattern {
                Pattern::Reference(next) => {
                    if seen.contains(&next.name()) || next.name() == name {
                        return Err(ContractError::CyclicReference {
                            name: name.to_string(),
                        });
                    }
                    seen.push(current);
                    current = next.name();
                }
                other => return Ok(other),
            }
        }
    }

    /// Enter a named type during generation. Fails once the type has already
    /// been unrolled [`MAX_TYPE_OCCURRENCES`] times on the current path.
    pub fn enter_type(&self, name: &str) -> Result<Resolver, ContractError> {
        let occurrences = self.type_stack.iter().filter(|n| *n == name).count();
        if occurrences >= MAX_TYPE_OCCURRENCES {
            return Err(ContractError::CyclicGeneration {
                name: name.to_string(),
            });
        }
        let mut next = self.clone();
        next.type_stack.push(name.to_string());
        Ok(next)
    }

    /// Generate a value for a named slot (object key, path or query parameter).
    /// A fact stored under the same key wins over a synthesised value.
    pub fn generate_keyed(&self, key: &str, pattern: &Pattern) -> Result<Value, ContractError> {
        match self.facts.get(key) {
            Some(Value::String(text)) if token::is_token(text) => {
                let typed = token::parse_token(text)?;
                let encompassed = pattern.encompasses(&typed, self, self);
                if let Some(failure) = encompassed.as_failure() {
                    return Err(ContractError::InvalidFact {
                        key: key.to_string(),
                        report: failure.report().to_string(),
                    });
                }
                typed.generate(self)
            }
            Some(fact) => {
                let result = pattern.matches(fact, self);
                match result.into_failure() {
                    None => Ok(fact.clone()),
                    Some(failure) => Err(ContractError::InvalidFact {
                        key: key.to_string(),
                        report: failure.report().to_string(),
                    }),
                }
            }
            None => pattern.generate(self),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            patterns: Arc::new(BTreeMap::new()),
            facts: Arc::new(BTreeMap::new()),
            generation_mode: false,
            messages: Arc::new(DEFAULT_MESSAGES),
            type_stack: Vec::new(),
            variant_limit: DEFAULT_VARIANT_LIMIT,
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("patterns", &self.patterns.keys().collect::<Vec<_>>())
            .field("facts", &self.facts)
            .field("generation_mode", &self.generation_mode)
            .field("type_stack", &self.type_stack)
            .field("variant_limit", &self.variant_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_methods_do_not_mutate_original() {
        let base = Resolver::default();
        let extended = base.with_additional_pattern("Id", Pattern::string());
        let with_fact = base.with_fact("id", json!("abc"));

        assert!(base.patterns().is_empty());
        assert!(base.facts().is_empty());
        assert!(extended.patterns().contains_key("Id"));
        assert_eq!(with_fact.fact("id"), Some(&json!("abc")));
    }

    #[test]
    fn test_resolve_unknown_pattern() {
        let resolver = Resolver::default();
        assert_eq!(
            resolver.resolve("Missing"),
            Err(ContractError::UnknownPattern {
                name: "Missing".into()
            })
        );
    }

    #[test]
    fn test_resolve_follows_aliases() {
        let resolver = Resolver::default()
            .with_additional_pattern("Id", Pattern::reference("Text"))
            .with_additional_pattern("Text", Pattern::string());
        assert_eq!(resolver.resolve("Id"), Ok(&Pattern::string()));
    }

    #[test]
    fn test_resolve_detects_alias_cycles() {
        let resolver = Resolver::default()
            .with_additional_pattern("A", Pattern::reference("B"))
            .with_additional_pattern("B", Pattern::reference("A"));
        assert!(matches!(
            resolver.resolve("A"),
            Err(ContractError::CyclicReference { .. })
        ));
    }

    #[test]
    fn test_enter_type_bounds_unrolling() {
        let resolver = Resolver::default();
        let once = resolver.enter_type("Node").unwrap();
        let twice = once.enter_type("Node").unwrap();
        assert!(twice.enter_type("Node").is_err());
        assert!(twice.enter_type("Other").is_ok());
    }

    #[test]
    fn test_generate_keyed_prefers_fact() {
        let resolver = Resolver::default().with_fact("id", json!(42));
        let value = resolver.generate_keyed("id", &Pattern::number()).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn test_generate_keyed_rejects_mismatched_fact() {
        let resolver = Resolver::default().with_fact("id", json!("not a number"));
        let err = resolver.generate_keyed("id", &Pattern::number()).unwrap_err();
        assert!(matches!(err, ContractError::InvalidFact { .. }));
    }

    #[test]
    fn test_generate_keyed_with_type_token_fact() {
        let resolver = Resolver::default().with_fact("id", json!("(number)"));
        let value = resolver.generate_keyed("id", &Pattern::number()).unwrap();
        assert!(value.is_number());
    }

    #[test]
    fn test_party_messages_wording() {
        let text = CONTRACT_VS_REQUEST.mismatch("number", "\"abc\"");
        assert_eq!(text, "Contract expected number but request contained \"abc\"");
        let missing = STUB_VS_REQUEST.expected_key_missing("key", "id");
        assert!(missing.starts_with("Stub expected key named \"id\""));
        let unexpected = CONTRACT_VS_EXAMPLE.unexpected_key("key", "extra");
        assert!(unexpected.starts_with("Key named \"extra\" in the example"));
    }
}
