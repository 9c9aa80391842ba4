//! Unit tests for the pattern engine
//!
//! Tests cover:
//! - Object matching and breadcrumbed reports
//! - Pattern tokens
//! - References between named patterns
//! - Encompassing for compatibility

use serde_json::json;
use specmock::pattern::token::{is_token, parse_token};
use specmock::pattern::{MatchResult, Pattern, Resolver, StringPattern};
use std::collections::BTreeMap;

fn person() -> Pattern {
    Pattern::object([
        ("name", Pattern::string()),
        ("age?", Pattern::integer()),
        ("tags", Pattern::list_of(Pattern::string())),
    ])
}

// ============================================================================
// Matching
// ============================================================================

mod matching_tests {
    use super::*;

    #[test]
    fn test_optional_key_may_be_absent() {
        let resolver = Resolver::default();
        let value = json!({"name": "Ada", "tags": []});
        assert!(person().matches(&value, &resolver).is_success());
    }

    #[test]
    fn test_missing_required_key_is_reported_by_name() {
        let resolver = Resolver::default();
        let failure = person()
            .matches(&json!({"tags": []}), &resolver)
            .into_failure()
            .unwrap();
        assert!(failure.has_breadcrumb("name"));
    }

    #[test]
    fn test_unexpected_key_fails() {
        let resolver = Resolver::default();
        let value = json!({"name": "Ada", "tags": [], "email": "a@b.c"});
        let failure = person().matches(&value, &resolver).into_failure().unwrap();
        assert!(failure.has_breadcrumb("email"));
    }

    #[test]
    fn test_every_bad_field_is_reported() {
        let resolver = Resolver::default();
        let value = json!({"name": 7, "age": "old", "tags": ["ok"]});
        let report = person().matches(&value, &resolver).report();
        let paths: Vec<String> = report.entries().iter().map(|e| e.rendered_path()).collect();
        assert!(paths.contains(&"name".to_string()), "{:?}", paths);
        assert!(paths.contains(&"age".to_string()), "{:?}", paths);
    }

    #[test]
    fn test_nullable_accepts_null() {
        let resolver = Resolver::default();
        let pattern = Pattern::nullable(Pattern::number());
        assert!(pattern.matches(&json!(null), &resolver).is_success());
        assert!(pattern.matches(&json!(4.5), &resolver).is_success());
        assert!(pattern.matches(&json!("x"), &resolver).is_failure());
    }

    #[test]
    fn test_enum_matches_listed_values_only() {
        let resolver = Resolver::default();
        let pattern = Pattern::enumeration(vec![json!("red"), json!("green")]);
        assert!(pattern.matches(&json!("red"), &resolver).is_success());
        assert!(pattern.matches(&json!("blue"), &resolver).is_failure());
    }
}

// ============================================================================
// Tokens & references
// ============================================================================

mod token_tests {
    use super::*;

    #[test]
    fn test_token_recognition() {
        assert!(is_token("(string)"));
        assert!(is_token("(Person*)"));
        assert!(!is_token("plain text"));
    }

    #[test]
    fn test_list_token_matches_lists() {
        let pattern = parse_token("(number*)").unwrap();
        let resolver = Resolver::default();
        assert!(pattern.matches(&json!([1, 2, 3]), &resolver).is_success());
        assert!(pattern.matches(&json!(["a"]), &resolver).is_failure());
    }

    #[test]
    fn test_reference_resolves_named_pattern() {
        let mut patterns = BTreeMap::new();
        patterns.insert("Person".to_string(), person());
        let resolver = Resolver::new(patterns);
        let pattern = Pattern::reference("Person");
        assert!(pattern
            .matches(&json!({"name": "Ada", "tags": ["x"]}), &resolver)
            .is_success());
        assert!(pattern.matches(&json!({"tags": []}), &resolver).is_failure());
    }

    #[test]
    fn test_unknown_reference_is_a_contract_error() {
        let pattern = Pattern::reference("Missing");
        assert!(pattern.generate(&Resolver::default()).is_err());
        assert!(pattern.validate(&Resolver::default()).is_err());
    }
}

// ============================================================================
// Generation & compatibility
// ============================================================================

mod generation_tests {
    use super::*;

    #[test]
    fn test_generated_value_matches() {
        let resolver = Resolver::default();
        let value = person().generate(&resolver).unwrap();
        assert_eq!(person().matches(&value, &resolver), MatchResult::Success);
    }

    #[test]
    fn test_facts_seed_generation() {
        let resolver = Resolver::default().with_fact("name", json!("Grace"));
        let value = person().generate(&resolver).unwrap();
        assert_eq!(value["name"], json!("Grace"));
    }

    #[test]
    fn test_bounded_string_generation_respects_bounds() {
        let pattern = Pattern::String(StringPattern::default().with_min_length(3).with_max_length(4));
        for _ in 0..20 {
            let value = pattern.generate(&Resolver::default()).unwrap();
            let length = value.as_str().unwrap().chars().count();
            assert!((3..=4).contains(&length));
        }
    }

    #[test]
    fn test_wider_string_encompasses_narrower() {
        let resolver = Resolver::default();
        let wide = Pattern::String(StringPattern::default().with_max_length(10));
        let narrow = Pattern::String(StringPattern::default().with_max_length(5));
        assert!(wide.encompasses(&narrow, &resolver, &resolver).is_success());
        assert!(narrow.encompasses(&wide, &resolver, &resolver).is_failure());
    }

    #[test]
    fn test_any_encompasses_everything() {
        let resolver = Resolver::default();
        assert!(Pattern::Any
            .encompasses(&person(), &resolver, &resolver)
            .is_success());
    }
}
