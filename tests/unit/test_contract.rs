//! Unit tests for contract documents
//!
//! Tests cover:
//! - Parsing and validating JSON contracts
//! - Scenario lookup and generated responses
//! - Staged server state
//! - Conformance test generation

use serde_json::json;
use specmock::contract::{Feature, ServerState};
use specmock::errors::{ContractError, MatchError};
use specmock::http::{HttpMethod, HttpRequest, HttpResponse};

fn products_json() -> String {
    json!({
        "name": "products",
        "scenarios": [
            {
                "name": "fetch product",
                "request": {"method": "GET", "path": "/products/(id:string)"},
                "response": {
                    "status": 200,
                    "body": {"type": "reference", "name": "Product"}
                },
                "patterns": {
                    "Product": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "price": {"type": "number"}
                        }
                    }
                },
                "examples": [{"name": "known", "columns": {"id": "p-1"}}]
            },
            {
                "request": {
                    "method": "POST",
                    "path": "/products",
                    "body": {
                        "type": "object",
                        "properties": {"name": {"type": "string", "maxLength": 20}}
                    }
                },
                "response": {"status": 201}
            }
        ]
    })
    .to_string()
}

fn products() -> Feature {
    Feature::from_json("products.json", &products_json()).unwrap()
}

// ============================================================================
// Parsing
// ============================================================================

mod parsing_tests {
    use super::*;

    #[test]
    fn test_parses_scenarios_in_order() {
        let feature = products();
        assert_eq!(feature.name(), "products");
        assert_eq!(feature.scenarios().len(), 2);
        assert_eq!(feature.scenarios()[0].label(), "GET /products/(id:string) (fetch product)");
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let err = Feature::from_json("broken.json", "{not json").unwrap_err();
        assert!(matches!(err, ContractError::InvalidDocument { .. }));
    }

    #[test]
    fn test_dangling_reference_fails_validation() {
        let doc = json!({
            "scenarios": [{
                "request": {"method": "GET", "path": "/x"},
                "response": {"status": 200, "body": {"type": "reference", "name": "Nowhere"}}
            }]
        });
        let err = Feature::from_json("dangling.json", &doc.to_string()).unwrap_err();
        assert!(matches!(err, ContractError::UnknownPattern { .. }), "{:?}", err);
    }

    #[test]
    fn test_unnamed_feature_takes_source_name() {
        let doc = json!({"scenarios": []});
        let feature = Feature::from_json("inline", &doc.to_string()).unwrap();
        assert_eq!(feature.name(), "inline");
    }
}

// ============================================================================
// Lookup
// ============================================================================

mod lookup_tests {
    use super::*;

    #[test]
    fn test_generated_response_conforms() {
        let feature = products();
        let request = HttpRequest::new(HttpMethod::Get, "/products/p-9");
        let (scenario, response) = feature.lookup_response(&request, &ServerState::new()).unwrap();
        assert_eq!(response.status, 200);
        assert!(response.body["id"].is_string());
        assert!(response.body["price"].is_number());
        assert!(scenario.matches_response(&response).is_success());
    }

    #[test]
    fn test_staged_state_shapes_response() {
        let feature = products();
        let mut state = ServerState::new();
        state.insert("id".to_string(), json!("from-state"));
        let request = HttpRequest::new(HttpMethod::Get, "/products/p-9");
        let (_, response) = feature.lookup_response(&request, &state).unwrap();
        assert_eq!(response.body["id"], json!("from-state"));
    }

    #[test]
    fn test_body_mismatch_is_reported_under_body() {
        let feature = products();
        let request = HttpRequest::new(HttpMethod::Post, "/products")
            .with_body(json!({"name": "a name that is much too long for the contract"}));
        let err = feature.lookup_response(&request, &ServerState::new()).unwrap_err();
        let MatchError::NoMatchingScenario(results) = err else {
            panic!("expected a plain mismatch");
        };
        let report = results.report().to_string();
        assert!(report.contains("BODY"), "{}", report);
        assert!(report.contains("maxLength 20"), "{}", report);
        // The GET scenario is for another endpoint and stays out of the report.
        assert!(!report.contains("fetch product"), "{}", report);
    }

    #[test]
    fn test_unknown_endpoint_has_no_match() {
        let feature = products();
        let request = HttpRequest::new(HttpMethod::Delete, "/carts/1");
        assert!(feature.lookup_scenario(&request, &ServerState::new()).is_err());
    }

    #[test]
    fn test_expectation_must_conform() {
        let feature = products();
        let request = HttpRequest::new(HttpMethod::Get, "/products/p-1");
        let good = HttpResponse::new(200).with_body(json!({"id": "p-1", "price": 10}));
        assert!(feature.match_expectation(&request, &good).is_ok());

        let bad = HttpResponse::new(200).with_body(json!({"id": "p-1", "price": "free"}));
        assert!(feature.match_expectation(&request, &bad).is_err());
    }
}

// ============================================================================
// Test generation
// ============================================================================

mod generation_tests {
    use super::*;

    #[test]
    fn test_contract_tests_use_example_rows() {
        let tests = products().generate_contract_tests(8).unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].request.path, "/products/p-1");
        assert_eq!(tests[1].request.method, HttpMethod::Post);
        assert!(tests[1].request.body["name"].is_string());
    }

    fn pets() -> Feature {
        let doc = json!({
            "name": "pets",
            "scenarios": [{
                "request": {
                    "method": "POST",
                    "path": "/pets",
                    "body": {
                        "type": "anyOf",
                        "branches": [
                            {"type": "object", "properties": {
                                "kind": {"type": "string"}, "meows": {"type": "boolean"}
                            }},
                            {"type": "object", "properties": {
                                "kind": {"type": "string"}, "barks?": {"type": "boolean"}
                            }}
                        ],
                        "discriminator": {"property": "kind", "mapping": {"cat": 0, "dog": 1}}
                    }
                },
                "response": {"status": 201}
            }]
        });
        Feature::from_json("pets", &doc.to_string()).unwrap()
    }

    #[test]
    fn test_generated_requests_are_accepted_by_their_scenario() {
        for feature in [products(), pets()] {
            let tests = feature.generate_contract_tests(64).unwrap();
            assert!(!tests.is_empty());
            for test in &tests {
                let result = test.scenario.matches(&test.request, &ServerState::new());
                assert!(
                    result.is_success(),
                    "{} {}\n{}",
                    test.request.path,
                    test.request.body,
                    result.report()
                );
            }
        }
    }

    #[test]
    fn test_discriminated_body_covers_every_mapped_value() {
        let tests = pets().generate_contract_tests(64).unwrap();
        let kinds: Vec<_> = tests.iter().map(|t| t.request.body["kind"].clone()).collect();
        assert!(kinds.contains(&json!("cat")), "{:?}", kinds);
        assert!(kinds.contains(&json!("dog")), "{:?}", kinds);
    }
}
