//! Unit tests for the stub engine
//!
//! These drive the serving pipeline directly, without a socket.

use serde_json::{json, Map, Value};
use specmock::config::StubConfig;
use specmock::contract::Feature;
use specmock::http::{HttpMethod, HttpRequest, HttpResponse, FAILURE_KIND_HEADER, SOURCE_HEADER};
use specmock::stub::{loader, Decision, ExpectationDocument, StubEngine, DEFAULT_SESSION};
use std::fs;
use tempfile::tempdir;

fn products() -> Feature {
    let doc = json!({
        "name": "products",
        "scenarios": [{
            "request": {"method": "GET", "path": "/products/(id:string)"},
            "response": {
                "status": 200,
                "body": {
                    "type": "object",
                    "properties": {"id": {"type": "string"}, "price": {"type": "number"}}
                }
            }
        }]
    });
    Feature::from_json("products", &doc.to_string()).unwrap()
}

fn engine(config: StubConfig) -> StubEngine {
    StubEngine::new(vec![products()], &config).unwrap()
}

fn get(path: &str) -> HttpRequest {
    HttpRequest::new(HttpMethod::Get, path)
}

fn expectation(path: &str, price: Value) -> ExpectationDocument {
    ExpectationDocument::new(
        get(path),
        HttpResponse::new(200).with_body(json!({"id": "p-1", "price": price})),
    )
}

// ============================================================================
// Expectations
// ============================================================================

mod expectation_tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_expectation_wins() {
        let engine = engine(StubConfig::default());
        engine.add_expectation(expectation("/products/p-1", json!(10))).unwrap();
        engine.add_expectation(expectation("/products/p-1", json!(20))).unwrap();

        let response = engine.serve(get("/products/p-1"), DEFAULT_SESSION).await;
        assert_eq!(response.body["price"], json!(20));
        assert_eq!(response.header(SOURCE_HEADER), Some("stub"));
    }

    #[tokio::test]
    async fn test_nonconforming_expectation_is_rejected() {
        let engine = engine(StubConfig::default());
        let result = engine.add_expectation(expectation("/products/p-1", json!("free")));
        assert!(result.is_err());
        assert!(engine.registry().is_empty());
    }

    #[tokio::test]
    async fn test_removal_by_token() {
        let engine = engine(StubConfig::default());
        let mut doc = expectation("/products/p-1", json!(10));
        doc.stub_token = Some("suite-a".to_string());
        engine.add_expectation(doc).unwrap();
        engine.add_expectation(expectation("/products/p-2", json!(5))).unwrap();

        assert_eq!(engine.registry().remove_by_token("suite-a"), 1);
        assert_eq!(engine.registry().len(), 1);
        let response = engine.serve(get("/products/p-1"), DEFAULT_SESSION).await;
        assert_eq!(response.header(SOURCE_HEADER), Some("contract"));
    }

    #[tokio::test]
    async fn test_token_values_are_generated() {
        let engine = engine(StubConfig::default());
        engine
            .add_expectation(expectation("/products/p-1", json!("(number)")))
            .unwrap();
        let response = engine.serve(get("/products/p-1"), DEFAULT_SESSION).await;
        assert!(response.body["price"].is_number());
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

mod fallback_tests {
    use super::*;

    #[tokio::test]
    async fn test_contract_answers_unstubbed_request() {
        let engine = engine(StubConfig::default());
        let response = engine.serve(get("/products/anything"), DEFAULT_SESSION).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header(SOURCE_HEADER), Some("contract"));
        assert!(response.body["price"].is_number());
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_unstubbed_request() {
        let config = StubConfig {
            strict: true,
            ..StubConfig::default()
        };
        let engine = engine(config);
        let response = engine.serve(get("/products/anything"), DEFAULT_SESSION).await;
        assert_eq!(response.status, 400);
        assert!(response.is_engine_failure());

        let entries = engine.request_log().entries();
        assert_eq!(entries.last().map(|e| e.decision), Some(Decision::StrictFailure));
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_a_mismatch() {
        let engine = engine(StubConfig::default());
        let response = engine.serve(get("/carts/1"), DEFAULT_SESSION).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.header(FAILURE_KIND_HEADER), Some("mismatch"));
    }

    #[tokio::test]
    async fn test_staged_state_is_used_once_per_session() {
        let engine = engine(StubConfig::default());
        let mut facts = Map::new();
        facts.insert("id".to_string(), json!("staged"));
        engine.state().stage("suite-b", facts);

        let other = engine.serve(get("/products/x"), "suite-c").await;
        assert_ne!(other.body["id"], json!("staged"));

        let first = engine.serve(get("/products/x"), "suite-b").await;
        assert_eq!(first.body["id"], json!("staged"));
        assert!(!engine.state().is_staged("suite-b"));
    }
}

// ============================================================================
// Startup loading
// ============================================================================

mod loader_tests {
    use super::*;

    #[test]
    fn test_loads_contract_with_implicit_examples() {
        let dir = tempdir().unwrap();
        let contract = dir.path().join("products.json");
        let products_doc = serde_json::to_string(&products()).unwrap();
        fs::write(&contract, products_doc).unwrap();

        let examples = dir.path().join("products_examples");
        fs::create_dir(&examples).unwrap();
        let good = expectation("/products/p-1", json!(3));
        fs::write(examples.join("a.json"), serde_json::to_string(&good).unwrap()).unwrap();
        let bad = expectation("/products/p-1", json!("three"));
        fs::write(examples.join("b.json"), serde_json::to_string(&bad).unwrap()).unwrap();

        let outcome = loader::load(&[contract], &[]).unwrap();
        assert_eq!(outcome.features.len(), 1);
        assert_eq!(outcome.stubs.len(), 1);
        assert!(outcome.log.iter().any(|line| line.contains("Rejected")), "{:?}", outcome.log);
    }

    #[test]
    fn test_missing_contract_fails() {
        let dir = tempdir().unwrap();
        assert!(loader::load(&[dir.path().join("nope.json")], &[]).is_err());
    }
}
