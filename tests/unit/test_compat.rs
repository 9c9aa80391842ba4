//! Unit tests for backward-compatibility checks between contract versions

use serde_json::{json, Value};
use specmock::compat::CompatibilityChecker;
use specmock::contract::Feature;

fn orders(request_body: Value, status: u16, response_body: Value) -> Feature {
    let doc = json!({
        "name": "orders",
        "scenarios": [{
            "request": {"method": "POST", "path": "/orders", "body": request_body},
            "response": {"status": status, "body": response_body}
        }]
    });
    Feature::from_json("orders", &doc.to_string()).unwrap()
}

fn object(properties: Value) -> Value {
    json!({"type": "object", "properties": properties})
}

fn baseline() -> Feature {
    orders(
        object(json!({"item": {"type": "string"}})),
        201,
        object(json!({"id": {"type": "string", "maxLength": 10}})),
    )
}

#[test]
fn test_contract_is_compatible_with_itself() {
    let results = CompatibilityChecker::new().check(&baseline(), &baseline());
    assert!(results.is_success(), "{}", results.report());
    assert_eq!(results.len(), 1);
}

#[test]
fn test_new_optional_request_field_is_compatible() {
    let newer = orders(
        object(json!({"item": {"type": "string"}, "note?": {"type": "string"}})),
        201,
        object(json!({"id": {"type": "string", "maxLength": 10}})),
    );
    let results = CompatibilityChecker::new().check(&baseline(), &newer);
    assert!(results.is_success(), "{}", results.report());
}

#[test]
fn test_new_required_request_field_rejects_old_requests() {
    let newer = orders(
        object(json!({"item": {"type": "string"}, "qty": {"type": "number"}})),
        201,
        object(json!({"id": {"type": "string", "maxLength": 10}})),
    );
    let results = CompatibilityChecker::new().check(&baseline(), &newer);
    assert_eq!(results.failure_count(), 1);
    let failure = results.failures().next().unwrap();
    assert!(failure.has_breadcrumb("REQUEST"));
    assert!(results.report().to_string().contains("now rejected"));
}

#[test]
fn test_narrowed_response_bound_is_reported() {
    let newer = orders(
        object(json!({"item": {"type": "string"}})),
        201,
        object(json!({"id": {"type": "string", "maxLength": 5}})),
    );
    let results = CompatibilityChecker::new().check(&baseline(), &newer);
    assert_eq!(results.failure_count(), 1);
    let failure = results.failures().next().unwrap();
    assert!(failure.has_breadcrumb("RESPONSE"));
    assert!(failure.has_breadcrumb("maxLength"));
}

#[test]
fn test_status_change_is_reported() {
    let newer = orders(
        object(json!({"item": {"type": "string"}})),
        200,
        object(json!({"id": {"type": "string", "maxLength": 10}})),
    );
    let results = CompatibilityChecker::new().check(&baseline(), &newer);
    assert_eq!(results.failure_count(), 1);
    assert!(results.failures().next().unwrap().has_breadcrumb("STATUS"));
}

fn pets() -> Feature {
    let doc = json!({
        "name": "pets",
        "scenarios": [{
            "request": {
                "method": "POST",
                "path": "/pets/(owner:string)",
                "query": {"dry-run?": {"type": "boolean"}},
                "body": {
                    "type": "anyOf",
                    "branches": [
                        object(json!({"kind": {"type": "string"}, "meows": {"type": "boolean"}})),
                        object(json!({"kind": {"type": "string"}, "barks": {"type": "boolean"}}))
                    ],
                    "discriminator": {"property": "kind", "mapping": {"cat": 0, "dog": 1}}
                }
            },
            "response": {"status": 201, "body": object(json!({"id": {"type": "uuid"}}))}
        }]
    });
    Feature::from_json("pets", &doc.to_string()).unwrap()
}

#[test]
fn test_every_fixture_is_compatible_with_itself() {
    for feature in [baseline(), pets()] {
        let results = CompatibilityChecker::new().check(&feature, &feature);
        assert!(results.is_success(), "{}: {}", feature.name(), results.report());
    }
}

#[test]
fn test_dropping_a_discriminated_branch_is_reported() {
    let older = pets();
    let doc = json!({
        "name": "pets",
        "scenarios": [{
            "request": {
                "method": "POST",
                "path": "/pets/(owner:string)",
                "query": {"dry-run?": {"type": "boolean"}},
                "body": {
                    "type": "anyOf",
                    "branches": [
                        object(json!({"kind": {"type": "string"}, "meows": {"type": "boolean"}}))
                    ],
                    "discriminator": {"property": "kind", "mapping": {"cat": 0}}
                }
            },
            "response": {"status": 201, "body": object(json!({"id": {"type": "uuid"}}))}
        }]
    });
    let newer = Feature::from_json("pets", &doc.to_string()).unwrap();
    let results = CompatibilityChecker::new().check(&older, &newer);
    assert_eq!(results.failure_count(), 1);
    assert!(results.report().to_string().contains("dog"), "{}", results.report());
}
