use super::ServerState;
use crate::errors::ContractError;
use crate::http::{HttpRequest, HttpRequestPattern, HttpResponse, HttpResponsePattern};
use crate::pattern::{
    token, values_equal, Failure, MatchResult, MismatchMessages, Pattern, Resolver, Row,
    CONTRACT_VS_REQUEST, CONTRACT_VS_RESPONSE, CONTRACT_VS_STUB,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// One request/response pair of a contract, with the server facts it
/// expects and the example rows used to generate tests from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    name: String,
    request: HttpRequestPattern,
    response: HttpResponsePattern,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    patterns: BTreeMap<String, Pattern>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    facts: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    examples: Vec<Row>,
    #[serde(default, skip_serializing_if = "is_false")]
    ignore_failure: bool,
    #[serde(default, rename = "async", skip_serializing_if = "is_false")]
    is_async: bool,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        request: HttpRequestPattern,
        response: HttpResponsePattern,
    ) -> Self {
        Self {
            name: name.into(),
            request,
            response,
            patterns: BTreeMap::new(),
            facts: BTreeMap::new(),
            examples: Vec::new(),
            ignore_failure: false,
            is_async: false,
        }
    }

    pub fn with_pattern(mut self, name: impl Into<String>, pattern: Pattern) -> Self {
        self.patterns.insert(name.into(), pattern);
        self
    }

    pub fn with_fact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.facts.insert(key.into(), value);
        self
    }

    pub fn with_example(mut self, row: Row) -> Self {
        self.examples.push(row);
        self
    }

    pub fn with_ignore_failure(mut self, ignore: bool) -> Self {
        self.ignore_failure = ignore;
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &HttpRequestPattern {
        &self.request
    }

    pub fn response(&self) -> &HttpResponsePattern {
        &self.response
    }

    pub fn patterns(&self) -> &BTreeMap<String, Pattern> {
        &self.patterns
    }

    pub fn facts(&self) -> &BTreeMap<String, Value> {
        &self.facts
    }

    pub fn examples(&self) -> &[Row] {
        &self.examples
    }

    pub fn ignore_failure(&self) -> bool {
        self.ignore_failure
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// `METHOD /path`, prefixed by the scenario name when it has one.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.request.label()
        } else {
            format!("{} ({})", self.request.label(), self.name)
        }
    }

    /// Resolver for this scenario. Staged server state overrides the
    /// scenario's own facts.
    pub fn resolver(&self, state: &ServerState, messages: Arc<dyn MismatchMessages>) -> Resolver {
        let mut facts = self.facts.clone();
        facts.extend(state.iter().map(|(k, v)| (k.clone(), v.clone())));
        Resolver::new(self.patterns.clone())
            .with_facts(facts)
            .with_mismatch_messages(messages)
    }

    /// Facts the scenario expects must agree with any staged state carrying
    /// the same key. A fact written as a token matches by type.
    fn state_matches(&self, state: &ServerState, resolver: &Resolver) -> MatchResult {
        let failures: Vec<Failure> = self
            .facts
            .iter()
            .filter_map(|(key, expected)| {
                let actual = state.get(key)?;
                let result = match expected {
                    Value::String(text) if token::is_token(text) => match token::parse_token(text) {
                        Ok(pattern) => pattern.matches(actual, resolver),
                        Err(e) => MatchResult::failure(e.to_string()),
                    },
                    literal if values_equal(literal, actual) => MatchResult::Success,
                    literal => MatchResult::failure(format!(
                        "Expected server state {} to be {} but it was {}",
                        key, literal, actual
                    )),
                };
                result.into_failure().map(|f| f.breadcrumb(key.as_str()))
            })
            .collect();
        MatchResult::from_failures(failures)
    }

    pub fn matches(&self, request: &HttpRequest, state: &ServerState) -> MatchResult {
        let resolver = self.resolver(state, Arc::new(CONTRACT_VS_REQUEST));
        self.state_matches(state, &resolver)
            .breadcrumb("FACTS")
            .and_then(|| self.request.matches(request, &resolver).breadcrumb("REQUEST"))
    }

    pub fn generate_response(&self, state: &ServerState) -> Result<HttpResponse, ContractError> {
        let resolver = self.resolver(state, Arc::new(CONTRACT_VS_RESPONSE));
        self.response.generate(&resolver)
    }

    pub fn matches_response(&self, response: &HttpResponse) -> MatchResult {
        let resolver = self.resolver(&ServerState::new(), Arc::new(CONTRACT_VS_RESPONSE));
        self.response.matches(response, &resolver).breadcrumb("RESPONSE")
    }

    /// A concrete request this scenario accepts. The scenario's facts seed
    /// any slot they name.
    pub fn generate_request(&self) -> Result<HttpRequest, ContractError> {
        let resolver = self.resolver(&ServerState::new(), Arc::new(CONTRACT_VS_REQUEST));
        self.request.generate(&resolver)
    }

    pub fn new_based_on(&self, row: &Row, limit: usize) -> Result<Vec<HttpRequestPattern>, ContractError> {
        let resolver = self
            .resolver(&ServerState::new(), Arc::new(CONTRACT_VS_REQUEST))
            .with_variant_limit(limit);
        self.request.new_based_on(row, &resolver)
    }

    /// One request per variant of each example row (or of the bare scenario
    /// when it has none), at most `limit` in total.
    pub fn generate_test_requests(&self, limit: usize) -> Result<Vec<HttpRequest>, ContractError> {
        let resolver = self.resolver(&ServerState::new(), Arc::new(CONTRACT_VS_REQUEST));
        let bare = [Row::default()];
        let rows: &[Row] = if self.examples.is_empty() {
            &bare
        } else {
            &self.examples
        };

        let mut requests = Vec::new();
        for row in rows {
            let remaining = limit.saturating_sub(requests.len());
            if remaining == 0 {
                break;
            }
            for variant in self.new_based_on(row, remaining)? {
                requests.push(variant.generate(&resolver)?);
            }
        }
        Ok(requests)
    }

    /// Check a stub against this scenario. Token values in the stub are
    /// compared by type.
    pub fn match_stub(&self, request: &HttpRequest, response: &HttpResponse) -> MatchResult {
        let resolver = self
            .resolver(&ServerState::new(), Arc::new(CONTRACT_VS_STUB))
            .in_generation_mode();
        self.request
            .matches(request, &resolver)
            .breadcrumb("REQUEST")
            .and_then(|| self.response.matches(response, &resolver).breadcrumb("RESPONSE"))
    }

    /// The resolver a stub built from this scenario should use.
    pub fn stub_resolver(&self) -> Resolver {
        self.resolver(&ServerState::new(), Arc::new(CONTRACT_VS_STUB))
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        let resolver = self.resolver(&ServerState::new(), Arc::new(CONTRACT_VS_REQUEST));
        for pattern in self.patterns.values() {
            pattern.validate(&resolver)?;
        }
        self.request.validate(&resolver)?;
        self.response.validate(&resolver)?;
        for row in &self.examples {
            self.request.new_based_on(row, &resolver)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, PathPattern};
    use serde_json::json;

    fn get_product() -> Scenario {
        Scenario::new(
            "fetch product",
            HttpRequestPattern::new(
                HttpMethod::Get,
                PathPattern::parse("/products/(id:string)").unwrap(),
            ),
            HttpResponsePattern::new(200).with_body(Pattern::object([
                ("id", Pattern::string()),
                ("price", Pattern::number()),
            ])),
        )
    }

    #[test]
    fn test_matches_request() {
        let scenario = get_product();
        let state = ServerState::new();
        let hit = HttpRequest::new(HttpMethod::Get, "/products/abc");
        assert!(scenario.matches(&hit, &state).is_success());
        let miss = HttpRequest::new(HttpMethod::Get, "/orders/abc");
        let failure = scenario.matches(&miss, &state).into_failure().unwrap();
        assert!(failure.is_fluff());
        assert!(failure.has_breadcrumb("REQUEST"));
    }

    #[test]
    fn test_state_flows_into_generation() {
        let scenario = get_product();
        let mut state = ServerState::new();
        state.insert("id".to_string(), json!("abc"));
        let response = scenario.generate_response(&state).unwrap();
        assert_eq!(response.body["id"], json!("abc"));
    }

    #[test]
    fn test_facts_must_agree_with_state() {
        let scenario = get_product().with_fact("tier", json!("gold"));
        let request = HttpRequest::new(HttpMethod::Get, "/products/abc");

        let mut silver = ServerState::new();
        silver.insert("tier".to_string(), json!("silver"));
        let failure = scenario.matches(&request, &silver).into_failure().unwrap();
        assert!(failure.has_breadcrumb("FACTS"));

        assert!(scenario.matches(&request, &ServerState::new()).is_success());
    }

    #[test]
    fn test_generate_test_requests_uses_examples() {
        let scenario = get_product()
            .with_example(Row::named("first").with("id", "p-1"))
            .with_example(Row::named("second").with("id", "p-2"));
        let requests = scenario.generate_test_requests(10).unwrap();
        let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/products/p-1", "/products/p-2"]);

        let capped = scenario.generate_test_requests(1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_match_stub_accepts_tokens() {
        let scenario = get_product();
        let request = HttpRequest::new(HttpMethod::Get, "/products/abc");
        let response = HttpResponse::new(200).with_body(json!({"id": "abc", "price": "(number)"}));
        assert!(scenario.match_stub(&request, &response).is_success());

        let wrong = HttpResponse::new(200).with_body(json!({"id": "abc", "price": "cheap"}));
        let failure = scenario.match_stub(&request, &wrong).into_failure().unwrap();
        assert!(failure.has_breadcrumb("RESPONSE"));
    }

    #[test]
    fn test_validate_rejects_bad_example() {
        let scenario = Scenario::new(
            "",
            HttpRequestPattern::new(
                HttpMethod::Get,
                PathPattern::parse("/items/(id:number)").unwrap(),
            ),
            HttpResponsePattern::new(200),
        )
        .with_example(Row::new().with("id", "not-a-number"));
        assert!(matches!(
            scenario.validate(),
            Err(ContractError::InvalidExample { .. })
        ));
    }

    #[test]
    fn test_serde_round_trip_keeps_flags() {
        let scenario = get_product().with_ignore_failure(true).with_async(true);
        let json = serde_json::to_value(&scenario).unwrap();
        assert_eq!(json["ignoreFailure"], json!(true));
        assert_eq!(json["async"], json!(true));
        let back: Scenario = serde_json::from_value(json).unwrap();
        assert_eq!(back, scenario);
    }
}
