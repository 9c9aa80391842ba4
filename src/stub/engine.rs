//! The serving pipeline for business requests.

use super::{
    create_stub, Decision, ExpectationDocument, HttpStubData, LoadOutcome, Passthrough, RequestLog,
    RequestLogEntry, SseBroadcaster, StateStore, StubRegistry,
};
use crate::config::StubConfig;
use crate::contract::{Feature, ServerState};
use crate::errors::{MatchError, TransportError};
use crate::http::{FailureKind, HttpRequest, HttpResponse, ResponseSource};
use crate::observability::telemetry::{loggable, record_outcome, request_span};
use crate::pattern::Results;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Outcome of one pass through the pipeline.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: HttpResponse,
    pub decision: Decision,
    /// Label of the stub or scenario that answered
    pub matched: Option<String>,
}

impl Served {
    fn new(response: HttpResponse, decision: Decision) -> Self {
        Self {
            response,
            decision,
            matched: None,
        }
    }

    fn matched(mut self, label: impl Into<String>) -> Self {
        self.matched = Some(label.into());
        self
    }
}

/// Shared state behind the stub server.
///
/// Features are immutable once loaded. Everything mutable lives in its own
/// guarded store: expectations, staged server state, logs and SSE channels.
#[derive(Debug)]
pub struct StubEngine {
    features: Vec<Feature>,
    registry: StubRegistry,
    state: StateStore,
    request_log: RequestLog,
    load_log: Mutex<Vec<String>>,
    sse: Arc<SseBroadcaster>,
    passthrough: Option<Passthrough>,
    strict: bool,
}

impl StubEngine {
    pub fn new(features: Vec<Feature>, config: &StubConfig) -> Result<Self, TransportError> {
        let passthrough = config
            .passthrough_url
            .as_deref()
            .map(|url| Passthrough::new(url, config.passthrough_timeout()))
            .transpose()?;
        Ok(Self {
            features,
            registry: StubRegistry::new(),
            state: StateStore::new(),
            request_log: RequestLog::new(config.request_log_capacity),
            load_log: Mutex::new(Vec::new()),
            sse: SseBroadcaster::new(config.sse_channel_capacity),
            passthrough,
            strict: config.strict,
        })
    }

    /// Engine seeded from a startup load.
    pub fn from_outcome(outcome: LoadOutcome, config: &StubConfig) -> Result<Self, TransportError> {
        let engine = Self::new(outcome.features, config)?;
        for stub in outcome.stubs {
            engine.registry.register(stub);
        }
        *engine.load_log.lock() = outcome.log;
        Ok(engine)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn registry(&self) -> &StubRegistry {
        &self.registry
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn request_log(&self) -> &RequestLog {
        &self.request_log
    }

    pub fn load_log(&self) -> Vec<String> {
        self.load_log.lock().clone()
    }

    pub fn sse(&self) -> &Arc<SseBroadcaster> {
        &self.sse
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate and register an expectation.
    pub fn add_expectation(&self, document: ExpectationDocument) -> Result<Arc<HttpStubData>, MatchError> {
        match create_stub(&self.features, document) {
            Ok(stub) => {
                let stub = self.registry.register(stub);
                info!(stub = %loggable(&stub.label()), token = ?stub.token(), "Expectation registered");
                Ok(stub)
            }
            Err(e) => {
                warn!("Expectation rejected");
                debug!(report = %e, "Expectation mismatch");
                Err(e)
            }
        }
    }

    /// Answer a business request and log the decision.
    pub async fn serve(&self, request: HttpRequest, session: &str) -> HttpResponse {
        let span = request_span(request.method.as_str(), &request.target());
        let served = self.serve_inner(&request, session).instrument(span.clone()).await;
        record_outcome(&span, served.decision.as_str(), served.response.status);

        let mut entry = RequestLogEntry::new(
            request.method.as_str(),
            request.target(),
            served.decision,
            served.response.status,
        );
        if let Some(matched) = &served.matched {
            entry = entry.with_matched(matched.clone());
        }
        self.request_log.record(entry);
        served.response
    }

    async fn serve_inner(&self, request: &HttpRequest, session: &str) -> Served {
        // Staged state belongs to this request alone, matched or not.
        let state = self.state.take(session);

        match self.registry.find_match(request) {
            Ok(stub) => {
                if let Some(delay) = stub.delay() {
                    tokio::time::sleep(delay).await;
                }
                return match stub.resolved_response() {
                    Ok(response) => {
                        debug!(stub = %loggable(&stub.label()), "Answered from stub");
                        let response = response.recast_xml_body().tagged(ResponseSource::Stub);
                        Served::new(response, Decision::Stub).matched(stub.label())
                    }
                    Err(e) => {
                        warn!(error = %e, "Stub response could not be generated");
                        Served::new(
                            HttpResponse::engine_failure(500, FailureKind::Contract, e.to_string()),
                            Decision::Error,
                        )
                        .matched(stub.label())
                    }
                };
            }
            Err(stub_failures) => {
                if !stub_failures.is_empty() {
                    debug!(stubs = stub_failures.len(), "No stub matched");
                }
            }
        }

        if let Some(passthrough) = &self.passthrough {
            return match passthrough.forward(request).await {
                Ok(response) => Served::new(response, Decision::Proxy),
                Err(e) => {
                    warn!(error = %e, "Pass-through failed");
                    Served::new(
                        HttpResponse::engine_failure(502, FailureKind::Transport, e.to_string()),
                        Decision::Error,
                    )
                }
            };
        }

        if self.strict {
            let report = match self.lookup_all(request, &state) {
                Ok(_) => format!(
                    "Strict mode: no expectation registered for {} {}",
                    request.method,
                    request.target()
                ),
                Err(MatchError::NoMatchingScenario(results)) => no_match_report(request, &results),
                Err(e) => e.to_string(),
            };
            return Served::new(
                HttpResponse::engine_failure(400, FailureKind::Mismatch, report),
                Decision::StrictFailure,
            );
        }

        match self.lookup_all(request, &state) {
            Ok((label, response)) => {
                Served::new(response.tagged(ResponseSource::Contract), Decision::Contract).matched(label)
            }
            Err(MatchError::NoMatchingScenario(results)) => Served::new(
                HttpResponse::engine_failure(
                    400,
                    FailureKind::Mismatch,
                    no_match_report(request, &results),
                ),
                Decision::NoMatch,
            ),
            Err(MatchError::Contract(e)) => {
                warn!(error = %e, "Contract error while serving");
                Served::new(
                    HttpResponse::engine_failure(500, FailureKind::Contract, e.to_string()),
                    Decision::Error,
                )
            }
        }
    }

    /// First feature that produces a response wins. Failures from all
    /// features are aggregated otherwise.
    fn lookup_all(&self, request: &HttpRequest, state: &ServerState) -> Result<(String, HttpResponse), MatchError> {
        let mut results = Results::new();
        for feature in &self.features {
            match feature.lookup_response(request, state) {
                Ok((scenario, response)) => return Ok((scenario.label(), response)),
                Err(MatchError::NoMatchingScenario(failures)) => results.extend(failures),
                Err(e) => return Err(e),
            }
        }
        Err(MatchError::NoMatchingScenario(results.without_fluff()))
    }
}

fn no_match_report(request: &HttpRequest, results: &Results) -> String {
    let report = results.report().to_string();
    if report.trim().is_empty() {
        format!("No contract or expectation matches {} {}", request.method, request.target())
    } else {
        format!(
            "No contract or expectation matches {} {}\n\n{}",
            request.method,
            request.target(),
            report
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Scenario;
    use crate::http::{HttpMethod, HttpRequestPattern, HttpResponsePattern, PathPattern, RESULT_HEADER, SOURCE_HEADER};
    use crate::pattern::Pattern;
    use serde_json::{json, Map, Value};
    use std::time::{Duration, Instant};

    fn products() -> Feature {
        Feature::new(
            "products",
            vec![Scenario::new(
                "",
                HttpRequestPattern::new(
                    HttpMethod::Get,
                    PathPattern::parse("/products/(id:string)").unwrap(),
                ),
                HttpResponsePattern::new(200).with_body(Pattern::object([
                    ("id", Pattern::string()),
                    ("price", Pattern::number()),
                ])),
            )],
        )
    }

    fn engine(config: StubConfig) -> StubEngine {
        StubEngine::new(vec![products()], &config).unwrap()
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, path)
    }

    fn expectation(price: Value) -> ExpectationDocument {
        ExpectationDocument::new(
            get("/products/abc"),
            HttpResponse::new(200).with_body(json!({"id": "abc", "price": price})),
        )
    }

    #[tokio::test]
    async fn test_stub_then_contract() {
        let engine = engine(StubConfig::default());
        engine.add_expectation(expectation(json!(9.99))).unwrap();

        let stubbed = engine.serve(get("/products/abc"), "default").await;
        assert_eq!(stubbed.body, json!({"id": "abc", "price": 9.99}));
        assert_eq!(stubbed.header(SOURCE_HEADER), Some("stub"));

        let generated = engine.serve(get("/products/xyz"), "default").await;
        assert_eq!(generated.status, 200);
        assert_eq!(generated.header(SOURCE_HEADER), Some("contract"));
        assert!(generated.body["price"].is_number());
    }

    #[tokio::test]
    async fn test_no_match_is_marked_failure() {
        let engine = engine(StubConfig::default());
        let response = engine.serve(get("/orders/1"), "default").await;
        assert_eq!(response.status, 400);
        assert_eq!(response.header(RESULT_HEADER), Some("failure"));
        assert_eq!(engine.request_log().entries()[0].decision, Decision::NoMatch);
    }

    #[tokio::test]
    async fn test_strict_mode_refuses_to_generate() {
        let engine = engine(StubConfig {
            strict: true,
            ..Default::default()
        });
        let response = engine.serve(get("/products/xyz"), "default").await;
        assert_eq!(response.status, 400);
        assert!(response.is_engine_failure());

        engine.add_expectation(expectation(json!(1))).unwrap();
        let stubbed = engine.serve(get("/products/abc"), "default").await;
        assert_eq!(stubbed.status, 200);
    }

    #[tokio::test]
    async fn test_state_is_used_once() {
        let engine = engine(StubConfig::default());
        let mut facts = Map::new();
        facts.insert("id".into(), json!("staged"));
        engine.state().stage("default", facts);

        let first = engine.serve(get("/products/xyz"), "default").await;
        assert_eq!(first.body["id"], json!("staged"));
        let second = engine.serve(get("/products/xyz"), "default").await;
        assert_ne!(second.body["id"], json!("staged"));
    }

    #[tokio::test]
    async fn test_state_cleared_even_without_match() {
        let engine = engine(StubConfig::default());
        let mut facts = Map::new();
        facts.insert("id".into(), json!("x"));
        engine.state().stage("default", facts);
        engine.serve(get("/nowhere"), "default").await;
        assert!(!engine.state().is_staged("default"));
    }

    #[tokio::test]
    async fn test_stub_delay_is_honoured() {
        let engine = engine(StubConfig::default());
        let mut doc = expectation(json!(1));
        doc.delay_in_seconds = Some(0.1);
        engine.add_expectation(doc).unwrap();
        let start = Instant::now();
        engine.serve(get("/products/abc"), "default").await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_unreachable_passthrough_is_transport_failure() {
        let engine = engine(StubConfig {
            passthrough_url: Some("http://127.0.0.1:9".into()),
            passthrough_timeout_secs: 2,
            ..Default::default()
        });
        let response = engine.serve(get("/products/xyz"), "default").await;
        assert_eq!(response.status, 502);
        assert_eq!(response.header(crate::http::FAILURE_KIND_HEADER), Some("transport"));
    }

    #[tokio::test]
    async fn test_contract_error_is_500() {
        let broken = Feature::new(
            "broken",
            vec![Scenario::new(
                "",
                HttpRequestPattern::new(HttpMethod::Get, PathPattern::parse("/x").unwrap()),
                HttpResponsePattern::new(200).with_body(Pattern::reference("Missing")),
            )],
        );
        let engine = StubEngine::new(vec![broken], &StubConfig::default()).unwrap();
        let response = engine.serve(get("/x"), "default").await;
        assert_eq!(response.status, 500);
        assert_eq!(response.header(crate::http::FAILURE_KIND_HEADER), Some("contract"));
    }

    #[test]
    fn test_rejected_expectation_is_not_registered() {
        let engine = engine(StubConfig::default());
        assert!(engine.add_expectation(expectation(json!("free"))).is_err());
        assert!(engine.registry().is_empty());
    }
}
