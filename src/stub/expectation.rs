//! Expectations: explicitly registered request/response pairs.

use crate::contract::Feature;
use crate::errors::{ContractError, MatchError};
use crate::http::{HttpRequest, HttpRequestPattern, HttpResponse};
use crate::pattern::{token, MatchResult, Resolver, Results, STUB_VS_REQUEST};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Wire form of an expectation, as posted to the admin endpoint or stored
/// in a seed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationDocument {
    #[serde(rename = "http-request")]
    pub request: HttpRequest,
    #[serde(rename = "http-response")]
    pub response: HttpResponse,
    #[serde(
        rename = "delay-in-seconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub delay_in_seconds: Option<f64>,
    #[serde(rename = "stub-token", default, skip_serializing_if = "Option::is_none")]
    pub stub_token: Option<String>,
}

impl ExpectationDocument {
    pub fn new(request: HttpRequest, response: HttpResponse) -> Self {
        Self {
            request,
            response,
            delay_in_seconds: None,
            stub_token: None,
        }
    }
}

/// A registered stub. Immutable once built; `with_delay` and `with_token`
/// return annotated copies.
#[derive(Debug, Clone)]
pub struct HttpStubData {
    request_pattern: HttpRequestPattern,
    response: HttpResponse,
    resolver: Resolver,
    delay: Option<Duration>,
    token: Option<String>,
    scenario: Option<String>,
}

impl HttpStubData {
    pub fn new(
        request_pattern: HttpRequestPattern,
        response: HttpResponse,
        resolver: Resolver,
    ) -> Self {
        Self {
            request_pattern,
            response,
            resolver: resolver.with_mismatch_messages(Arc::new(STUB_VS_REQUEST)),
            delay: None,
            token: None,
            scenario: None,
        }
    }

    pub fn with_delay(&self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self.clone()
        }
    }

    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self.clone()
        }
    }

    fn with_scenario(self, scenario: impl Into<String>) -> Self {
        Self {
            scenario: Some(scenario.into()),
            ..self
        }
    }

    pub fn request_pattern(&self) -> &HttpRequestPattern {
        &self.request_pattern
    }

    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Label of the contract scenario this stub was validated against.
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    pub fn label(&self) -> String {
        self.request_pattern.label()
    }

    pub fn matches(&self, request: &HttpRequest) -> MatchResult {
        self.request_pattern.matches(request, &self.resolver)
    }

    /// The canned response, with any pattern tokens in its body replaced by
    /// generated values.
    pub fn resolved_response(&self) -> Result<HttpResponse, ContractError> {
        let mut response = self.response.clone();
        response.body = resolve_tokens(&response.body, &self.resolver)?;
        Ok(response)
    }
}

fn resolve_tokens(value: &Value, resolver: &Resolver) -> Result<Value, ContractError> {
    Ok(match value {
        Value::String(text) => match token::parse_known_token(text, resolver) {
            Some(pattern) => pattern.generate(resolver)?,
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_tokens(v, resolver))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), resolve_tokens(v, resolver)?)))
                .collect::<Result<_, ContractError>>()?,
        ),
        other => other.clone(),
    })
}

fn delay_from_seconds(seconds: Option<f64>) -> Option<Duration> {
    seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64)
}

/// Validate an expectation against the loaded contracts and build a stub.
///
/// With no contracts loaded the expectation is taken as is. Otherwise the
/// first feature that has a conforming scenario supplies the resolver; if
/// none does, the failures from every feature are returned together.
pub fn create_stub(features: &[Feature], document: ExpectationDocument) -> Result<HttpStubData, MatchError> {
    let ExpectationDocument {
        request,
        response,
        delay_in_seconds,
        stub_token,
    } = document;
    let request = request.normalized();

    let mut stub = if features.is_empty() {
        let resolver = Resolver::default();
        let pattern = HttpRequestPattern::from_stub(&request, &resolver)?;
        HttpStubData::new(pattern, response, resolver)
    } else {
        let mut results = Results::new();
        let mut found = None;
        for feature in features {
            match feature.match_expectation(&request, &response) {
                Ok(scenario) => {
                    let resolver = scenario.stub_resolver();
                    let pattern = HttpRequestPattern::from_stub(&request, &resolver)?;
                    found = Some(
                        HttpStubData::new(pattern, response.clone(), resolver)
                            .with_scenario(scenario.label()),
                    );
                    break;
                }
                Err(MatchError::NoMatchingScenario(failures)) => results.extend(failures),
                Err(contract) => return Err(contract),
            }
        }
        found.ok_or_else(|| MatchError::NoMatchingScenario(results.without_fluff()))?
    };

    if let Some(delay) = delay_from_seconds(delay_in_seconds) {
        stub = stub.with_delay(delay);
    }
    if let Some(token) = stub_token {
        stub = stub.with_token(token);
    }
    Ok(stub)
}
