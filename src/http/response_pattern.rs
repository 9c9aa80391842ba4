use super::{match_body, HttpResponse, ParamsKind, ParamsPattern};
use crate::errors::ContractError;
use crate::pattern::{Failure, FailureReason, MatchResult, Pattern, Resolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn any_body() -> Pattern {
    Pattern::Any
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponsePattern {
    pub status: u16,
    #[serde(default, skip_serializing_if = "ParamsPattern::is_empty")]
    pub headers: ParamsPattern,
    #[serde(default = "any_body")]
    pub body: Pattern,
}

impl HttpResponsePattern {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: ParamsPattern::default(),
            body: Pattern::Any,
        }
    }

    pub fn with_headers(mut self, headers: ParamsPattern) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Pattern) -> Self {
        self.body = body;
        self
    }

    fn status_mismatch(&self, actual: u16, resolver: &Resolver) -> MatchResult {
        MatchResult::Failure(
            Failure::new(
                resolver
                    .messages()
                    .mismatch(&format!("status {}", self.status), &format!("status {}", actual)),
            )
            .with_reason(FailureReason::StatusMismatch)
            .breadcrumb("STATUS"),
        )
    }

    pub fn matches(&self, response: &HttpResponse, resolver: &Resolver) -> MatchResult {
        if response.status != self.status {
            return self.status_mismatch(response.status, resolver);
        }
        let failures: Vec<Failure> = [
            self.headers
                .matches(&response.headers, resolver, ParamsKind::Headers)
                .breadcrumb("HEADERS"),
            match_body(&self.body, &response.body, resolver).breadcrumb("BODY"),
        ]
        .into_iter()
        .filter_map(MatchResult::into_failure)
        .collect();
        MatchResult::from_failures(failures)
    }

    pub fn generate(&self, resolver: &Resolver) -> Result<HttpResponse, ContractError> {
        let mut response = HttpResponse::new(self.status);
        response.headers = self
            .headers
            .generate(resolver)?
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        response.body = self.body.generate(resolver)?;
        if matches!(response.body, Value::Object(_) | Value::Array(_))
            && response.header("content-type").is_none()
        {
            response
                .headers
                .insert("content-type".to_string(), "application/json".to_string());
        }
        Ok(response)
    }

    /// A different status is reported on its own; headers and body are only
    /// compared once the statuses agree.
    pub fn encompasses(
        &self,
        other: &HttpResponsePattern,
        this_resolver: &Resolver,
        other_resolver: &Resolver,
    ) -> MatchResult {
        if self.status != other.status {
            return self.status_mismatch(other.status, this_resolver);
        }
        let failures: Vec<Failure> = [
            self.headers
                .encompasses(&other.headers, this_resolver, other_resolver, ParamsKind::Headers)
                .breadcrumb("HEADERS"),
            self.body
                .encompasses(&other.body, this_resolver, other_resolver)
                .breadcrumb("BODY"),
        ]
        .into_iter()
        .filter_map(MatchResult::into_failure)
        .collect();
        MatchResult::from_failures(failures)
    }

    pub fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        self.headers.validate(resolver)?;
        self.body.validate(resolver)
    }
}
