use super::{match_body, HttpMethod, HttpRequest, ParamsKind, ParamsPattern, PathPattern};
use crate::errors::ContractError;
use crate::pattern::resolver::CONTRACT_VS_EXAMPLE;
use crate::pattern::{Failure, FailureReason, MatchResult, Pattern, Resolver, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Example-row column that pins the whole request body.
pub const REQUEST_BODY_COLUMN: &str = "(REQUEST-BODY)";

fn any_body() -> Pattern {
    Pattern::Any
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestPattern {
    pub method: HttpMethod,
    pub path: PathPattern,
    #[serde(default, skip_serializing_if = "ParamsPattern::is_empty")]
    pub query: ParamsPattern,
    #[serde(default, skip_serializing_if = "ParamsPattern::is_empty")]
    pub headers: ParamsPattern,
    #[serde(default = "any_body")]
    pub body: Pattern,
}

impl HttpRequestPattern {
    pub fn new(method: HttpMethod, path: PathPattern) -> Self {
        Self {
            method,
            path,
            query: ParamsPattern::default(),
            headers: ParamsPattern::default(),
            body: Pattern::Any,
        }
    }

    pub fn with_query(mut self, query: ParamsPattern) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: ParamsPattern) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Pattern) -> Self {
        self.body = body;
        self
    }

    /// The request pattern a registered stub stands for. Literal values
    /// must match exactly and pattern tokens match by type. A stub without
    /// a body accepts any body.
    pub fn from_stub(request: &HttpRequest, resolver: &Resolver) -> Result<Self, ContractError> {
        let text_pattern =
            |raw: &String| Pattern::from_example_value(&Value::String(raw.clone()), resolver);
        Ok(Self {
            method: request.method,
            path: PathPattern::parse(&request.path)?,
            query: ParamsPattern::new(
                request
                    .query
                    .iter()
                    .map(|(k, v)| (k.clone(), text_pattern(v)))
                    .collect(),
            ),
            headers: ParamsPattern::new(
                request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), text_pattern(v)))
                    .collect(),
            ),
            body: match &request.body {
                Value::Null => Pattern::Any,
                body => Pattern::from_example_value(body, resolver),
            },
        })
    }

    /// Method and path are checked first; when either differs the request
    /// is for another endpoint and nothing else is reported.
    pub fn matches(&self, request: &HttpRequest, resolver: &Resolver) -> MatchResult {
        if request.method != self.method {
            return MatchResult::Failure(
                Failure::new(
                    resolver
                        .messages()
                        .mismatch(self.method.as_str(), request.method.as_str()),
                )
                .with_reason(FailureReason::MethodMismatch)
                .breadcrumb("METHOD"),
            );
        }

        let path = self.path.matches(&request.path, resolver).breadcrumb("PATH");
        if path.is_failure() {
            return path;
        }

        let failures: Vec<Failure> = [
            self.query
                .matches(&request.query, resolver, ParamsKind::Query)
                .breadcrumb("QUERY-PARAMS"),
            self.headers
                .matches(&request.headers, resolver, ParamsKind::Headers)
                .breadcrumb("HEADERS"),
            match_body(&self.body, &request.body, resolver).breadcrumb("BODY"),
        ]
        .into_iter()
        .filter_map(MatchResult::into_failure)
        .collect();
        MatchResult::from_failures(failures)
    }

    pub fn generate(&self, resolver: &Resolver) -> Result<HttpRequest, ContractError> {
        let mut request = HttpRequest::new(self.method, self.path.generate(resolver)?);
        request.query = self.query.generate(resolver)?;
        request.headers = self
            .headers
            .generate(resolver)?
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        request.body = self.body.generate(resolver)?;
        if matches!(request.body, Value::Object(_) | Value::Array(_))
            && request.header("content-type").is_none()
        {
            request
                .headers
                .insert("content-type".to_string(), "application/json".to_string());
        }
        Ok(request)
    }

    /// Every combination of narrowed path, query, headers and body for the
    /// row, up to the resolver's variant limit.
    pub fn new_based_on(&self, row: &Row, resolver: &Resolver) -> Result<Vec<HttpRequestPattern>, ContractError> {
        let paths = self.path.new_based_on(row, resolver)?;
        let queries = self.query.new_based_on(row, resolver)?;
        let headers = self.headers.new_based_on(row, resolver)?;
        let bodies = self.body_based_on(row, resolver)?;

        let limit = resolver.variant_limit();
        let mut variants = Vec::new();
        'outer: for path in &paths {
            for query in &queries {
                for header in &headers {
                    for body in &bodies {
                        if variants.len() >= limit {
                            break 'outer;
                        }
                        variants.push(HttpRequestPattern {
                            method: self.method,
                            path: path.clone(),
                            query: query.clone(),
                            headers: header.clone(),
                            body: body.clone(),
                        });
                    }
                }
            }
        }
        Ok(variants)
    }

    fn body_based_on(&self, row: &Row, resolver: &Resolver) -> Result<Vec<Pattern>, ContractError> {
        let Some(raw) = row.get(REQUEST_BODY_COLUMN) else {
            return self.body.new_based_on(row, resolver);
        };
        let example_resolver = resolver.with_mismatch_messages(Arc::new(CONTRACT_VS_EXAMPLE));
        let value = self
            .body
            .parse(raw, &example_resolver)
            .map_err(|failure| ContractError::InvalidExample {
                report: failure.breadcrumb("BODY").report().to_string(),
            })?;
        match self.body.matches(&value, &example_resolver).into_failure() {
            None => Ok(vec![Pattern::exact(value)]),
            Some(failure) => Err(ContractError::InvalidExample {
                report: failure.breadcrumb("BODY").report().to_string(),
            }),
        }
    }

    pub fn validate(&self, resolver: &Resolver) -> Result<(), ContractError> {
        for (_, pattern) in self.path.params() {
            pattern.validate(resolver)?;
        }
        self.query.validate(resolver)?;
        self.headers.validate(resolver)?;
        self.body.validate(resolver)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}
