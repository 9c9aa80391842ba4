//! HTTP values and the patterns that match them.

mod params;
mod path;
mod request_pattern;
mod response_pattern;

pub use params::{ParamsKind, ParamsPattern};
pub use path::{PathPattern, PathSegment};
pub use request_pattern::HttpRequestPattern;
pub use response_pattern::HttpResponsePattern;

use crate::pattern::{token, Failure, MatchResult, Pattern, Resolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Marks a response synthesised by the matching engine rather than by a
/// contract or stub.
pub const RESULT_HEADER: &str = "X-Specmock-Result";
pub const FAILURE_KIND_HEADER: &str = "X-Specmock-Failure-Kind";
pub const SOURCE_HEADER: &str = "X-Specmock-Source";
pub const SESSION_HEADER: &str = "X-Specmock-Session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    /// Header names are stored lowercase.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: Value::Null,
        }
    }

    /// Build a request from a raw `path?query` target.
    pub fn from_target(method: HttpMethod, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let mut request = Self::new(method, path);
        if let Some(query) = query {
            request.query = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }
        request
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }

    /// `path?query` with the query re-encoded.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish();
        format!("{}?{}", self.path, query)
    }

    /// Headers with lowercase names, whatever case the caller used.
    pub fn normalized(mut self) -> Self {
        self.headers = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Value::Null,
        }
    }

    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        lookup_header(&self.headers, name)
    }

    /// An error response produced by the engine itself, never by a contract.
    pub fn engine_failure(status: u16, kind: FailureKind, report: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(RESULT_HEADER, "failure")
            .with_header(FAILURE_KIND_HEADER, kind.as_str())
            .with_header("content-type", "text/plain")
            .with_body(Value::String(report.into()))
    }

    pub fn tagged(self, source: ResponseSource) -> Self {
        self.with_header(SOURCE_HEADER, source.as_str())
    }

    pub fn is_engine_failure(&self) -> bool {
        self.header(RESULT_HEADER) == Some("failure")
    }

    /// Text bodies that hold XML are declared as XML so clients parse them
    /// as such.
    pub fn recast_xml_body(mut self) -> Self {
        let looks_like_xml = matches!(&self.body, Value::String(text) if text.trim_start().starts_with('<'));
        if looks_like_xml && self.header("content-type").is_none() {
            self.headers
                .insert("content-type".to_string(), "application/xml".to_string());
        }
        self
    }

    /// Wire form of the body and the content type it implies.
    pub fn body_text(&self) -> (String, &'static str) {
        match &self.body {
            Value::Null => (String::new(), "text/plain"),
            Value::String(text) => (text.clone(), "text/plain"),
            other => (other.to_string(), "application/json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request does not match any contract or stub.
    Mismatch,
    /// The contract itself is defective.
    Contract,
    /// The pass-through upstream could not be reached.
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Mismatch => "mismatch",
            FailureKind::Contract => "contract",
            FailureKind::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Stub,
    Proxy,
    Contract,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Stub => "stub",
            ResponseSource::Proxy => "proxy",
            ResponseSource::Contract => "contract",
        }
    }
}

fn lookup_header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Turn wire text into a value for `pattern`. A pattern token is kept as
/// text in generation mode so the pattern can compare types.
pub(crate) fn parse_wire(pattern: &Pattern, raw: &str, resolver: &Resolver) -> Result<Value, Failure> {
    if resolver.is_generation_mode() && token::is_token(raw) {
        return Ok(Value::String(raw.to_string()));
    }
    pattern.parse(raw, resolver)
}

/// Match a body, reading text bodies as structured data when the pattern
/// does not accept the text itself.
pub(crate) fn match_body(pattern: &Pattern, body: &Value, resolver: &Resolver) -> MatchResult {
    let direct = pattern.matches(body, resolver);
    if direct.is_success() {
        return direct;
    }
    let Value::String(text) = body else {
        return direct;
    };
    match parse_wire(pattern, text, resolver) {
        Ok(parsed) if parsed != *body => pattern.matches(&parsed, resolver),
        _ => direct,
    }
}

/// Render a generated value for a path segment, query value or header.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
