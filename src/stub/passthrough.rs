use crate::errors::TransportError;
use crate::http::{HttpRequest, HttpResponse, ResponseSource};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Headers that describe one hop and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Forwards unmatched requests to a real upstream service.
#[derive(Debug, Clone)]
pub struct Passthrough {
    client: Client,
    base: Url,
}

impl Passthrough {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidTarget(format!("{}: {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Connect {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Relay the request and tag the reply as proxied.
    pub async fn forward(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = send(&self.client, &self.base, request).await?;
        Ok(response.tagged(ResponseSource::Proxy))
    }
}

/// `base` with the request's path and query appended. A path prefix on the
/// base URL is kept.
pub fn target_url(base: &Url, request: &HttpRequest) -> Result<Url, TransportError> {
    let joined = format!("{}{}", base.as_str().trim_end_matches('/'), request.target());
    Url::parse(&joined).map_err(|e| TransportError::InvalidTarget(format!("{}: {}", joined, e)))
}

/// Send a request to `base` and read the whole reply.
pub async fn send(client: &Client, base: &Url, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    let url = target_url(base, request)?;
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;

    let mut builder = client.request(method, url.clone());
    for (name, value) in &request.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder = match &request.body {
        Value::Null => builder,
        Value::String(text) => builder.body(text.clone()),
        other => {
            if request.header("content-type").is_none() {
                builder = builder.header("content-type", "application/json");
            }
            builder.body(other.to_string())
        }
    };

    debug!(url = %url, method = %request.method, "Forwarding request");
    let response = builder.send().await.map_err(|e| {
        warn!(url = %url, error = %e, "Upstream request failed");
        if e.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else {
            TransportError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status().as_u16();
    let mut relayed = HttpResponse::new(status);
    for (name, value) in response.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            relayed = relayed.with_header(name.as_str(), value);
        }
    }
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::Body(e.to_string()))?;
    relayed.body = body_from_text(relayed.header("content-type"), text);
    Ok(relayed)
}

/// Structured value for a wire body: JSON when declared or shaped like it,
/// text otherwise.
pub fn body_from_text(content_type: Option<&str>, text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    let declared_json = content_type.is_some_and(|ct| ct.contains("json"));
    let trimmed = text.trim_start();
    let looks_json = trimmed.starts_with('{') || trimmed.starts_with('[');
    if declared_json || looks_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return value;
        }
    }
    Value::String(text)
}
