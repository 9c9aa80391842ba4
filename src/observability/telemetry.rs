//! Telemetry
//!
//! Structured logging for the stub server and the CLI:
//! - Compact stderr output, filtered via `RUST_LOG` or a config value
//! - One span per served request
//! - Log-safe rendering of untrusted request text

use regex::Regex;
use std::sync::OnceLock;
use tracing::{info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Longest piece of request text written to a log line.
pub const MAX_LOGGED_LEN: usize = 512;

/// Sanitize a string for safe log output by escaping control characters.
/// Prevents log injection where a client embeds newlines to forge entries.
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_LOGGED_LEN));
    for (i, c) in s.chars().enumerate() {
        if i >= MAX_LOGGED_LEN {
            out.push_str("...");
            break;
        }
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x1b' => out.push_str("\\e"),
            '\x00' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"(?i)Bearer\s+[A-Za-z0-9_\-\.=]{8,}",
            r"(?i)Basic\s+[A-Za-z0-9+/=]{8,}",
            r"(?i)(api[_-]?key|token|password|secret)=[^&\s]+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace credentials in header values and query strings with `[REDACTED]`.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for pattern in secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").into_owned();
    }
    result
}

/// Sanitized and redacted, ready for a log field.
pub fn loggable(input: &str) -> String {
    sanitize_for_log(&redact_secrets(input))
}

/// Initialize tracing from `RUST_LOG`, falling back to `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    init_tracing_with_filter(&filter);
}

/// Initialize with a custom filter string. Later calls are no-ops.
pub fn init_tracing_with_filter(filter: &str) {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_level(true)
            .compact()
            .with_writer(std::io::stderr);

        let filter_layer = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// Span covering one inbound request. `decision` and `status` are recorded
/// once the request has been answered.
pub fn request_span(method: &str, target: &str) -> Span {
    let path = loggable(target);
    info_span!(
        "stub.request",
        method = method,
        path = path.as_str(),
        decision = tracing::field::Empty,
        status = tracing::field::Empty,
    )
}

/// Record how a request span was answered.
pub fn record_outcome(span: &Span, decision: &str, status: u16) {
    span.record("decision", decision);
    span.record("status", status);
}

#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
