use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// How the server answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Stub,
    Proxy,
    Contract,
    StrictFailure,
    NoMatch,
    Admin,
    Error,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Stub => "stub",
            Decision::Proxy => "proxy",
            Decision::Contract => "contract",
            Decision::StrictFailure => "strict-failure",
            Decision::NoMatch => "no-match",
            Decision::Admin => "admin",
            Decision::Error => "error",
        }
    }
}

/// Entry in the request log.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    /// When the request was answered
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Path and query as received
    pub path: String,
    pub decision: Decision,
    pub status: u16,
    /// Stub or scenario that produced the response, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl RequestLogEntry {
    pub fn new(method: impl Into<String>, path: impl Into<String>, decision: Decision, status: u16) -> Self {
        Self {
            timestamp: Utc::now(),
            method: method.into(),
            path: path.into(),
            decision,
            status,
            matched: None,
        }
    }

    pub fn with_matched(mut self, matched: impl Into<String>) -> Self {
        self.matched = Some(matched.into());
        self
    }
}

/// Bounded log of served requests. The oldest entry is dropped once full.
#[derive(Debug)]
pub struct RequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl RequestLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn record(&self, entry: RequestLogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<RequestLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
