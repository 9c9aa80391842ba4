use crate::contract::ServerState;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Session used when a request carries no session header.
pub const DEFAULT_SESSION: &str = "default";

/// Server state staged by the admin API, one slot per session.
///
/// State is consumed by the next business request on the same session,
/// whether or not that request matches anything.
#[derive(Debug, Default)]
pub struct StateStore {
    sessions: Mutex<HashMap<String, ServerState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `facts` into whatever is already staged for the session.
    pub fn stage(&self, session: &str, facts: Map<String, Value>) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session.to_string())
            .or_default()
            .extend(facts);
    }

    pub fn take(&self, session: &str) -> ServerState {
        self.sessions.lock().remove(session).unwrap_or_default()
    }

    pub fn is_staged(&self, session: &str) -> bool {
        self.sessions.lock().contains_key(session)
    }
}
