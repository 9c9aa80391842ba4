use super::HttpStubData;
use crate::http::HttpRequest;
use crate::pattern::Results;
use parking_lot::Mutex;
use std::sync::Arc;

/// Registered expectations, newest first.
///
/// The lock only guards the list itself. Matching runs on a snapshot taken
/// under the lock, so a slow match never holds up registrations.
#[derive(Debug, Default)]
pub struct StubRegistry {
    stubs: Mutex<Vec<Arc<HttpStubData>>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stub: HttpStubData) -> Arc<HttpStubData> {
        let stub = Arc::new(stub);
        self.stubs.lock().insert(0, Arc::clone(&stub));
        stub
    }

    pub fn snapshot(&self) -> Vec<Arc<HttpStubData>> {
        self.stubs.lock().clone()
    }

    /// The most recently registered stub that accepts the request, or the
    /// failures of every stub when none does.
    pub fn find_match(&self, request: &HttpRequest) -> Result<Arc<HttpStubData>, Results> {
        let mut results = Results::new();
        for stub in self.snapshot() {
            let result = stub.matches(request);
            if result.is_success() {
                return Ok(stub);
            }
            results.push(result.breadcrumb(stub.label()));
        }
        Err(results)
    }

    /// Remove every stub registered with `token`. Returns how many went.
    pub fn remove_by_token(&self, token: &str) -> usize {
        let mut stubs = self.stubs.lock();
        let before = stubs.len();
        stubs.retain(|stub| stub.token() != Some(token));
        before - stubs.len()
    }

    pub fn len(&self) -> usize {
        self.stubs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.lock().is_empty()
    }
}
