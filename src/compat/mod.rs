//! Backward-compatibility check between two versions of a contract.
//!
//! Every request the older contract can produce must still be accepted by
//! the newer one, and whatever the newer contract may answer must be
//! something the older contract already promised.

use crate::contract::{Feature, Scenario, ServerState};
use crate::errors::MatchError;
use crate::http::HttpRequest;
use crate::pattern::resolver::DEFAULT_VARIANT_LIMIT;
use crate::pattern::{Failure, MatchResult, NewVsOldContract, Results};
use std::sync::Arc;
use tracing::{debug, info};

/// Message for an old request that no new scenario accepts.
pub const REQUEST_REJECTED: &str = "This request, producible by the old contract, is now rejected by the new contract";

#[derive(Debug, Clone)]
pub struct CompatibilityChecker {
    variant_limit: usize,
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self {
            variant_limit: DEFAULT_VARIANT_LIMIT,
        }
    }

    /// Cap on the requests generated per older scenario.
    pub fn with_variant_limit(mut self, limit: usize) -> Self {
        self.variant_limit = limit.max(1);
        self
    }

    /// One outcome per older scenario. Scenarios flagged `ignoreFailure`
    /// only ever yield advisory failures.
    pub fn check(&self, older: &Feature, newer: &Feature) -> Results {
        let results: Results = older
            .scenarios()
            .iter()
            .map(|scenario| {
                let result = self.check_scenario(scenario, newer).breadcrumb(scenario.label());
                match result {
                    MatchResult::Failure(failure) if scenario.ignore_failure() => {
                        MatchResult::Failure(failure.into_advisory())
                    }
                    other => other,
                }
            })
            .collect();
        info!(
            scenarios = results.len(),
            failures = results.failure_count(),
            "Compatibility check finished"
        );
        results
    }

    fn check_scenario(&self, older: &Scenario, newer: &Feature) -> MatchResult {
        let requests = match older.generate_test_requests(self.variant_limit) {
            Ok(requests) => requests,
            Err(e) => {
                return MatchResult::failure(format!(
                    "Could not generate requests from the old contract: {}",
                    e
                ))
            }
        };
        for request in &requests {
            let result = check_request(older, newer, request);
            if result.is_failure() {
                debug!(scenario = %older.label(), "Incompatible request");
                return result;
            }
        }
        MatchResult::Success
    }
}

fn check_request(older: &Scenario, newer: &Feature, request: &HttpRequest) -> MatchResult {
    let candidates = newer.matching_scenarios(request);
    if candidates.is_empty() {
        let detail = match newer.lookup_scenario(request, &ServerState::new()) {
            Err(MatchError::NoMatchingScenario(results)) => {
                let failures: Vec<Failure> = results.failures().cloned().collect();
                (!failures.is_empty()).then(|| Failure::combine(failures))
            }
            Err(MatchError::Contract(e)) => Some(Failure::new(e.to_string())),
            Ok(_) => None,
        };
        return MatchResult::Failure(match detail {
            Some(cause) => Failure::caused_by(REQUEST_REJECTED, cause),
            None => Failure::new(REQUEST_REJECTED),
        })
        .breadcrumb("REQUEST");
    }

    // Scenarios that keep the old status are the natural counterparts.
    let (mut ordered, others): (Vec<&Scenario>, Vec<&Scenario>) = candidates
        .into_iter()
        .partition(|s| s.response().status == older.response().status);
    ordered.extend(others);

    let messages = Arc::new(NewVsOldContract);
    let older_resolver = older.resolver(&ServerState::new(), messages.clone());
    let mut first_failure = None;
    for candidate in ordered {
        let newer_resolver = candidate.resolver(&ServerState::new(), messages.clone());
        let result = candidate
            .response()
            .encompasses(older.response(), &newer_resolver, &older_resolver)
            .breadcrumb("RESPONSE");
        if result.is_success() {
            return result;
        }
        first_failure.get_or_insert(result);
    }
    first_failure.unwrap_or(MatchResult::Success)
}
