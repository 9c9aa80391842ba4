//! Run generated conformance tests against a live service.

use crate::contract::{ContractTest, Feature};
use crate::errors::{ContractError, TransportError};
use crate::http::HttpMethod;
use crate::pattern::resolver::DEFAULT_VARIANT_LIMIT;
use crate::pattern::{Failure, MatchResult, Results};
use crate::stub::passthrough::send;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Outcome of one conformance test.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Label of the scenario under test
    pub scenario: String,
    pub method: HttpMethod,
    /// Path and query that were sent
    pub target: String,
    pub status: Option<u16>,
    pub result: MatchResult,
    pub duration_ms: u64,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.result.as_failure().map_or(true, Failure::is_advisory)
    }
}

/// Summary counts for printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub advisory: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub outcomes: Vec<TestOutcome>,
}

impl VerificationReport {
    /// Every outcome, breadcrumbed with its test name.
    pub fn results(&self) -> Results {
        self.outcomes
            .iter()
            .map(|o| o.result.clone().breadcrumb(format!("{} {}", o.method, o.target)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(TestOutcome::passed)
    }

    pub fn summary(&self) -> VerificationSummary {
        let results = self.results();
        VerificationSummary {
            total: self.outcomes.len(),
            passed: results.success_count(),
            failed: results.failure_count(),
            advisory: results.advisory_count(),
        }
    }
}

/// Sends each generated test request to `base_url` and checks the reply
/// against the scenario's response pattern.
#[derive(Debug, Clone)]
pub struct ContractVerifier {
    client: Client,
    base: Url,
    variant_limit: usize,
}

impl ContractVerifier {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidTarget(format!("{}: {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect {
                url: base_url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base,
            variant_limit: DEFAULT_VARIANT_LIMIT,
        })
    }

    pub fn with_variant_limit(mut self, limit: usize) -> Self {
        self.variant_limit = limit.max(1);
        self
    }

    pub async fn verify(&self, feature: &Feature) -> Result<VerificationReport, ContractError> {
        let tests = feature.generate_contract_tests(self.variant_limit)?;
        info!(feature = %feature.name(), tests = tests.len(), base = %self.base, "Running contract tests");

        let mut report = VerificationReport::default();
        for test in tests {
            report.outcomes.push(self.run(test).await);
        }
        let summary = report.summary();
        info!(passed = summary.passed, failed = summary.failed, "Contract tests finished");
        Ok(report)
    }

    async fn run(&self, test: ContractTest) -> TestOutcome {
        let ContractTest { scenario, request } = test;
        let start = Instant::now();
        let (status, result) = match send(&self.client, &self.base, &request).await {
            Ok(response) => (Some(response.status), scenario.matches_response(&response)),
            Err(e) => (None, MatchResult::failure(e.to_string())),
        };
        let result = match result {
            MatchResult::Failure(failure) if scenario.ignore_failure() => {
                MatchResult::Failure(failure.into_advisory())
            }
            other => other,
        };
        debug!(scenario = %scenario.label(), passed = result.is_success(), "Contract test ran");
        TestOutcome {
            scenario: scenario.label(),
            method: request.method,
            target: request.target(),
            status,
            result,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
