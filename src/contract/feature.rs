use super::{Scenario, ServerState};
use crate::errors::{ContractError, MatchError};
use crate::http::{HttpRequest, HttpResponse};
use crate::pattern::{MatchResult, Results};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A whole contract. Scenario order is match priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    name: String,
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

/// A generated conformance test: the scenario and one request it accepts.
#[derive(Debug, Clone)]
pub struct ContractTest {
    pub scenario: Scenario,
    pub request: HttpRequest,
}

impl Feature {
    pub fn new(name: impl Into<String>, scenarios: Vec<Scenario>) -> Self {
        Self {
            name: name.into(),
            scenarios,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Parse and validate a contract document.
    pub fn from_json(source_name: &str, text: &str) -> Result<Self, ContractError> {
        let mut feature: Feature =
            serde_json::from_str(text).map_err(|e| ContractError::InvalidDocument {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        if feature.name.is_empty() {
            feature.name = source_name.to_string();
        }
        feature.validate()?;
        Ok(feature)
    }

    pub fn from_file(path: &Path) -> Result<Self, ContractError> {
        let source_name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| ContractError::InvalidDocument {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;
        let mut feature = Self::from_json(&source_name, &text)?;
        if feature.name == source_name {
            if let Some(stem) = path.file_stem() {
                feature.name = stem.to_string_lossy().into_owned();
            }
        }
        Ok(feature)
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        self.scenarios.iter().try_for_each(Scenario::validate)
    }

    /// First scenario, in declaration order, that accepts the request.
    ///
    /// Scenarios are tried lazily. A contract defect met along the way ends
    /// the lookup; otherwise the failures of every scenario are returned
    /// with the "wrong endpoint" ones dropped.
    pub fn lookup_scenario(
        &self,
        request: &HttpRequest,
        state: &ServerState,
    ) -> Result<&Scenario, MatchError> {
        self.first_match(|scenario| scenario.matches(request, state))
    }

    /// Generate the response for a request from the contract alone.
    pub fn lookup_response(
        &self,
        request: &HttpRequest,
        state: &ServerState,
    ) -> Result<(&Scenario, HttpResponse), MatchError> {
        let scenario = self.lookup_scenario(request, state)?;
        debug!(feature = %self.name, scenario = %scenario.label(), "Scenario matched");
        let response = scenario.generate_response(state)?;
        Ok((scenario, response))
    }

    /// Every scenario that accepts the request, in order.
    pub fn matching_scenarios(&self, request: &HttpRequest) -> Vec<&Scenario> {
        let state = ServerState::new();
        self.scenarios
            .iter()
            .filter(|s| s.matches(request, &state).is_success())
            .collect()
    }

    /// The scenario an expectation conforms to.
    pub fn match_expectation(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<&Scenario, MatchError> {
        self.first_match(|scenario| scenario.match_stub(request, response))
    }

    fn first_match(
        &self,
        mut check: impl FnMut(&Scenario) -> MatchResult,
    ) -> Result<&Scenario, MatchError> {
        let mut results = Results::new();
        for scenario in &self.scenarios {
            let result = check(scenario);
            if result.is_success() {
                return Ok(scenario);
            }
            if result.is_fatal() {
                return Err(MatchError::Contract(ContractError::Definition {
                    report: result.breadcrumb(scenario.label()).report().to_string(),
                }));
            }
            results.push(result.breadcrumb(scenario.label()));
        }
        Err(MatchError::NoMatchingScenario(results.without_fluff()))
    }

    /// Conformance tests for every scenario, at most `limit` per scenario.
    pub fn generate_contract_tests(&self, limit: usize) -> Result<Vec<ContractTest>, ContractError> {
        let mut tests = Vec::new();
        for scenario in &self.scenarios {
            for request in scenario.generate_test_requests(limit)? {
                tests.push(ContractTest {
                    scenario: scenario.clone(),
                    request,
                });
            }
        }
        Ok(tests)
    }
}
