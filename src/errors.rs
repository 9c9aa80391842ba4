use crate::pattern::Results;
use thiserror::Error;

/// The central error type for specmock.
///
/// Expected mismatches never show up here: they travel as
/// [`MatchResult`](crate::pattern::MatchResult) values. This hierarchy is for
/// defects in contracts, transport failures, and the application edge.
#[derive(Error, Debug)]
pub enum SpecmockError {
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("{0}")]
    Match(#[from] MatchError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A defect in the contract itself rather than in the value being matched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("Pattern named ({name}) is not defined in this contract")]
    UnknownPattern { name: String },

    #[error("Pattern ({name}) only refers to itself through other aliases")]
    CyclicReference { name: String },

    #[error("Cannot generate a value for ({name}): it is required and contains itself with no way out")]
    CyclicGeneration { name: String },

    #[error("Discriminator value '{value}' maps to branch {index}, but there are only {branches} branches")]
    DiscriminatorMapping {
        value: String,
        index: usize,
        branches: usize,
    },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid path template '{template}': {reason}")]
    InvalidPath { template: String, reason: String },

    #[error("Example does not match the contract:\n{report}")]
    InvalidExample { report: String },

    #[error("Fact '{key}' does not match the contract:\n{report}")]
    InvalidFact { key: String, report: String },

    #[error("Contract definition error:\n{report}")]
    Definition { report: String },

    #[error("Invalid contract document {source_name}: {message}")]
    InvalidDocument {
        source_name: String,
        message: String,
    },
}

/// Raised when a request must be answered definitively and nothing matched.
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("No matching scenario\n{}", .0.report())]
    NoMatchingScenario(Results),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl MatchError {
    /// The aggregated mismatch results, if this was a plain no-match.
    pub fn results(&self) -> Option<&Results> {
        match self {
            MatchError::NoMatchingScenario(results) => Some(results),
            MatchError::Contract(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Upstream request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not reach upstream {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Invalid pass-through target: {0}")]
    InvalidTarget(String),

    #[error("Failed to read upstream response: {0}")]
    Body(String),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {message}")]
    Bind { address: String, message: String },

    #[error("Server stopped unexpectedly: {0}")]
    Serve(String),
}

pub type Result<T> = std::result::Result<T, SpecmockError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_INCOMPATIBLE: u8 = 3;
pub const EXIT_CONTRACT_ERROR: u8 = 4;

/// Marker error returned by the CLI when a compatibility check fails.
#[derive(Error, Debug)]
#[error("The newer contract is not backward compatible ({failures} failing scenarios)")]
pub struct IncompatibleContracts {
    pub failures: usize,
}

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<IncompatibleContracts>().is_some() {
        return EXIT_INCOMPATIBLE;
    }

    if let Some(specmock_err) = e.downcast_ref::<SpecmockError>() {
        return match specmock_err {
            SpecmockError::Config(_) => EXIT_CONFIG_ERROR,
            SpecmockError::Contract(_) => EXIT_CONTRACT_ERROR,
            _ => EXIT_ERROR,
        };
    }

    if e.downcast_ref::<ContractError>().is_some() {
        return EXIT_CONTRACT_ERROR;
    }

    EXIT_ERROR
}
