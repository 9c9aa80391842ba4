//! Contract conformance testing against a running service.

mod verifier;

pub use verifier::{ContractVerifier, TestOutcome, VerificationReport, VerificationSummary};
