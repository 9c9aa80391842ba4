//! specmock - contract-driven API testing
//!
//! Contracts describe HTTP interactions as request/response patterns. From
//! one contract specmock can:
//!
//! - **Match**: check requests and responses against the patterns and
//!   explain every mismatch with a breadcrumbed report
//! - **Stub**: serve the contract over HTTP, answering from registered
//!   expectations, a pass-through upstream, or generated values
//! - **Compare**: decide whether a newer contract is backward compatible
//!   with an older one
//! - **Verify**: generate conformance tests and run them against a live
//!   service
//!
//! # Quick Start
//!
//! ```ignore
//! use specmock::contract::Feature;
//! use specmock::compat::CompatibilityChecker;
//!
//! let older = Feature::from_file("orders-v1.json".as_ref())?;
//! let newer = Feature::from_file("orders-v2.json".as_ref())?;
//! let results = CompatibilityChecker::new().check(&older, &newer);
//! println!("{}", results.report());
//! ```

// ─── Matching core ─────────────────────────────────────────────────
pub mod contract;
pub mod errors;
pub mod http;
pub mod pattern;

// ─── Stub serving & checks ─────────────────────────────────────────
pub mod compat;
pub mod stub;
pub mod testing;

// ─── Application edge ──────────────────────────────────────────────
pub mod cli;
pub mod config;
pub mod observability;
