//! Contracts: features made of ordered scenarios.

mod feature;
mod scenario;

pub use feature::{ContractTest, Feature};
pub use scenario::Scenario;

use serde_json::Value;
use std::collections::BTreeMap;

/// Server-side facts staged for one request. Passed explicitly into
/// matching and generation; features never hold on to it.
pub type ServerState = BTreeMap<String, Value>;
