//! Unit tests for specmock modules
//!
//! These tests cover individual components without network I/O.

mod test_compat;
mod test_contract;
mod test_pattern;
mod test_stub;
