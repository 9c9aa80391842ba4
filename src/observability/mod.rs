//! Logging and tracing setup shared by the server and the CLI.

pub mod telemetry;
