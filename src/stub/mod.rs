//! Stub server: registered expectations, contract fallbacks, pass-through
//! and the admin API around them.

mod engine;
mod expectation;
pub mod loader;
mod log;
pub mod passthrough;
mod registry;
pub mod server;
mod sse;
mod state;

pub use engine::{Served, StubEngine};
pub use expectation::{create_stub, ExpectationDocument, HttpStubData};
pub use loader::LoadOutcome;
pub use log::{Decision, RequestLog, RequestLogEntry};
pub use passthrough::Passthrough;
pub use registry::StubRegistry;
pub use server::StubServer;
pub use sse::{SseBroadcaster, SseEvent, SseExpectation, Subscription, MAX_REPLAY_SLOTS};
pub use state::{StateStore, DEFAULT_SESSION};
