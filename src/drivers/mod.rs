// src/drivers/mod.rs
// Instrument-facing seam: the session trait the acquisition loop polls,
// plus in-process sessions for tests and the demo binary.
pub mod error;
pub mod simulated;
pub mod source;

pub use error::ScopeError;
pub use simulated::{SimulatedScope, SimulatedScopeConfig};
pub use source::{InstrumentSession, ScriptedSession};
