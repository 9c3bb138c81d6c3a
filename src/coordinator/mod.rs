//! Resolution coordination: detection, selection, fallback and lock
//! reconciliation across the registered backends.

pub mod detect;
pub mod errors;
pub mod orchestrator;
pub mod select;
pub mod trace;

pub use detect::{detect_all, Detection};
pub use errors::AttemptError;
pub use orchestrator::{AttemptOptions, Orchestrator, State};
pub use select::SelectionEngine;
pub use trace::{AttemptTrace, ResolutionOutcome, TraceEntry, TraceOutcome};
