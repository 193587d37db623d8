pub mod controller;
pub mod state;

pub use controller::{CarbonSession, SessionConfig};
pub use state::{SessionReport, SessionState, SessionStatus, WorkloadOutcome};
