//! Stage gating.
//!
//! Stages are the named units of work a scenario is split into. The gate
//! decides whether a stage runs at all, times it, records the outcome and
//! publishes lifecycle events.

mod gate;

pub use gate::StageGate;
pub(crate) use gate::panic_message;
