//! Deferred cleanup.
//!
//! This module provides the registry of cleanup stages that a scenario runs
//! on every exit path of its body.

mod cleanup;

pub use cleanup::{CleanupOutcome, CleanupRegistry};
