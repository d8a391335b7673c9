//! Event sinks for stage lifecycle observability.
//!
//! The stage gate publishes a [`StageEvent`](crate::core::StageEvent) whenever
//! a stage starts, completes, fails or is skipped.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
