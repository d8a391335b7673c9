//! Event sink trait and implementations.

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::core::{StageEvent, StageEventKind};

/// Receiver of stage events.
///
/// Emission happens inline on the stage's task, so implementations must be
/// cheap and must never panic.
pub trait EventSink: Send + Sync {
    /// Receives one event.
    fn emit(&self, event: &StageEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &StageEvent) {}
}

/// Writes each event as a structured tracing record.
///
/// Failures are logged at `WARN`, everything else at `DEBUG`; the gate itself
/// already logs a human-readable line per stage at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &StageEvent) {
        let timestamp = event.timestamp.to_rfc3339();
        if event.kind == StageEventKind::Failed {
            warn!(
                event_type = %event.kind,
                stage = %event.stage,
                deferred = event.deferred,
                %timestamp,
                detail = event.detail.as_deref().unwrap_or_default(),
                "stage event"
            );
        } else {
            debug!(
                event_type = %event.kind,
                stage = %event.stage,
                deferred = event.deferred,
                %timestamp,
                duration_ms = ?event.duration_ms,
                detail = ?event.detail,
                "stage event"
            );
        }
    }
}

/// Keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().clone()
    }

    /// Returns the collected events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: StageEventKind) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the stages for which an event of `kind` was seen, in order.
    #[must_use]
    pub fn stages_with(&self, kind: StageEventKind) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.stage.clone())
            .collect()
    }

    /// Forgets everything collected so far.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}
