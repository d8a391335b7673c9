//! The stage gate.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::SkipToggles;
use crate::core::{StageEvent, StageRecord, StageStatus};
use crate::errors::HarnessError;
use crate::events::{EventSink, LoggingEventSink};

/// Runs named stages, honouring skip toggles.
///
/// A skipped stage's work is never invoked. A failing stage's error is
/// returned wrapped in [`HarnessError::StageFailed`] so the caller can abort
/// the remaining stages with `?`; a panicking stage is recorded as failed and
/// the panic continues to unwind.
pub struct StageGate {
    skip: SkipToggles,
    sink: Arc<dyn EventSink>,
    records: Mutex<Vec<StageRecord>>,
}

impl StageGate {
    /// Creates a gate that logs stage events.
    #[must_use]
    pub fn new(skip: SkipToggles) -> Self {
        Self {
            skip,
            sink: Arc::new(LoggingEventSink),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Runs one stage.
    ///
    /// `work` is not polled at all when the stage is skipped.
    pub async fn run<Fut>(&self, name: &str, work: Fut) -> Result<StageStatus, HarnessError>
    where
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        self.run_inner(name, false, work).await
    }

    pub(crate) async fn run_deferred<Fut>(
        &self,
        name: &str,
        work: Fut,
    ) -> Result<StageStatus, HarnessError>
    where
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        self.run_inner(name, true, work).await
    }

    async fn run_inner<Fut>(
        &self,
        name: &str,
        deferred: bool,
        work: Fut,
    ) -> Result<StageStatus, HarnessError>
    where
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        if self.skip.is_skipped(name) {
            let variable = SkipToggles::variable_for(name);
            info!(
                stage = name,
                "The '{variable}' environment variable is set, so skipping stage '{name}'."
            );
            self.sink.emit(
                &StageEvent::skipped(name, &format!("{variable} is set")).deferred(deferred),
            );
            self.push(StageRecord::skipped(name), deferred);
            return Ok(StageStatus::Skip);
        }

        info!(stage = name, deferred, "Running stage '{name}'");
        self.sink.emit(&StageEvent::started(name).deferred(deferred));
        let started = Instant::now();

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(())) => {
                let duration_ms = elapsed_ms(started);
                info!(stage = name, duration_ms, "Stage '{name}' completed");
                self.sink
                    .emit(&StageEvent::completed(name, duration_ms).deferred(deferred));
                self.push(StageRecord::ok(name, duration_ms), deferred);
                Ok(StageStatus::Ok)
            }
            Ok(Err(e)) => {
                let duration_ms = elapsed_ms(started);
                let message = e.to_string();
                error!(stage = name, duration_ms, error = %message, "Stage '{name}' failed");
                self.sink
                    .emit(&StageEvent::failed(name, &message).deferred(deferred));
                self.push(StageRecord::failed(name, duration_ms, message), deferred);
                Err(HarnessError::stage_failed(name, e))
            }
            Err(payload) => {
                let duration_ms = elapsed_ms(started);
                let message = format!("panicked: {}", panic_message(payload.as_ref()));
                error!(stage = name, duration_ms, error = %message, "Stage '{name}' failed");
                self.sink
                    .emit(&StageEvent::failed(name, &message).deferred(deferred));
                self.push(StageRecord::failed(name, duration_ms, message), deferred);
                std::panic::resume_unwind(payload)
            }
        }
    }

    fn push(&self, record: StageRecord, deferred: bool) {
        let record = if deferred { record.as_deferred() } else { record };
        self.records.lock().push(record);
    }

    /// Returns every stage outcome so far, in execution order.
    #[must_use]
    pub fn records(&self) -> Vec<StageRecord> {
        self.records.lock().clone()
    }

    /// Returns the last recorded status of the named stage.
    #[must_use]
    pub fn status_of(&self, name: &str) -> StageStatus {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map_or(StageStatus::Pending, |r| r.status)
    }
}

impl std::fmt::Debug for StageGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageGate")
            .field("skip", &self.skip)
            .field("records", &self.records.lock().len())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
