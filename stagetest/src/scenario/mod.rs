//! Scenarios: a stage gate, scratch state and deferred cleanup bundled
//! together for one test case.
//!
//! ```text
//! Scenario::run(body)
//!   ├─ body: stage("a") → stage("b") → defer_stage("cleanup") → stage("c") …
//!   │        (stops at the first setup or tool failure, or on panic;
//!   │         assertion failures are collected and the body continues)
//!   └─ deferred stages, LIFO, exactly once, on every exit path
//! ```

mod report;

pub use report::ScenarioReport;

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CleanupRegistry;
use crate::config::HarnessConfig;
use crate::context::ScratchState;
use crate::core::StageStatus;
use crate::errors::{ErrorCategory, HarnessError};
use crate::events::EventSink;
use crate::stages::StageGate;
use crate::utils::run_id;

struct ScenarioInner {
    name: String,
    run_id: Uuid,
    gate: StageGate,
    state: ScratchState,
    cleanup: CleanupRegistry<Scenario>,
    assertion_failures: Mutex<Vec<HarnessError>>,
}

/// One staged test case.
///
/// Cloning is cheap; clones share the gate, state and cleanup registry.
#[derive(Clone)]
pub struct Scenario {
    inner: Arc<ScenarioInner>,
}

impl Scenario {
    /// Creates a scenario whose working directory is `<working_root>/<name>`.
    pub fn new(name: impl Into<String>, config: &HarnessConfig) -> Result<Self, HarnessError> {
        let gate = StageGate::new(config.skip.clone());
        Self::with_gate(name, config, gate)
    }

    /// Creates a scenario that publishes stage events to `sink`.
    pub fn with_sink(
        name: impl Into<String>,
        config: &HarnessConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, HarnessError> {
        let gate = StageGate::new(config.skip.clone()).with_sink(sink);
        Self::with_gate(name, config, gate)
    }

    fn with_gate(
        name: impl Into<String>,
        config: &HarnessConfig,
        gate: StageGate,
    ) -> Result<Self, HarnessError> {
        let name = name.into();
        let working_dir = config.working_dir(&name);
        std::fs::create_dir_all(&working_dir)?;

        Ok(Self {
            inner: Arc::new(ScenarioInner {
                name,
                run_id: run_id(),
                gate,
                state: ScratchState::new(working_dir),
                cleanup: CleanupRegistry::new(),
                assertion_failures: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Returns the scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// Returns the scratch state.
    #[must_use]
    pub fn state(&self) -> &ScratchState {
        &self.inner.state
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        self.inner.state.working_dir()
    }

    /// Returns the stage gate.
    #[must_use]
    pub fn gate(&self) -> &StageGate {
        &self.inner.gate
    }

    /// Runs one stage through the gate.
    ///
    /// A stage that fails only on assertions is recorded as failed and
    /// reported when the scenario ends; this returns `Ok(StageStatus::Fail)`
    /// so the following stages still run. Any other failure is returned.
    pub async fn stage<Fut>(&self, name: &str, work: Fut) -> Result<StageStatus, HarnessError>
    where
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        match self.inner.gate.run(name, work).await {
            Err(e) if e.category() == ErrorCategory::Assertion => {
                warn!(stage = name, "Stage '{name}' has failed checks, continuing with the next stage");
                self.inner.assertion_failures.lock().push(e);
                Ok(StageStatus::Fail)
            }
            other => other,
        }
    }

    /// Registers a stage to run when the scenario body ends, however it ends.
    pub fn defer_stage<F, Fut>(&self, name: &str, work: F)
    where
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        self.inner.cleanup.register(name, work);
    }

    /// Runs the scenario body, then every deferred stage.
    ///
    /// Deferred stages run after the body returns, fails or panics. A panic
    /// from the body is re-raised once they have finished. Assertion failures
    /// of earlier stages, the body's error and cleanup errors are all
    /// returned, in that order, in [`HarnessError::Multiple`] when there is
    /// more than one.
    pub async fn run<F, Fut>(&self, body: F) -> Result<ScenarioReport, HarnessError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        info!(
            scenario = %self.inner.name,
            run_id = %self.inner.run_id,
            working_dir = %self.working_dir().display(),
            "Starting scenario"
        );

        let outcome = AssertUnwindSafe(body(self.clone())).catch_unwind().await;
        let cleanup = self.inner.cleanup.run_all(self, &self.inner.gate).await;

        let report = self.report();
        report.log_summary();

        let (body_error, body_panic) = match outcome {
            Ok(Ok(())) => (None, None),
            Ok(Err(e)) => (Some(e), None),
            Err(payload) => (None, Some(payload)),
        };

        if let Some(payload) = body_panic.or(cleanup.panic) {
            warn!(scenario = %self.inner.name, "Re-raising panic after cleanup");
            std::panic::resume_unwind(payload);
        }

        let assertions = std::mem::take(&mut *self.inner.assertion_failures.lock());
        let failed = HarnessError::combine(collapse(assertions), body_error);
        match HarnessError::combine(failed, collapse(cleanup.errors)) {
            None => Ok(report),
            Some(e) => Err(e),
        }
    }

    /// Returns a report of every stage outcome so far.
    #[must_use]
    pub fn report(&self) -> ScenarioReport {
        ScenarioReport::new(
            self.inner.name.clone(),
            self.inner.run_id,
            self.inner.gate.records(),
        )
    }
}

fn collapse(mut errors: Vec<HarnessError>) -> Option<HarnessError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(HarnessError::Multiple(errors)),
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.inner.name)
            .field("run_id", &self.inner.run_id)
            .field("working_dir", &self.working_dir())
            .field("gate", &self.inner.gate)
            .field("cleanup", &self.inner.cleanup)
            .finish()
    }
}
