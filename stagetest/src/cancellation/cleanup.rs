//! Cleanup registry.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use crate::errors::HarnessError;
use crate::stages::{panic_message, StageGate};

type DeferredWork<C> = Box<dyn FnOnce(C) -> BoxFuture<'static, Result<(), HarnessError>> + Send>;

struct DeferredStage<C> {
    name: String,
    work: DeferredWork<C>,
}

/// What happened when the registered stages ran.
#[derive(Default)]
pub struct CleanupOutcome {
    /// Errors returned by deferred stages, in execution order.
    pub errors: Vec<HarnessError>,
    /// The first panic raised by a deferred stage, if any.
    pub panic: Option<Box<dyn Any + Send>>,
}

impl CleanupOutcome {
    /// Returns true if every deferred stage succeeded or was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.panic.is_none()
    }
}

impl std::fmt::Debug for CleanupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupOutcome")
            .field("errors", &self.errors)
            .field("panicked", &self.panic.is_some())
            .finish()
    }
}

/// Registry of deferred stages executed in LIFO order.
///
/// Each stage receives a clone of the context `C` and runs through the
/// [`StageGate`], so it can be skipped like any other stage. Running the
/// registry drains it, so every registered stage runs at most once.
pub struct CleanupRegistry<C> {
    stages: Mutex<Vec<DeferredStage<C>>>,
}

impl<C> Default for CleanupRegistry<C> {
    fn default() -> Self {
        Self {
            stages: Mutex::new(Vec::new()),
        }
    }
}

impl<C> CleanupRegistry<C>
where
    C: Clone + Send + 'static,
{
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a deferred stage.
    pub fn register<F, Fut>(&self, name: impl Into<String>, work: F)
    where
        F: FnOnce(C) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        let name = name.into();
        info!(stage = %name, "Deferring stage '{name}' until the scenario ends");
        self.stages.lock().push(DeferredStage {
            name,
            work: Box::new(move |ctx| work(ctx).boxed()),
        });
    }

    /// Removes every deferred stage with the given name.
    ///
    /// Returns true if a stage was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut stages = self.stages.lock();
        let before = stages.len();
        stages.retain(|s| s.name != name);
        stages.len() < before
    }

    /// Runs all deferred stages in LIFO order and clears the registry.
    ///
    /// A failing or panicking stage does not prevent the remaining ones from
    /// running.
    pub async fn run_all(&self, ctx: &C, gate: &StageGate) -> CleanupOutcome {
        let stages = std::mem::take(&mut *self.stages.lock());
        let mut outcome = CleanupOutcome::default();

        for stage in stages.into_iter().rev() {
            let DeferredStage { name, work } = stage;
            let ctx = ctx.clone();
            let run = gate.run_deferred(&name, async move { work(ctx).await });

            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(stage = %name, error = %e, "Deferred stage failed");
                    outcome.errors.push(e);
                }
                Err(payload) => {
                    warn!(
                        stage = %name,
                        panic = %panic_message(payload.as_ref()),
                        "Deferred stage panicked"
                    );
                    if outcome.panic.is_none() {
                        outcome.panic = Some(payload);
                    }
                }
            }
        }

        outcome
    }

    /// Returns the number of pending deferred stages.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.stages.lock().len()
    }

    /// Returns the names of pending deferred stages in registration order.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.stages.lock().iter().map(|s| s.name.clone()).collect()
    }
}

impl<C> std::fmt::Debug for CleanupRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending_count", &self.stages.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SkipToggles;
    use crate::core::StageStatus;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_registry_lifo_order() {
        let registry: CleanupRegistry<Arc<RwLock<Vec<u8>>>> = CleanupRegistry::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for i in 1..=3u8 {
            registry.register(format!("stage{i}"), move |order: Arc<RwLock<Vec<u8>>>| async move {
                order.write().push(i);
                Ok(())
            });
        }

        let gate = StageGate::new(SkipToggles::none());
        let outcome = registry.run_all(&order, &gate).await;

        assert!(outcome.is_clean());
        assert_eq!(*order.read(), vec![3, 2, 1]);
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_runs_exactly_once() {
        let registry: CleanupRegistry<Arc<AtomicUsize>> = CleanupRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register("cleanup", |c: Arc<AtomicUsize>| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let gate = StageGate::new(SkipToggles::none());
        registry.run_all(&counter, &gate).await;
        registry.run_all(&counter, &gate).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_continues_after_failure_and_panic() {
        let registry: CleanupRegistry<Arc<AtomicUsize>> = CleanupRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.register("first", |c: Arc<AtomicUsize>| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        registry.register("panics", |c: Arc<AtomicUsize>| async move {
            assert_eq!(c.load(Ordering::SeqCst), 99, "intentional");
            Ok(())
        });
        registry.register("fails", |_c: Arc<AtomicUsize>| async move {
            Err(HarnessError::InvalidKey("intentional".to_string()))
        });

        let gate = StageGate::new(SkipToggles::none());
        let outcome = registry.run_all(&counter, &gate).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.panic.is_some());
        assert_eq!(gate.status_of("first"), StageStatus::Ok);
        assert_eq!(gate.status_of("panics"), StageStatus::Fail);
        assert!(gate.records().iter().all(|r| r.deferred));
    }

    #[tokio::test]
    async fn test_deferred_stage_can_be_skipped() {
        let registry: CleanupRegistry<Arc<AtomicUsize>> = CleanupRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register("cleanup", |c: Arc<AtomicUsize>| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let gate = StageGate::new(SkipToggles::none().skip("cleanup"));
        let outcome = registry.run_all(&counter, &gate).await;

        assert!(outcome.is_clean());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(gate.status_of("cleanup"), StageStatus::Skip);
    }

    #[test]
    fn test_unregister() {
        let registry: CleanupRegistry<()> = CleanupRegistry::new();
        registry.register("keep", |()| async { Ok(()) });
        registry.register("remove", |()| async { Ok(()) });

        assert!(registry.unregister("remove"));
        assert!(!registry.unregister("nonexistent"));
        assert_eq!(registry.pending(), vec!["keep".to_string()]);
    }
}
