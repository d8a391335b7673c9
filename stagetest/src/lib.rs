//! # Stagetest
//!
//! A staged, resumable harness for infrastructure end-to-end tests.
//!
//! Long-running infrastructure tests (provision a cluster, point a client at
//! it, assert on workloads, tear it down) are painful to debug when every
//! iteration re-provisions from scratch. Stagetest splits such a test into
//! named stages and provides:
//!
//! - **Stage gating**: every stage can be skipped on re-run with a
//!   `SKIP_<stage>` toggle, so already-completed provisioning is not repeated
//! - **Persisted scratch state**: values handed from one stage to the next are
//!   written to a per-scenario working directory, so later stages can run in a
//!   separate process invocation
//! - **Deferred cleanup**: teardown stages run exactly once on every exit path
//!   of the scenario body, including assertion failures and panics
//! - **Tool wrappers**: terraform, gcloud and a Kubernetes cluster client behind
//!   injectable traits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagetest::prelude::*;
//!
//! let env = Environment::capture();
//! let config = HarnessConfig::from_environment(&env);
//! let scenario = Scenario::new("gke_test", &config)?;
//!
//! scenario
//!     .run(|s| async move {
//!         s.stage("create_test_copy", async {
//!             s.state().save_string("modulePath", "/tmp/module")
//!         })
//!         .await?;
//!
//!         s.defer_stage("cleanup", |s| async move {
//!             let path = s.state().load_string("modulePath")?;
//!             tracing::info!(%path, "tearing down");
//!             Ok(())
//!         });
//!         Ok(())
//!     })
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checks;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod k8s;
pub mod observability;
pub mod scenario;
pub mod stages;
pub mod testing;
pub mod tools;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CleanupRegistry;
    pub use crate::checks::{AssertionFailure, Checks};
    pub use crate::config::{Environment, HarnessConfig, LogFormat, SkipToggles};
    pub use crate::context::ScratchState;
    pub use crate::core::{StageEvent, StageEventKind, StageRecord, StageStatus};
    pub use crate::errors::{ClusterError, ErrorCategory, HarnessError, ToolError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::k8s::{
        verify_nodes_ready, verify_workloads, ClusterClient, ClusterConnector, KubectlOptions,
        WorkloadExpectation,
    };
    pub use crate::observability::init_logging;
    pub use crate::scenario::{Scenario, ScenarioReport};
    pub use crate::stages::StageGate;
    pub use crate::tools::terraform::{
        LifecycleOp, ModuleVars, PlanExpectation, ProvisioningLifecycle, ProvisioningState,
        ResourceCount, Terraform, TerraformOptions,
    };
    pub use crate::tools::{CommandOutput, CommandRunner, ShellCommand, SystemRunner, Toolchain};
    pub use crate::utils::unique_id;
}
