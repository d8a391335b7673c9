//! # Stagetest GKE
//!
//! End-to-end test of the `gcp-gke` terraform module, built on `stagetest`.
//!
//! The scenario copies the module, applies it, points a kubeconfig at the new
//! cluster, checks node readiness, verifies that a re-plan only recreates the
//! module's helper resources, asserts that Istio and cert-manager are running,
//! and finally destroys everything.
//!
//! Every stage can be skipped with `SKIP_<stage>`, so a cluster can be
//! provisioned once (`SKIP_cleanup=1`) and verified repeatedly:
//!
//! ```text
//! SKIP_cleanup=1 cargo test -p stagetest-gke -- --ignored
//! SKIP_create_test_copy=1 SKIP_create_terratest_options=1 SKIP_terraform_apply=1 \
//!     cargo test -p stagetest-gke -- --ignored
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
    clippy::missing_errors_doc
)]

pub mod config;
pub mod scenario;

pub use config::{GkeScenarioConfig, MODULE_DIR_VAR};
pub use scenario::GkeScenario;
