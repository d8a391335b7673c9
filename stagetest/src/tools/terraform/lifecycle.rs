//! Provisioning lifecycle tracking.
//!
//! ```text
//! not-created ──create──▶ created ──apply──▶ applied ──verify_noop_plan──▶ verified
//!                                    ▲          │ ▲                           │
//!                                    └─ apply ──┘ └──────── apply ────────────┘
//!           any state except not-created ──destroy──▶ destroyed ──apply──▶ applied
//! ```
//!
//! The state is persisted with the scratch state so a replayed run that skips
//! earlier stages still validates its transitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::context::ScratchState;
use crate::errors::HarnessError;

/// Scratch state key of the lifecycle state.
pub const PROVISIONING_STATE_KEY: &str = "ProvisioningState";

/// Where the provisioned infrastructure currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningState {
    /// No working copy exists yet.
    #[default]
    NotCreated,
    /// The module has been copied.
    Created,
    /// Terraform apply succeeded.
    Applied,
    /// A re-plan matched the expectation.
    Verified,
    /// Terraform destroy succeeded.
    Destroyed,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotCreated => "not-created",
            Self::Created => "created",
            Self::Applied => "applied",
            Self::Verified => "verified",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Operations that move the lifecycle forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    /// Copy the module.
    Create,
    /// Init and apply.
    Apply,
    /// Re-plan and compare with the expectation.
    VerifyNoopPlan,
    /// Destroy.
    Destroy,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Apply => "apply",
            Self::VerifyNoopPlan => "verify_noop_plan",
            Self::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

impl ProvisioningState {
    /// Returns the state after `op`, or an error if `op` is not allowed now.
    pub fn next(self, op: LifecycleOp) -> Result<Self, HarnessError> {
        let next = match (op, self) {
            (LifecycleOp::Create, _) => Self::Created,
            (LifecycleOp::Apply | LifecycleOp::Destroy, Self::NotCreated)
            | (LifecycleOp::VerifyNoopPlan, Self::NotCreated | Self::Created | Self::Destroyed) => {
                return Err(HarnessError::InvalidTransition {
                    operation: op.to_string(),
                    state: self.to_string(),
                })
            }
            (LifecycleOp::Apply, _) => Self::Applied,
            (LifecycleOp::VerifyNoopPlan, _) => Self::Verified,
            (LifecycleOp::Destroy, _) => Self::Destroyed,
        };
        Ok(next)
    }
}

/// Lifecycle state stored in a scenario's scratch state.
#[derive(Debug, Clone)]
pub struct ProvisioningLifecycle {
    state: ScratchState,
}

impl ProvisioningLifecycle {
    /// Tracks the lifecycle inside `state`.
    #[must_use]
    pub fn new(state: ScratchState) -> Self {
        Self { state }
    }

    /// Returns the current state; a fresh working directory is `NotCreated`.
    pub fn current(&self) -> Result<ProvisioningState, HarnessError> {
        Ok(self
            .state
            .load_optional(PROVISIONING_STATE_KEY)?
            .unwrap_or_default())
    }

    /// Fails if `op` is not allowed from the current state.
    pub fn ensure(&self, op: LifecycleOp) -> Result<(), HarnessError> {
        self.current()?.next(op).map(|_| ())
    }

    /// Records that `op` completed.
    pub fn advance(&self, op: LifecycleOp) -> Result<ProvisioningState, HarnessError> {
        let from = self.current()?;
        let to = from.next(op)?;
        self.state.save(PROVISIONING_STATE_KEY, &to)?;
        info!(%op, %from, %to, "Provisioning state changed");
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::{LifecycleOp as Op, ProvisioningState as S};

    #[test]
    fn test_transition_table() {
        let all = [S::NotCreated, S::Created, S::Applied, S::Verified, S::Destroyed];
        for state in all {
            assert_eq!(state.next(Op::Create).unwrap(), S::Created);
        }

        assert!(S::NotCreated.next(Op::Apply).is_err());
        assert_eq!(S::Destroyed.next(Op::Apply).unwrap(), S::Applied);

        assert!(S::Created.next(Op::VerifyNoopPlan).is_err());
        assert!(S::Destroyed.next(Op::VerifyNoopPlan).is_err());
        assert_eq!(S::Verified.next(Op::VerifyNoopPlan).unwrap(), S::Verified);

        assert!(S::NotCreated.next(Op::Destroy).is_err());
        assert_eq!(S::Created.next(Op::Destroy).unwrap(), S::Destroyed);
    }

    #[test]
    fn test_invalid_transition_is_setup_error() {
        let err = S::NotCreated.next(Op::Apply).unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::Setup);
        assert_eq!(err.to_string(), "Cannot apply while provisioning is not-created");
    }

    #[test]
    fn test_lifecycle_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = ProvisioningLifecycle::new(ScratchState::new(dir.path()));
        assert_eq!(lifecycle.current().unwrap(), S::NotCreated);

        lifecycle.advance(Op::Create).unwrap();
        lifecycle.advance(Op::Apply).unwrap();

        let reopened = ProvisioningLifecycle::new(ScratchState::new(dir.path()));
        assert_eq!(reopened.current().unwrap(), S::Applied);
        assert!(reopened.ensure(Op::VerifyNoopPlan).is_ok());
        assert_eq!(reopened.advance(Op::Destroy).unwrap(), S::Destroyed);
        assert!(reopened.ensure(Op::VerifyNoopPlan).is_err());
    }
}
