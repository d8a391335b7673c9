//! Soft-fail assertion collection.
//!
//! A verification stage usually asserts several independent facts. `Checks`
//! records every failing fact instead of stopping at the first one, so a single
//! run reports, say, both a missing namespace and an empty one. Each failure is
//! logged the moment it is observed; [`Checks::finish`] turns the collection
//! into the stage's result.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use tracing::error;

use crate::errors::HarnessError;

/// One check that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// Human-readable description of the unmet expectation.
    pub message: String,
}

impl AssertionFailure {
    /// Creates a new assertion failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Collector of independent checks for one stage.
#[derive(Debug)]
pub struct Checks {
    stage: String,
    total: usize,
    failures: Vec<AssertionFailure>,
}

impl Checks {
    /// Creates an empty collector for the named stage.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            total: 0,
            failures: Vec::new(),
        }
    }

    /// Records a failure if `condition` is false. Returns `condition`.
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        self.total += 1;
        if !condition {
            self.fail(message);
        }
        condition
    }

    /// Checks that `actual` equals `expected`.
    pub fn equal<T>(&mut self, label: &str, expected: T, actual: T) -> bool
    where
        T: PartialEq + Debug,
    {
        let ok = expected == actual;
        self.check(ok, format!("{label}: expected {expected:?}, got {actual:?}"))
    }

    /// Checks that `haystack` contains `needle`.
    pub fn contains(&mut self, label: &str, haystack: &str, needle: &str) -> bool {
        self.check(
            haystack.contains(needle),
            format!("{label}: output does not mention '{needle}'"),
        )
    }

    /// Checks that `result` is `Ok`, returning the value when it is.
    pub fn ok<T, E>(&mut self, result: Result<T, E>, message: &str) -> Option<T>
    where
        E: Display,
    {
        self.total += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(format!("{message}: {e}"));
                None
            }
        }
    }

    /// Records an unconditional failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        let failure = AssertionFailure::new(message);
        error!(stage = %self.stage, failure = %failure, "Check failed");
        self.failures.push(failure);
    }

    /// Returns the failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    /// Returns the number of checks performed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns true if every check so far held.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts the collection into the stage result.
    pub fn finish(self) -> Result<(), HarnessError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::Assertions {
                stage: self.stage,
                failures: self.failures,
            })
        }
    }
}
