//! Plan summary parsing and no-op plan expectations.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::checks::Checks;
use crate::errors::HarnessError;

/// Resource change counts reported by terraform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCount {
    /// Resources to add.
    pub add: u32,
    /// Resources to change in place.
    pub change: u32,
    /// Resources to destroy.
    pub destroy: u32,
}

struct Patterns {
    ansi: Regex,
    plan: Regex,
    apply: Regex,
    destroy: Regex,
    no_changes: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            ansi: Regex::new(r"\x1b\[[0-9;]*m")?,
            plan: Regex::new(
                r"Plan: (?:\d+ to import, )?(\d+) to add, (\d+) to change, (\d+) to destroy(?:, \d+ to forget)?\.",
            )?,
            apply: Regex::new(
                r"Apply complete! Resources: (?:\d+ imported, )?(\d+) added, (\d+) changed, (\d+) destroyed\.",
            )?,
            destroy: Regex::new(r"Destroy complete! Resources: (\d+) destroyed\.")?,
            no_changes: Regex::new(r"No changes\.")?,
        })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

fn number(caps: &regex::Captures<'_>, group: usize) -> u32 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_default()
}

impl ResourceCount {
    /// Creates a count.
    #[must_use]
    pub fn new(add: u32, change: u32, destroy: u32) -> Self {
        Self {
            add,
            change,
            destroy,
        }
    }

    /// Parses the last plan, apply or destroy summary in `output`.
    ///
    /// `No changes.` counts as zero everywhere. Colour codes are ignored.
    pub fn from_output(output: &str) -> Result<Self, HarnessError> {
        let p = PATTERNS.as_ref().map_err(|e| HarnessError::Parse {
            what: format!("resource counts (bad pattern: {e})"),
        })?;
        let text = p.ansi.replace_all(output, "");

        if let Some(caps) = p.plan.captures_iter(&text).last() {
            return Ok(Self::new(number(&caps, 1), number(&caps, 2), number(&caps, 3)));
        }
        if let Some(caps) = p.apply.captures_iter(&text).last() {
            return Ok(Self::new(number(&caps, 1), number(&caps, 2), number(&caps, 3)));
        }
        if let Some(caps) = p.destroy.captures_iter(&text).last() {
            return Ok(Self::new(0, 0, number(&caps, 1)));
        }
        if p.no_changes.is_match(&text) {
            return Ok(Self::default());
        }
        Err(HarnessError::Parse {
            what: "resource counts".to_string(),
        })
    }
}

impl std::fmt::Display for ResourceCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

/// What a re-plan of an applied module is expected to show.
///
/// The counts depend on the module version: some helper resources are
/// recreated on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanExpectation {
    /// Expected change counts.
    pub counts: ResourceCount,
    /// Resource names the plan must mention.
    pub resources: Vec<String>,
}

impl PlanExpectation {
    /// Expects exactly these counts and nothing named.
    #[must_use]
    pub fn new(add: u32, change: u32, destroy: u32) -> Self {
        Self {
            counts: ResourceCount::new(add, change, destroy),
            resources: Vec::new(),
        }
    }

    /// A plan with no changes at all.
    #[must_use]
    pub fn no_changes() -> Self {
        Self::new(0, 0, 0)
    }

    /// The GKE module's always-recreated kubectl helpers.
    #[must_use]
    pub fn gke_module() -> Self {
        Self::new(4, 0, 4)
            .with_resource("setup_gcloud_cli")
            .with_resource("configure_kubectl")
            .with_resource("download_kubectl")
    }

    /// Requires the plan to mention `resource`.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// Records one check per count and per resource.
    pub fn check(&self, checks: &mut Checks, plan_output: &str) {
        if let Some(actual) = checks.ok(
            ResourceCount::from_output(plan_output),
            "Unable to read the plan summary",
        ) {
            checks.equal("resources to change", self.counts.change, actual.change);
            checks.equal("resources to add", self.counts.add, actual.add);
            checks.equal("resources to destroy", self.counts.destroy, actual.destroy);
        }
        for resource in &self.resources {
            checks.contains("plan", plan_output, resource);
        }
    }
}
