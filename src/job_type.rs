//! Job categories and the rules for changing them.
//!
//! A job's `job_type` describes how it is triggered in dbt Cloud. Once a job
//! has a category most changes are refused, because the remote service ties
//! unrelated trigger and execution behavior to it. Only `scheduled` and
//! `other` may be swapped for each other.
//!
//! This check runs client-side during planning. dbt Cloud still has the final
//! say when the update is applied.
//!
//! # Example
//!
//! ```
//! use dbtcloud_provider::job_type::{validate_transition, JobCategory};
//!
//! assert!(validate_transition(None, JobCategory::Ci).is_ok());
//! assert!(validate_transition(Some(JobCategory::Scheduled), JobCategory::Other).is_ok());
//!
//! let err = validate_transition(Some(JobCategory::Ci), JobCategory::Merge).unwrap_err();
//! assert!(err.to_string().contains("can only be set to 'ci'"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The classification of a dbt Cloud job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCategory {
    /// Triggered by pull request webhooks.
    Ci,
    /// Triggered when a pull request is merged.
    Merge,
    /// Triggered by a cron schedule.
    Scheduled,
    /// Anything else, usually run on demand or through the API.
    Other,
    /// Managed by dbt Cloud's adaptive scheduling.
    Adaptive,
}

/// Allowed targets for each established category.
const TRANSITIONS: &[(JobCategory, &[JobCategory])] = &[
    (JobCategory::Ci, &[JobCategory::Ci]),
    (JobCategory::Merge, &[JobCategory::Merge]),
    (JobCategory::Adaptive, &[JobCategory::Adaptive]),
    (
        JobCategory::Scheduled,
        &[JobCategory::Scheduled, JobCategory::Other],
    ),
    (
        JobCategory::Other,
        &[JobCategory::Scheduled, JobCategory::Other],
    ),
];

impl JobCategory {
    /// Every category, in the order dbt Cloud documents them.
    pub const ALL: [JobCategory; 5] = [
        JobCategory::Ci,
        JobCategory::Merge,
        JobCategory::Scheduled,
        JobCategory::Other,
        JobCategory::Adaptive,
    ];

    /// The label used in configuration and by the API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ci => "ci",
            Self::Merge => "merge",
            Self::Scheduled => "scheduled",
            Self::Other => "other",
            Self::Adaptive => "adaptive",
        }
    }

    /// Parse a stored label, treating the empty string as "not yet set".
    pub fn from_state(label: &str) -> Result<Option<Self>, UnknownJobCategory> {
        if label.is_empty() {
            Ok(None)
        } else {
            label.parse().map(Some)
        }
    }

    /// The categories a job of this category may be moved to.
    pub fn allowed_targets(self) -> &'static [JobCategory] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, targets)| *targets)
            .unwrap_or(&[])
    }

    /// Infer the category of a new job from its triggers.
    ///
    /// Merge triggers win over webhooks, and webhooks over schedules.
    pub fn infer(
        github_webhook: bool,
        git_provider_webhook: bool,
        schedule: bool,
        on_merge: bool,
    ) -> Self {
        if on_merge {
            Self::Merge
        } else if github_webhook || git_provider_webhook {
            Self::Ci
        } else if schedule {
            Self::Scheduled
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for JobCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobCategory {
    type Err = UnknownJobCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownJobCategory(s.to_string()))
    }
}

/// A label that is not one of the known job categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job type '{0}', expected one of: ci, merge, scheduled, other, adaptive")]
pub struct UnknownJobCategory(pub String);

/// A refused change of job category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job_type cannot be changed from '{from}' to '{to}': a '{from}' job {}", allowed_phrase(.allowed))]
pub struct TransitionError {
    /// The established category.
    pub from: JobCategory,
    /// The category that was asked for.
    pub to: JobCategory,
    /// The categories `from` may move to.
    pub allowed: &'static [JobCategory],
}

fn allowed_phrase(allowed: &[JobCategory]) -> String {
    let quoted: Vec<String> = allowed.iter().map(|c| format!("'{}'", c)).collect();
    let list = match quoted.split_last() {
        None => return "cannot be changed".to_string(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
    };
    format!("can only be set to {}", list)
}

/// Check whether a job may move from `previous` to `proposed`.
///
/// `previous` is `None` while the job has no recorded category yet, in which
/// case any category is accepted.
pub fn validate_transition(
    previous: Option<JobCategory>,
    proposed: JobCategory,
) -> Result<(), TransitionError> {
    let Some(previous) = previous else {
        return Ok(());
    };
    if previous == proposed {
        return Ok(());
    }

    let allowed = previous.allowed_targets();
    if allowed.contains(&proposed) {
        Ok(())
    } else {
        Err(TransitionError {
            from: previous,
            to: proposed,
            allowed,
        })
    }
}
