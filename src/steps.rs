//! Step variants: atomic, named remote operations.
//!
//! Steps describe operations as data. The decision engine enqueues them
//! before any side effect happens, and the run queue executes them strictly
//! in order. A step that produces a value for later steps (branch creation
//! producing the branch handle the new PR attaches to) exposes it through a
//! [`Deferred`] forward reference, resolved only once the producing step has
//! actually run.

use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::github::{BranchRef, PullRequestState};
use crate::types::{BranchName, PullRequestId};

/// Errors from step plumbing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepError {
    /// A forward reference was read before the producing step ran.
    #[error("deferred value read before the producing step ran")]
    Unresolved,
}

/// A single-assignment cell for a value produced by an earlier step.
///
/// Reading before the producing step has run fails fast rather than
/// returning a placeholder.
pub struct Deferred<T>(Arc<OnceLock<T>>);

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self(Arc::new(OnceLock::new()))
    }

    /// Resolves the cell. A second resolution is ignored; the first value
    /// wins.
    pub fn resolve(&self, value: T) {
        let _ = self.0.set(value);
    }

    /// Returns the resolved value, or fails if the producing step has not
    /// run yet.
    pub fn value(&self) -> Result<&T, StepError> {
        self.0.get().ok_or(StepError::Unresolved)
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(value) => write!(f, "Deferred({value:?})"),
            None => write!(f, "Deferred(<unresolved>)"),
        }
    }
}

/// One atomic remote operation.
///
/// A closed set: the run queue dispatches on this enum, so the decision
/// table stays exhaustiveness-checked at compile time.
#[derive(Debug)]
pub enum Step {
    /// Change state, title, and/or body of an existing pull request.
    ChangePullRequest {
        pr: PullRequestId,
        state: PullRequestState,
        title: Option<String>,
        body: Option<String>,
    },

    /// Extract the upstreamable change set and force-push it onto the export
    /// branch, producing the branch handle for later steps.
    CreateOrUpdateBranch {
        downstream_pr: PullRequestId,
        commit_count: u64,
        branch: Deferred<BranchRef>,
    },

    /// Open a new upstream pull request from a branch produced earlier in
    /// the run.
    OpenPullRequest {
        head: Deferred<BranchRef>,
        title: String,
        body: String,
        labels: Vec<String>,
    },

    /// Merge an upstream pull request, unless a blocking label is present.
    MergePullRequest {
        pr: PullRequestId,
        blocking_labels: Vec<String>,
    },

    /// Post a templated comment. Placeholders are rendered at execution
    /// time, when the upstream PR (possibly opened mid-run) is known.
    Comment {
        pr: PullRequestId,
        template: &'static str,
    },

    /// Delete the export branch from the fork.
    RemoveBranch { branch: BranchName },
}

impl Step {
    /// The value this step produces for later steps, if any.
    pub fn provides(&self) -> Option<Deferred<BranchRef>> {
        match self {
            Step::CreateOrUpdateBranch { branch, .. } => Some(branch.clone()),
            _ => None,
        }
    }

    /// Stable step name used for logging and the observer callback.
    pub fn name(&self) -> &'static str {
        match self {
            Step::ChangePullRequest { .. } => "change-pull-request",
            Step::CreateOrUpdateBranch { .. } => "create-or-update-branch",
            Step::OpenPullRequest { .. } => "open-pull-request",
            Step::MergePullRequest { .. } => "merge-pull-request",
            Step::Comment { .. } => "comment",
            Step::RemoveBranch { .. } => "remove-branch",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepoId;

    #[test]
    fn deferred_fails_fast_before_resolution() {
        let deferred: Deferred<BranchRef> = Deferred::new();
        assert_eq!(deferred.value().unwrap_err(), StepError::Unresolved);
    }

    #[test]
    fn deferred_resolution_is_visible_through_clones() {
        let deferred: Deferred<u64> = Deferred::new();
        let handle = deferred.clone();
        deferred.resolve(7);
        assert_eq!(handle.value().unwrap(), &7);
    }

    #[test]
    fn first_resolution_wins() {
        let deferred: Deferred<u64> = Deferred::new();
        deferred.resolve(1);
        deferred.resolve(2);
        assert_eq!(deferred.value().unwrap(), &1);
    }

    #[test]
    fn only_branch_creation_provides_a_value() {
        let pr = PullRequestId::new(RepoId::new("down", "stream"), 4u64);
        let create = Step::CreateOrUpdateBranch {
            downstream_pr: pr.clone(),
            commit_count: 1,
            branch: Deferred::new(),
        };
        let comment = Step::Comment {
            pr,
            template: "hello",
        };
        assert!(create.provides().is_some());
        assert!(comment.provides().is_none());
    }
}
