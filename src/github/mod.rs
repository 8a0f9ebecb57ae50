//! GitHub API collaborator contract and octocrab-backed implementation.
//!
//! The sync core talks to GitHub exclusively through the [`GitHubApi`] trait,
//! which keeps the run queue testable with recording mocks. The real
//! implementation ([`GitHubClient`]) issues requests through octocrab.
//!
//! Remote calls are not retried automatically: a failed call aborts the run,
//! and the next webhook delivery re-derives the intended state from live
//! remote state.

mod client;
mod error;

pub use client::GitHubClient;
pub use error::GitHubApiError;

use serde::Serialize;
use std::future::Future;

use crate::types::{BranchName, PullRequestId, RepoId};

/// A pull request as known to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestData {
    pub id: PullRequestId,
    pub title: String,
    pub body: String,
}

/// A branch that exists on the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub repo: RepoId,
    pub name: BranchName,
}

impl BranchRef {
    /// The `owner:branch` head reference used when opening a PR from a fork.
    pub fn head_ref(&self) -> String {
        format!("{}:{}", self.repo.owner, self.name)
    }
}

/// Target state for a pull request update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
}

/// Fields to change on an existing pull request. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullRequestUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PullRequestState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The remote pull-request service contract consumed by the sync core.
///
/// Implementations execute each operation against live remote state. Tests
/// substitute a recording mock.
pub trait GitHubApi {
    /// Fetches a pull request by number.
    fn get_pull_request(
        &self,
        repo: &RepoId,
        number: crate::types::PrNumber,
    ) -> impl Future<Output = Result<PullRequestData, GitHubApiError>> + Send;

    /// Looks up a branch, returning `None` if it does not exist.
    fn get_branch(
        &self,
        repo: &RepoId,
        branch: &BranchName,
    ) -> impl Future<Output = Result<Option<BranchRef>, GitHubApiError>> + Send;

    /// Finds the open pull request in `repo` whose head is `branch`, if any.
    fn open_pull_request_for_branch(
        &self,
        repo: &RepoId,
        branch: &BranchRef,
    ) -> impl Future<Output = Result<Option<PullRequestData>, GitHubApiError>> + Send;

    /// Opens a pull request against `repo` from the given head branch and
    /// applies `labels` to it.
    fn open_pull_request(
        &self,
        repo: &RepoId,
        head: &BranchRef,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> impl Future<Output = Result<PullRequestData, GitHubApiError>> + Send;

    /// Changes state, title, and/or body of an existing pull request.
    fn update_pull_request(
        &self,
        pr: &PullRequestId,
        update: PullRequestUpdate,
    ) -> impl Future<Output = Result<PullRequestData, GitHubApiError>> + Send;

    /// Merges a pull request. Fails with [`GitHubApiError::MergeBlocked`] if
    /// the PR still carries any of `blocking_labels`.
    fn merge_pull_request(
        &self,
        pr: &PullRequestId,
        blocking_labels: &[String],
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;

    /// Posts a comment on a pull request.
    fn post_comment(
        &self,
        pr: &PullRequestId,
        text: &str,
    ) -> impl Future<Output = Result<(), GitHubApiError>> + Send;
}
