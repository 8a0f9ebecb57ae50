//! Octocrab-backed implementation of the [`GitHubApi`] contract.
//!
//! All requests go through octocrab's generic HTTP verbs with local payload
//! structs, keeping the wire shapes this crate depends on in one place.

use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use crate::types::{PrNumber, PullRequestId, RepoId};

use super::error::GitHubApiError;
use super::{BranchRef, GitHubApi, PullRequestData, PullRequestUpdate};

/// A GitHub API client.
///
/// Unlike the effects it executes, the client is not scoped to a single
/// repository: one run touches the downstream repository, the upstream
/// repository, and the sync account's fork.
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,

    /// Base branch that newly opened upstream pull requests target.
    upstream_base: String,
}

#[derive(Debug, Deserialize)]
struct RawPull {
    number: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

impl RawPull {
    fn into_data(self, repo: &RepoId) -> PullRequestData {
        PullRequestData {
            id: PullRequestId::new(repo.clone(), self.number),
            title: self.title.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMergeResult {
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    message: Option<String>,
}

/// The first label on the PR that vetoes a merge, if any. Names must match
/// exactly.
fn find_blocking_label<'a>(labels: &'a [RawLabel], blocking: &[String]) -> Option<&'a RawLabel> {
    labels.iter().find(|label| blocking.contains(&label.name))
}

#[derive(Debug, Serialize)]
struct PullListQuery<'a> {
    head: &'a str,
    state: &'a str,
}

#[derive(Debug, Serialize)]
struct NewPullBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

impl GitHubClient {
    /// Creates a client from a pre-configured octocrab instance.
    pub fn new(client: Octocrab, upstream_base: impl Into<String>) -> Self {
        Self {
            client,
            upstream_base: upstream_base.into(),
        }
    }

    fn pull_route(pr: &PullRequestId) -> String {
        format!(
            "/repos/{}/{}/pulls/{}",
            pr.repo.owner, pr.repo.repo, pr.number.0
        )
    }

    fn issue_route(pr: &PullRequestId, suffix: &str) -> String {
        format!(
            "/repos/{}/{}/issues/{}/{}",
            pr.repo.owner, pr.repo.repo, pr.number.0, suffix
        )
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("upstream_base", &self.upstream_base)
            .finish_non_exhaustive()
    }
}

impl GitHubApi for GitHubClient {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<PullRequestData, GitHubApiError> {
        let route = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.repo, number.0);
        let pull: RawPull = self
            .client
            .get(route, None::<&()>)
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(pull.into_data(repo))
    }

    async fn get_branch(
        &self,
        repo: &RepoId,
        branch: &crate::types::BranchName,
    ) -> Result<Option<BranchRef>, GitHubApiError> {
        let route = format!("/repos/{}/{}/branches/{}", repo.owner, repo.repo, branch);
        let result: Result<serde_json::Value, octocrab::Error> =
            self.client.get(route, None::<&()>).await;
        match result {
            Ok(_) => Ok(Some(BranchRef {
                repo: repo.clone(),
                name: branch.clone(),
            })),
            Err(err) => {
                let err = GitHubApiError::from_octocrab(err);
                if err.is_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }

    async fn open_pull_request_for_branch(
        &self,
        repo: &RepoId,
        branch: &BranchRef,
    ) -> Result<Option<PullRequestData>, GitHubApiError> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.repo);
        let head = branch.head_ref();
        let query = PullListQuery {
            head: &head,
            state: "open",
        };
        let pulls: Vec<RawPull> = self
            .client
            .get(route, Some(&query))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(pulls.into_iter().next().map(|pull| pull.into_data(repo)))
    }

    async fn open_pull_request(
        &self,
        repo: &RepoId,
        head: &BranchRef,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<PullRequestData, GitHubApiError> {
        let route = format!("/repos/{}/{}/pulls", repo.owner, repo.repo);
        let head_ref = head.head_ref();
        let new_pull = NewPullBody {
            title,
            body,
            head: &head_ref,
            base: &self.upstream_base,
        };
        let pull: RawPull = self
            .client
            .post(route, Some(&new_pull))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        let pull = pull.into_data(repo);

        if !labels.is_empty() {
            let _: serde_json::Value = self
                .client
                .post(
                    Self::issue_route(&pull.id, "labels"),
                    Some(&serde_json::json!({ "labels": labels })),
                )
                .await
                .map_err(GitHubApiError::from_octocrab)?;
        }

        Ok(pull)
    }

    async fn update_pull_request(
        &self,
        pr: &PullRequestId,
        update: PullRequestUpdate,
    ) -> Result<PullRequestData, GitHubApiError> {
        let pull: RawPull = self
            .client
            .patch(Self::pull_route(pr), Some(&update))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(pull.into_data(&pr.repo))
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequestId,
        blocking_labels: &[String],
    ) -> Result<(), GitHubApiError> {
        let labels: Vec<RawLabel> = self
            .client
            .get(Self::issue_route(pr, "labels"), None::<&()>)
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        if let Some(label) = find_blocking_label(&labels, blocking_labels) {
            return Err(GitHubApiError::MergeBlocked {
                pr: pr.clone(),
                label: label.name.clone(),
            });
        }

        let route = format!("{}/merge", Self::pull_route(pr));
        let result: RawMergeResult = self
            .client
            .put(route, Some(&serde_json::json!({})))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        if result.merged {
            Ok(())
        } else {
            Err(GitHubApiError::MergeRejected {
                pr: pr.clone(),
                message: result.message.unwrap_or_else(|| "merge not performed".to_string()),
            })
        }
    }

    async fn post_comment(&self, pr: &PullRequestId, text: &str) -> Result<(), GitHubApiError> {
        let _: serde_json::Value = self
            .client
            .post(
                Self::issue_route(pr, "comments"),
                Some(&serde_json::json!({ "body": text })),
            )
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        Ok(())
    }
}
