//! Recording doubles for the remote API and local VCS contracts.
//!
//! Each double appends one compact line per call to `calls`, so tests can
//! assert both what happened and in which order.

use std::sync::Mutex;

use crate::git::{ExportCommit, GitError, GitResult, LocalVcs};
use crate::github::{BranchRef, GitHubApi, GitHubApiError, PullRequestData, PullRequestUpdate};
use crate::types::{BranchName, PrNumber, PullRequestId, RepoId};

/// A recording GitHub double.
#[derive(Debug)]
pub struct MockGitHub {
    pub calls: Mutex<Vec<String>>,

    /// Whether `get_branch` reports the export branch as existing.
    pub branch_exists: bool,

    /// Open PR returned by `open_pull_request_for_branch`.
    pub existing_pull: Option<PullRequestData>,

    /// Number assigned to a PR opened through `open_pull_request`.
    pub next_pr_number: u64,

    /// When set, every merge attempt fails as blocked by this label.
    pub merge_blocked_by: Option<String>,
}

impl Default for MockGitHub {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            branch_exists: false,
            existing_pull: None,
            next_pr_number: 100,
            merge_blocked_by: None,
        }
    }
}

impl MockGitHub {
    fn record(&self, line: String) {
        self.calls.lock().unwrap().push(line);
    }
}

impl GitHubApi for MockGitHub {
    async fn get_pull_request(
        &self,
        repo: &RepoId,
        number: PrNumber,
    ) -> Result<PullRequestData, GitHubApiError> {
        self.record(format!("get-pull-request {repo}#{}", number.0));
        Ok(PullRequestData {
            id: PullRequestId::new(repo.clone(), number),
            title: "Fix layout".to_string(),
            body: String::new(),
        })
    }

    async fn get_branch(
        &self,
        repo: &RepoId,
        branch: &BranchName,
    ) -> Result<Option<BranchRef>, GitHubApiError> {
        self.record(format!("get-branch {repo} {branch}"));
        Ok(self.branch_exists.then(|| BranchRef {
            repo: repo.clone(),
            name: branch.clone(),
        }))
    }

    async fn open_pull_request_for_branch(
        &self,
        repo: &RepoId,
        branch: &BranchRef,
    ) -> Result<Option<PullRequestData>, GitHubApiError> {
        self.record(format!("find-pull {repo} head={}", branch.head_ref()));
        Ok(self.existing_pull.clone())
    }

    async fn open_pull_request(
        &self,
        repo: &RepoId,
        head: &BranchRef,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<PullRequestData, GitHubApiError> {
        self.record(format!(
            "open-pull {repo} head={} title={title:?} body={body:?} labels={}",
            head.head_ref(),
            labels.join(",")
        ));
        Ok(PullRequestData {
            id: PullRequestId::new(repo.clone(), self.next_pr_number),
            title: title.to_string(),
            body: body.to_string(),
        })
    }

    async fn update_pull_request(
        &self,
        pr: &PullRequestId,
        update: PullRequestUpdate,
    ) -> Result<PullRequestData, GitHubApiError> {
        let fields = serde_json::to_string(&update).unwrap();
        self.record(format!("update {pr} {fields}"));
        Ok(PullRequestData {
            id: pr.clone(),
            title: update.title.unwrap_or_default(),
            body: update.body.unwrap_or_default(),
        })
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequestId,
        blocking_labels: &[String],
    ) -> Result<(), GitHubApiError> {
        self.record(format!("merge {pr} unless={}", blocking_labels.join(",")));
        match &self.merge_blocked_by {
            Some(label) => Err(GitHubApiError::MergeBlocked {
                pr: pr.clone(),
                label: label.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn post_comment(&self, pr: &PullRequestId, text: &str) -> Result<(), GitHubApiError> {
        self.record(format!("comment {pr}: {text}"));
        Ok(())
    }
}

/// A recording local-VCS double.
#[derive(Debug, Default)]
pub struct MockVcs {
    pub calls: Mutex<Vec<String>>,

    /// Result of the upstreamability probe.
    pub upstreamable: bool,

    /// When set, branch building fails the way a rejected patch does.
    pub fail_apply: bool,
}

impl MockVcs {
    fn record(&self, line: String) {
        self.calls.lock().unwrap().push(line);
    }
}

impl LocalVcs for MockVcs {
    fn has_upstreamable_changes(&self, commit_count: u64) -> GitResult<bool> {
        self.record(format!("probe -{commit_count}"));
        Ok(self.upstreamable)
    }

    fn upstreamable_commits(&self, commit_count: u64) -> GitResult<Vec<ExportCommit>> {
        self.record(format!("extract -{commit_count}"));
        Ok(vec![ExportCommit {
            author: "A U Thor <author@example.com>".to_string(),
            message: "change layout".to_string(),
            diff: b"diff --git a/file b/file\n".to_vec(),
        }])
    }

    fn create_or_update_branch(
        &self,
        commits: &[ExportCommit],
        branch: &BranchName,
    ) -> GitResult<()> {
        self.record(format!("build-branch {branch} commits={}", commits.len()));
        if self.fail_apply {
            return Err(GitError::CommandFailed {
                command: "git apply".to_string(),
                stderr: "error: patch does not apply".to_string(),
            });
        }
        Ok(())
    }

    fn remove_branch(&self, branch: &BranchName) -> GitResult<()> {
        self.record(format!("remove-branch {branch}"));
        Ok(())
    }
}
