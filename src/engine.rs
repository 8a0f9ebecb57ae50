//! Decision engine: maps one webhook delivery to an ordered queue of steps.
//!
//! [`decide`] is the pure heart of the crate: given the parsed event, the
//! pre-derived upstream link, and the upstreamability probe result, it fills
//! the run's queue from a fixed policy. Everything with a side effect (the
//! link derivation, the probe, the step execution) lives in
//! [`SyncEngine::run`], which is the per-delivery orchestrator.

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::events::{self, ParseError, SyncAction, SyncEvent};
use crate::git::{GitError, LocalVcs};
use crate::github::{GitHubApi, GitHubApiError, PullRequestState};
use crate::run::{SyncContext, SyncRun};
use crate::steps::{Deferred, Step, StepError};
use crate::text::{
    CLOSING_EXISTING_UPSTREAM_PR, DO_NOT_MERGE_LABEL, EXPORT_LABEL, NO_SYNC_SIGNAL,
    NO_UPSTREAMABLE_CHANGES_COMMENT, OPENED_NEW_UPSTREAM_PR, UPDATED_EXISTING_UPSTREAM_PR,
    UPDATED_TITLE_IN_EXISTING_UPSTREAM_PR, branch_name_for_pr,
};

/// Any failure that can abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    GitHub(#[from] GitHubApiError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// Fills the run's queue according to the policy table.
///
/// Pure with respect to local state: the decision depends only on the event,
/// the link already stored on `run`, and the `is_upstreamable` probe result.
/// No side effect happens until the run is executed.
pub fn decide(run: &mut SyncRun, event: &SyncEvent, is_upstreamable: bool) {
    if event.pull_request.body.contains(NO_SYNC_SIGNAL) {
        return;
    }

    match event.action {
        SyncAction::Opened | SyncAction::Synchronize | SyncAction::Reopened => {
            handle_new_pull_request_contents(run, event, is_upstreamable);
        }
        SyncAction::Edited => handle_edited_pull_request(run, event),
        SyncAction::Closed => handle_closed_pull_request(run, event),
    }
}

fn handle_new_pull_request_contents(run: &mut SyncRun, event: &SyncEvent, is_upstreamable: bool) {
    let downstream_pr = run.downstream_pr.clone();
    let upstream_pr = run.upstream_pr.as_ref().map(|pr| pr.id.clone());

    match (upstream_pr, is_upstreamable) {
        // The downstream PR still has upstreamable changes: refresh the
        // linked PR's contents and rebuild the export branch beneath it.
        // Reopening covers the case where the upstream PR was closed while
        // the downstream one was.
        (Some(upstream_pr), true) => {
            run.add_step(Step::ChangePullRequest {
                pr: upstream_pr,
                state: PullRequestState::Open,
                title: Some(event.pull_request.title.clone()),
                body: Some(event.pull_request.body.clone()),
            });
            run.add_step(Step::CreateOrUpdateBranch {
                downstream_pr: downstream_pr.clone(),
                commit_count: event.pull_request.commits,
                branch: Deferred::new(),
            });
            run.add_step(Step::Comment {
                pr: downstream_pr,
                template: UPDATED_EXISTING_UPSTREAM_PR,
            });
        }

        // The linked PR no longer corresponds to anything upstreamable:
        // close it out and clean up the export branch.
        (Some(upstream_pr), false) => {
            run.add_step(Step::Comment {
                pr: upstream_pr.clone(),
                template: NO_UPSTREAMABLE_CHANGES_COMMENT,
            });
            run.add_step(Step::ChangePullRequest {
                pr: upstream_pr,
                state: PullRequestState::Closed,
                title: None,
                body: None,
            });
            run.add_step(Step::RemoveBranch {
                branch: branch_name_for_pr(downstream_pr.number),
            });
            run.add_step(Step::Comment {
                pr: downstream_pr,
                template: CLOSING_EXISTING_UPSTREAM_PR,
            });
        }

        // First upstreamable contents for this downstream PR: build the
        // export branch and open a fresh upstream PR from it.
        (None, true) => {
            if let Some(head) = run.add_step(Step::CreateOrUpdateBranch {
                downstream_pr: downstream_pr.clone(),
                commit_count: event.pull_request.commits,
                branch: Deferred::new(),
            }) {
                run.add_step(Step::OpenPullRequest {
                    head,
                    title: event.pull_request.title.clone(),
                    body: event.pull_request.body.clone(),
                    labels: vec![EXPORT_LABEL.to_string(), DO_NOT_MERGE_LABEL.to_string()],
                });
                run.add_step(Step::Comment {
                    pr: downstream_pr,
                    template: OPENED_NEW_UPSTREAM_PR,
                });
            }
        }

        (None, false) => {}
    }
}

fn handle_edited_pull_request(run: &mut SyncRun, event: &SyncEvent) {
    if !event.title_or_body_changed() {
        return;
    }
    let Some(upstream_pr) = run.upstream_pr.as_ref().map(|pr| pr.id.clone()) else {
        return;
    };

    run.add_step(Step::ChangePullRequest {
        pr: upstream_pr,
        state: PullRequestState::Open,
        title: Some(event.pull_request.title.clone()),
        body: Some(event.pull_request.body.clone()),
    });
    let downstream_pr = run.downstream_pr.clone();
    run.add_step(Step::Comment {
        pr: downstream_pr,
        template: UPDATED_TITLE_IN_EXISTING_UPSTREAM_PR,
    });
}

fn handle_closed_pull_request(run: &mut SyncRun, event: &SyncEvent) {
    let Some(upstream_pr) = run.upstream_pr.as_ref().map(|pr| pr.id.clone()) else {
        return;
    };

    if event.pull_request.merged {
        run.add_step(Step::MergePullRequest {
            pr: upstream_pr,
            blocking_labels: vec![DO_NOT_MERGE_LABEL.to_string()],
        });
    } else {
        run.add_step(Step::ChangePullRequest {
            pr: upstream_pr,
            state: PullRequestState::Closed,
            title: None,
            body: None,
        });
    }
    let branch = branch_name_for_pr(run.downstream_pr.number);
    run.add_step(Step::RemoveBranch { branch });
}

/// Per-delivery orchestrator: parses the payload, derives the upstream link
/// from live remote state, consults [`decide`], and executes the resulting
/// run.
pub struct SyncEngine<G, V> {
    config: SyncConfig,
    api: G,
    vcs: V,
}

impl<G: GitHubApi, V: LocalVcs> SyncEngine<G, V> {
    pub fn new(config: SyncConfig, api: G, vcs: V) -> Self {
        Self { config, api, vcs }
    }

    /// Processes one webhook delivery.
    pub async fn run(&self, payload: &Value) -> Result<(), SyncError> {
        self.run_with_observer(payload, &mut |_| {}).await
    }

    /// Like [`SyncEngine::run`], invoking `observer` after each completed
    /// step.
    pub async fn run_with_observer(
        &self,
        payload: &Value,
        observer: &mut dyn FnMut(&Step),
    ) -> Result<(), SyncError> {
        match self.process(payload, observer).await {
            Ok(()) => Ok(()),
            Err(error) => {
                // Log the full payload so the delivery can be replayed
                // offline.
                error!(%error, payload = %payload, "sync run failed");
                Err(error)
            }
        }
    }

    async fn process(
        &self,
        payload: &Value,
        observer: &mut dyn FnMut(&Step),
    ) -> Result<(), SyncError> {
        let Some(event) = events::parse_event(payload)? else {
            info!("payload is not a sync trigger; ignoring");
            return Ok(());
        };
        info!(
            action = ?event.action,
            pr = %event.pull_request.number,
            "processing delivery"
        );

        if event.pull_request.body.contains(NO_SYNC_SIGNAL) {
            info!(pr = %event.pull_request.number, "opt-out marker present; skipping");
            return Ok(());
        }
        if event.action == SyncAction::Edited && !event.title_or_body_changed() {
            info!(pr = %event.pull_request.number, "edit changed neither title nor body; skipping");
            return Ok(());
        }

        let downstream = self
            .api
            .get_pull_request(&self.config.downstream_repo, event.pull_request.number)
            .await?;

        // The link is re-derived from live remote state on every delivery;
        // nothing is persisted between runs.
        let branch_name = branch_name_for_pr(event.pull_request.number);
        let branch = self
            .api
            .get_branch(&self.config.upstream_fork, &branch_name)
            .await?;
        let upstream_pr = match &branch {
            Some(branch) => {
                self.api
                    .open_pull_request_for_branch(&self.config.upstream_repo, branch)
                    .await?
            }
            None => None,
        };
        if let Some(upstream) = &upstream_pr {
            info!(upstream_pr = %upstream.id, "found existing upstream pull request");
        }

        let is_upstreamable = match event.action {
            SyncAction::Opened | SyncAction::Synchronize | SyncAction::Reopened => self
                .vcs
                .has_upstreamable_changes(event.pull_request.commits)?,
            SyncAction::Edited | SyncAction::Closed => false,
        };

        let mut run = SyncRun::new(downstream.id, upstream_pr);
        decide(&mut run, &event, is_upstreamable);

        let ctx = SyncContext {
            api: &self.api,
            vcs: &self.vcs,
            upstream_repo: &self.config.upstream_repo,
            fork_repo: &self.config.upstream_fork,
        };
        run.execute(&ctx, observer).await
    }
}
