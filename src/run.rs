//! The run queue: ordered execution of the steps for one triggering event.
//!
//! A [`SyncRun`] owns the downstream PR identity, the linked upstream PR (if
//! one exists, or once one is opened mid-run), and a FIFO queue of
//! [`Step`]s. Execution is strictly sequential and not transactional: a
//! failed step aborts the rest of the queue, and already-performed remote
//! side effects stay in place. The next delivery re-derives the intended
//! state from live remote state and continues from wherever this run stopped.
//!
//! Two failure classes are absorbed instead of aborting: a change set that no
//! longer applies to the upstream tree, and a merge the remote refuses. Both
//! replace the remaining queue with notification comments so a human can
//! intervene, and the run still counts as successful.

use std::collections::VecDeque;

use tracing::{error, info};

use crate::engine::SyncError;
use crate::git::LocalVcs;
use crate::github::{BranchRef, GitHubApi, PullRequestData, PullRequestUpdate};
use crate::steps::{Deferred, Step};
use crate::text::{
    COULD_NOT_APPLY_CHANGES_DOWNSTREAM_COMMENT, COULD_NOT_APPLY_CHANGES_UPSTREAM_COMMENT,
    COULD_NOT_MERGE_CHANGES_DOWNSTREAM_COMMENT, COULD_NOT_MERGE_CHANGES_UPSTREAM_COMMENT,
    branch_name_for_pr, prepare_pull_request_body,
};
use crate::types::{PullRequestId, RepoId};

/// Collaborators shared by every step of a run.
pub struct SyncContext<'a, G, V> {
    pub api: &'a G,
    pub vcs: &'a V,

    /// Repository that upstream pull requests are opened against.
    pub upstream_repo: &'a RepoId,

    /// The sync account's fork, where export branches live.
    pub fork_repo: &'a RepoId,
}

/// One run: the PR pair plus the ordered queue of steps to perform.
pub struct SyncRun {
    /// The downstream PR this delivery is about.
    pub downstream_pr: PullRequestId,

    /// The upstream PR linked to the downstream one, if known. Updated
    /// in-flight when a run opens a new one.
    pub upstream_pr: Option<PullRequestData>,

    steps: VecDeque<Step>,
}

impl SyncRun {
    pub fn new(downstream_pr: PullRequestId, upstream_pr: Option<PullRequestData>) -> Self {
        Self {
            downstream_pr,
            upstream_pr,
            steps: VecDeque::new(),
        }
    }

    /// Appends a step to the queue, returning the forward reference to the
    /// value it will produce, if it produces one.
    pub fn add_step(&mut self, step: Step) -> Option<Deferred<BranchRef>> {
        let provided = step.provides();
        self.steps.push_back(step);
        provided
    }

    /// The queued steps, front of the queue first.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Renders a comment template against this run's PR pair.
    ///
    /// `{upstream_pr}` renders as the empty string when no upstream PR is
    /// involved; the decision engine only enqueues templates mentioning it
    /// when one exists or will be opened earlier in the same run.
    pub fn make_comment(&self, template: &str) -> String {
        let upstream = self
            .upstream_pr
            .as_ref()
            .map(|pr| pr.id.to_string())
            .unwrap_or_default();
        template
            .replace("{upstream_pr}", &upstream)
            .replace("{downstream_pr}", &self.downstream_pr.to_string())
    }

    /// Executes the queued steps in order, invoking `observer` after each
    /// completed step.
    pub async fn execute<G: GitHubApi, V: LocalVcs>(
        mut self,
        ctx: &SyncContext<'_, G, V>,
        observer: &mut dyn FnMut(&Step),
    ) -> Result<(), SyncError> {
        while let Some(step) = self.steps.pop_front() {
            info!(step = %step, pr = %self.downstream_pr, "running step");
            self.execute_step(&step, ctx).await?;
            observer(&step);
        }
        Ok(())
    }

    async fn execute_step<G: GitHubApi, V: LocalVcs>(
        &mut self,
        step: &Step,
        ctx: &SyncContext<'_, G, V>,
    ) -> Result<(), SyncError> {
        match step {
            Step::ChangePullRequest {
                pr,
                state,
                title,
                body,
            } => {
                let update = PullRequestUpdate {
                    state: Some(*state),
                    title: title.clone(),
                    body: body
                        .as_deref()
                        .map(|body| prepare_pull_request_body(body, &self.downstream_pr)),
                };
                ctx.api.update_pull_request(pr, update).await?;
                Ok(())
            }

            Step::CreateOrUpdateBranch {
                downstream_pr,
                commit_count,
                branch,
            } => {
                let name = branch_name_for_pr(downstream_pr.number);
                let built = ctx
                    .vcs
                    .upstreamable_commits(*commit_count)
                    .and_then(|commits| ctx.vcs.create_or_update_branch(&commits, &name));
                match built {
                    Ok(()) => {
                        branch.resolve(BranchRef {
                            repo: ctx.fork_repo.clone(),
                            name,
                        });
                        Ok(())
                    }
                    Err(error) => {
                        error!(
                            %error,
                            pr = %self.downstream_pr,
                            "change set no longer applies; notifying instead"
                        );
                        self.steps.clear();
                        let downstream = self.downstream_pr.clone();
                        self.add_step(Step::Comment {
                            pr: downstream,
                            template: COULD_NOT_APPLY_CHANGES_DOWNSTREAM_COMMENT,
                        });
                        if let Some(upstream) = self.upstream_pr.as_ref().map(|pr| pr.id.clone()) {
                            self.add_step(Step::Comment {
                                pr: upstream,
                                template: COULD_NOT_APPLY_CHANGES_UPSTREAM_COMMENT,
                            });
                        }
                        Ok(())
                    }
                }
            }

            Step::OpenPullRequest {
                head,
                title,
                body,
                labels,
            } => {
                let head = head.value()?.clone();
                let body = prepare_pull_request_body(body, &self.downstream_pr);
                let pull = ctx
                    .api
                    .open_pull_request(ctx.upstream_repo, &head, title, &body, labels)
                    .await?;
                info!(upstream_pr = %pull.id, "opened upstream pull request");
                self.upstream_pr = Some(pull);
                Ok(())
            }

            Step::MergePullRequest {
                pr,
                blocking_labels,
            } => match ctx.api.merge_pull_request(pr, blocking_labels).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    error!(%error, pr = %pr, "could not merge upstream pull request");
                    self.steps.clear();
                    let upstream = pr.clone();
                    self.add_step(Step::Comment {
                        pr: upstream,
                        template: COULD_NOT_MERGE_CHANGES_UPSTREAM_COMMENT,
                    });
                    let downstream = self.downstream_pr.clone();
                    self.add_step(Step::Comment {
                        pr: downstream,
                        template: COULD_NOT_MERGE_CHANGES_DOWNSTREAM_COMMENT,
                    });
                    Ok(())
                }
            },

            Step::Comment { pr, template } => {
                let text = self.make_comment(template);
                ctx.api.post_comment(pr, &text).await?;
                Ok(())
            }

            Step::RemoveBranch { branch } => {
                ctx.vcs.remove_branch(branch)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::PullRequestState;
    use crate::steps::StepError;
    use crate::test_utils::{MockGitHub, MockVcs};
    use crate::text::{
        DO_NOT_MERGE_LABEL, EXPORT_LABEL, OPENED_NEW_UPSTREAM_PR, UPDATED_EXISTING_UPSTREAM_PR,
    };
    use crate::types::{BranchName, RepoId};

    fn downstream_pr() -> PullRequestId {
        PullRequestId::new(RepoId::new("downstream", "repo"), 45u64)
    }

    fn upstream_repo() -> RepoId {
        RepoId::new("upstream", "repo")
    }

    fn fork_repo() -> RepoId {
        RepoId::new("sync-bot", "repo")
    }

    fn linked_pull() -> PullRequestData {
        PullRequestData {
            id: PullRequestId::new(upstream_repo(), 100u64),
            title: "Fix layout".to_string(),
            body: String::new(),
        }
    }

    async fn execute(run: SyncRun, api: &MockGitHub, vcs: &MockVcs) -> Vec<&'static str> {
        let upstream = upstream_repo();
        let fork = fork_repo();
        let ctx = SyncContext {
            api,
            vcs,
            upstream_repo: &upstream,
            fork_repo: &fork,
        };
        let mut seen = Vec::new();
        run.execute(&ctx, &mut |step| seen.push(step.name()))
            .await
            .unwrap();
        seen
    }

    #[test]
    fn comment_rendering_fills_both_placeholders() {
        let run = SyncRun::new(downstream_pr(), Some(linked_pull()));
        assert_eq!(
            run.make_comment("up {upstream_pr} down {downstream_pr}"),
            "up upstream/repo#100 down downstream/repo#45"
        );

        let unlinked = SyncRun::new(downstream_pr(), None);
        assert_eq!(unlinked.make_comment("up {upstream_pr}"), "up ");
    }

    #[tokio::test]
    async fn opens_pull_request_from_freshly_built_branch() {
        let api = MockGitHub::default();
        let vcs = MockVcs::default();

        let mut run = SyncRun::new(downstream_pr(), None);
        let head = run
            .add_step(Step::CreateOrUpdateBranch {
                downstream_pr: downstream_pr(),
                commit_count: 2,
                branch: Deferred::new(),
            })
            .unwrap();
        run.add_step(Step::OpenPullRequest {
            head,
            title: "Fix layout".to_string(),
            body: "Fixes #12".to_string(),
            labels: vec![EXPORT_LABEL.to_string(), DO_NOT_MERGE_LABEL.to_string()],
        });
        run.add_step(Step::Comment {
            pr: downstream_pr(),
            template: OPENED_NEW_UPSTREAM_PR,
        });

        let seen = execute(run, &api, &vcs).await;
        assert_eq!(seen, ["create-or-update-branch", "open-pull-request", "comment"]);

        let calls = api.calls.lock().unwrap();
        // The PR head is the branch built moments earlier, on the fork.
        assert!(calls[0].contains("open-pull upstream/repo head=sync-bot:upstream-export-45"));
        assert!(calls[0].contains("downstream-export"));
        // Body was rewritten: reference unlinked, provenance footer appended.
        assert!(calls[0].contains("#<!-- nolink -->12"));
        assert!(calls[0].contains("Reviewed in downstream/repo#45"));
        // The comment names the PR opened mid-run.
        assert!(calls[1].starts_with("comment downstream/repo#45"));
        assert!(calls[1].contains("upstream/repo#100"));
    }

    #[tokio::test]
    async fn change_pull_request_rewrites_the_body() {
        let api = MockGitHub::default();
        let vcs = MockVcs::default();

        let mut run = SyncRun::new(downstream_pr(), Some(linked_pull()));
        run.add_step(Step::ChangePullRequest {
            pr: linked_pull().id,
            state: PullRequestState::Open,
            title: Some("Fix layout".to_string()),
            body: Some("Fixes #12".to_string()),
        });

        execute(run, &api, &vcs).await;
        let calls = api.calls.lock().unwrap();
        assert!(calls[0].starts_with("update upstream/repo#100"));
        assert!(calls[0].contains("#<!-- nolink -->12"));
        assert!(calls[0].contains("Reviewed in downstream/repo#45"));
    }

    #[tokio::test]
    async fn apply_failure_notifies_both_pull_requests() {
        let api = MockGitHub::default();
        let vcs = MockVcs {
            fail_apply: true,
            ..Default::default()
        };

        let mut run = SyncRun::new(downstream_pr(), Some(linked_pull()));
        run.add_step(Step::CreateOrUpdateBranch {
            downstream_pr: downstream_pr(),
            commit_count: 2,
            branch: Deferred::new(),
        });
        run.add_step(Step::Comment {
            pr: downstream_pr(),
            template: UPDATED_EXISTING_UPSTREAM_PR,
        });

        let seen = execute(run, &api, &vcs).await;
        // The queued "updated" comment is replaced by the failure pair.
        assert_eq!(seen, ["create-or-update-branch", "comment", "comment"]);

        let calls = api.calls.lock().unwrap();
        assert!(calls[0].starts_with("comment downstream/repo#45"));
        assert!(calls[0].contains("could not be applied"));
        assert!(calls[1].starts_with("comment upstream/repo#100"));
        assert!(calls[1].contains("downstream/repo#45"));
    }

    #[tokio::test]
    async fn merge_failure_replaces_queue_with_notifications() {
        let api = MockGitHub {
            merge_blocked_by: Some(DO_NOT_MERGE_LABEL.to_string()),
            ..Default::default()
        };
        let vcs = MockVcs::default();

        let mut run = SyncRun::new(downstream_pr(), Some(linked_pull()));
        run.add_step(Step::MergePullRequest {
            pr: linked_pull().id,
            blocking_labels: vec![DO_NOT_MERGE_LABEL.to_string()],
        });
        run.add_step(Step::RemoveBranch {
            branch: BranchName::new("upstream-export-45"),
        });

        let seen = execute(run, &api, &vcs).await;
        assert_eq!(seen, ["merge-pull-request", "comment", "comment"]);

        let calls = api.calls.lock().unwrap();
        assert!(calls[1].starts_with("comment upstream/repo#100"));
        assert!(calls[2].starts_with("comment downstream/repo#45"));
        // The export branch survives a failed merge so a human can retry.
        assert!(vcs.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn opening_without_a_built_branch_fails_fast() {
        let api = MockGitHub::default();
        let vcs = MockVcs::default();

        let mut run = SyncRun::new(downstream_pr(), None);
        run.add_step(Step::OpenPullRequest {
            head: Deferred::new(),
            title: "Fix layout".to_string(),
            body: String::new(),
            labels: Vec::new(),
        });

        let upstream = upstream_repo();
        let fork = fork_repo();
        let ctx = SyncContext {
            api: &api,
            vcs: &vcs,
            upstream_repo: &upstream,
            fork_repo: &fork,
        };
        let err = run.execute(&ctx, &mut |_| {}).await.unwrap_err();
        assert!(matches!(err, SyncError::Step(StepError::Unresolved)));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_branch_reaches_the_vcs() {
        let api = MockGitHub::default();
        let vcs = MockVcs::default();

        let mut run = SyncRun::new(downstream_pr(), None);
        run.add_step(Step::RemoveBranch {
            branch: BranchName::new("upstream-export-45"),
        });

        let seen = execute(run, &api, &vcs).await;
        assert_eq!(seen, ["remove-branch"]);
        assert_eq!(
            *vcs.calls.lock().unwrap(),
            ["remove-branch upstream-export-45"]
        );
    }
}
