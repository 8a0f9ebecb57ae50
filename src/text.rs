//! Shared constants, branch naming, and pull-request body rewriting.
//!
//! Everything here is pure: branch names are derived deterministically from
//! the downstream PR number, and body rewriting is idempotent so a body that
//! has already been rewritten passes through unchanged.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{BranchName, PrNumber, PullRequestId};

/// Path prefix (within the downstream repository) of changes that are
/// eligible for mirroring upstream.
pub const UPSTREAMABLE_PATH: &str = "upstream/";

/// Opt-out marker: a downstream PR body containing this string anywhere is
/// never synchronized.
pub const NO_SYNC_SIGNAL: &str = "[no-sync]";

/// Label identifying upstream PRs created by this tool.
pub const EXPORT_LABEL: &str = "downstream-export";

/// Label that blocks merging until a human removes it.
pub const DO_NOT_MERGE_LABEL: &str = "do not merge yet";

/// Boilerplate marker at which downstream PR template content is cut off.
pub const THANK_YOU_MARKER: &str = "<!-- Thank you for";

pub const OPENED_NEW_UPSTREAM_PR: &str =
    "🤖 Opened new upstream pull request ({upstream_pr}) with upstreamable changes.";

pub const UPDATED_EXISTING_UPSTREAM_PR: &str =
    "📝 Transplanted new upstreamable changes to existing upstream pull request ({upstream_pr}).";

pub const UPDATED_TITLE_IN_EXISTING_UPSTREAM_PR: &str =
    "✍ Updated existing upstream pull request ({upstream_pr}) title and body.";

pub const CLOSING_EXISTING_UPSTREAM_PR: &str =
    "🤖 This change no longer contains upstreamable changes; closed existing \
     upstream pull request ({upstream_pr}).";

pub const NO_UPSTREAMABLE_CHANGES_COMMENT: &str =
    "👋 Downstream pull request ({downstream_pr}) no longer contains any upstreamable \
     changes. Closing pull request without merging.";

pub const COULD_NOT_APPLY_CHANGES_DOWNSTREAM_COMMENT: &str =
    "🛠 These changes could not be applied onto the latest upstream tree. The local \
     copy of the upstream repository may be out of sync.";

pub const COULD_NOT_APPLY_CHANGES_UPSTREAM_COMMENT: &str =
    "🛠 Changes from the source pull request ({downstream_pr}) can no longer be \
     cleanly applied. Waiting for a new version of these changes downstream.";

pub const COULD_NOT_MERGE_CHANGES_DOWNSTREAM_COMMENT: &str =
    "⛔ Failed to properly merge the upstream pull request ({upstream_pr}). \
     Please address any CI issues and try to merge manually.";

pub const COULD_NOT_MERGE_CHANGES_UPSTREAM_COMMENT: &str =
    "⛔ The downstream PR has merged ({downstream_pr}), but these changes could not \
     be merged properly. Please address any CI issues and try to merge manually.";

/// Derives the upstream export branch name for a downstream PR number.
///
/// Total and injective: distinct numbers always map to distinct names, and
/// the same number always maps to the same name.
pub fn branch_name_for_pr(number: PrNumber) -> BranchName {
    BranchName::new(format!("upstream-export-{}", number.0))
}

/// Matches bare (`#123`) and repository-relative (`org/repo#123`) issue
/// references at a word boundary. The leading whitespace (or line start) is
/// captured and preserved in the replacement.
static ISSUE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^|\s)((?:[\w.-]+/)*[\w.-]*)#([1-9][0-9]*)").expect("static regex is valid")
});

/// Rewrites a downstream PR body for use in the upstream repository.
///
/// Issue references are turned into visually identical but non-linking forms
/// so the upstream PR cannot inadvertently close or link to unrelated issues,
/// and everything from the first `---` line or the template "thank you"
/// boilerplate onward is dropped.
pub fn clean_up_body_text(body: &str) -> String {
    let unlinked = ISSUE_REFERENCE.replace_all(body, "${1}${2}#<!-- nolink -->${3}");
    unlinked
        .split("\n---")
        .next()
        .unwrap_or("")
        .split(THANK_YOU_MARKER)
        .next()
        .unwrap_or("")
        .to_string()
}

/// Cleans up a body and appends the provenance footer naming the downstream
/// PR.
///
/// Idempotent: the footer starts with a `---` line, so rewriting an already
/// rewritten body truncates the old footer before appending a fresh one.
pub fn prepare_pull_request_body(body: &str, downstream_pr: &PullRequestId) -> String {
    format!(
        "{}\n---\nReviewed in {}",
        clean_up_body_text(body),
        downstream_pr
    )
}
