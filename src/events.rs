//! Webhook payload parsing.
//!
//! This module parses a raw `pull_request` webhook payload into a typed
//! [`SyncEvent`]. The parser is deliberately forgiving: payloads without a
//! `pull_request` key and unknown lifecycle actions are ignored (`Ok(None)`),
//! not errors. Only malformed JSON is reported as a failure.

use serde::Deserialize;
use thiserror::Error;

use crate::types::PrNumber;

/// Error type for payload parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes wrongly-typed fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The lifecycle action that triggered a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Opened,
    Synchronize,
    Reopened,
    Edited,
    Closed,
}

/// Snapshot of the downstream pull request carried by the payload.
///
/// Immutable for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSnapshot {
    pub number: PrNumber,
    pub title: String,
    pub body: String,
    /// Number of commits on the PR, as reported by the webhook. The
    /// upstreamability diff assumes the local clone's history matches this
    /// count.
    pub commits: u64,
    pub merged: bool,
}

/// Which parts of the PR an `edited` payload reports as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditedChanges {
    pub title_changed: bool,
    pub body_changed: bool,
}

/// One triggering webhook delivery: the lifecycle action plus the downstream
/// PR snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub action: SyncAction,
    pub pull_request: PullRequestSnapshot,
    /// Present only for `edited` deliveries.
    pub changes: Option<EditedChanges>,
}

impl SyncEvent {
    /// Whether an `edited` payload actually changed the title or body.
    ///
    /// Edits that touch neither (base retargets, for instance) are ignored.
    pub fn title_or_body_changed(&self) -> bool {
        self.changes
            .is_some_and(|c| c.title_changed || c.body_changed)
    }
}

// Raw payload structures for deserialization.
//
// These match GitHub's webhook JSON structure. Optional fields are handled
// gracefully here and validated explicitly where required.

#[derive(Debug, Deserialize)]
struct RawPayload {
    action: Option<String>,
    pull_request: Option<RawPullRequest>,
    changes: Option<RawChanges>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    commits: u64,
    #[serde(default)]
    merged: bool,
}

#[derive(Debug, Deserialize)]
struct RawChanges {
    title: Option<serde_json::Value>,
    body: Option<serde_json::Value>,
}

/// Parses a webhook payload into a typed event.
///
/// Returns `Ok(None)` when the payload is not a sync trigger: no
/// `pull_request` key, no `action`, or an action outside the five lifecycle
/// actions the engine handles.
pub fn parse_event(payload: &serde_json::Value) -> Result<Option<SyncEvent>, ParseError> {
    let raw: RawPayload = serde_json::from_value(payload.clone())?;

    let Some(action) = raw.action.as_deref() else {
        return Ok(None);
    };
    let action = match action {
        "opened" => SyncAction::Opened,
        "synchronize" => SyncAction::Synchronize,
        "reopened" => SyncAction::Reopened,
        "edited" => SyncAction::Edited,
        "closed" => SyncAction::Closed,
        // Unknown actions are ignored (not an error)
        _ => return Ok(None),
    };
    let Some(pull_request) = raw.pull_request else {
        return Ok(None);
    };

    Ok(Some(SyncEvent {
        action,
        pull_request: PullRequestSnapshot {
            number: PrNumber(pull_request.number),
            title: pull_request.title.unwrap_or_default(),
            body: pull_request.body.unwrap_or_default(),
            commits: pull_request.commits,
            merged: pull_request.merged,
        },
        changes: raw.changes.map(|c| EditedChanges {
            title_changed: c.title.is_some(),
            body_changed: c.body.is_some(),
        }),
    }))
}
