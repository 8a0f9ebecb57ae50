//! GitHub API error types.
//!
//! Remote failures abort the run and surface to the caller; nothing is
//! retried automatically. The one piece of classification the core needs is
//! "does this branch/PR exist", which requires recognizing HTTP 404 in
//! octocrab errors.

use thiserror::Error;

use crate::types::PullRequestId;

/// A GitHub API error.
#[derive(Debug, Error)]
pub enum GitHubApiError {
    /// A remote call failed.
    #[error("GitHub API error: {message}")]
    Api {
        /// The HTTP status code, if it could be determined.
        status_code: Option<u16>,
        message: String,
        #[source]
        source: octocrab::Error,
    },

    /// A merge was refused because a blocking label is still present.
    #[error("merge of {pr} blocked by label '{label}'")]
    MergeBlocked { pr: PullRequestId, label: String },

    /// The merge endpoint reported the merge did not happen.
    #[error("merge of {pr} was rejected: {message}")]
    MergeRejected { pr: PullRequestId, message: String },
}

impl GitHubApiError {
    /// Wraps an octocrab error, extracting the HTTP status where possible.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let message = err.to_string();
        GitHubApiError::Api {
            status_code: extract_status_code(&message),
            message,
            source: err,
        }
    }

    /// Whether this error indicates the requested resource does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            GitHubApiError::Api {
                status_code,
                message,
                ..
            } => {
                *status_code == Some(404)
                    || (message.contains("404") && message.to_lowercase().contains("not found"))
            }
            _ => false,
        }
    }
}

/// Extracts the HTTP status code from an octocrab error message, if present.
///
/// octocrab does not expose a stable accessor for HTTP status codes across
/// all of its error variants, so this falls back to well-established message
/// patterns. Returning `None` is always safe; it only means a 404 is treated
/// like any other failure.
fn extract_status_code(message: &str) -> Option<u16> {
    // octocrab formats GitHub errors with "status: <code>" in some variants
    if let Some(idx) = message.find("status: ") {
        let rest = &message[idx + 8..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }

    let lower = message.to_lowercase();
    if message.contains("404") && lower.contains("not found") {
        return Some(404);
    }
    for code in [401u16, 403, 409, 422, 429, 500, 502, 503] {
        if message.contains(&code.to_string()) {
            return Some(code);
        }
    }

    None
}
