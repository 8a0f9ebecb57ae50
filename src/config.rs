//! Runtime configuration, read once at startup from the environment.
//!
//! All knobs live here rather than in ambient process state, including the
//! default logging filter, so the orchestrator can be constructed with an
//! explicit configuration value in tests.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{InvalidRepoId, RepoId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}")]
    InvalidRepo {
        var: &'static str,
        #[source]
        source: InvalidRepoId,
    },
}

/// Everything the sync engine needs to know about its surroundings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Repository whose pull requests trigger synchronization.
    pub downstream_repo: RepoId,

    /// Repository that receives the mirrored pull requests.
    pub upstream_repo: RepoId,

    /// The sync account's fork of the upstream repository; export branches
    /// are pushed here.
    pub upstream_fork: RepoId,

    /// Local clone of the downstream repository, already checked out at the
    /// PR head.
    pub downstream_path: PathBuf,

    /// Local clone of the upstream repository.
    pub upstream_path: PathBuf,

    pub github_api_token: String,
    pub github_api_url: String,
    pub github_username: String,
    pub github_email: String,
    pub github_name: String,

    /// Base branch that newly opened upstream pull requests target.
    pub upstream_default_branch: String,

    /// Skips all network pushes; used for dry runs.
    pub suppress_force_push: bool,

    /// Default `tracing` filter, overridable with `RUST_LOG`.
    pub log_filter: String,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SyncConfig {
            downstream_repo: repo_var("SYNC_DOWNSTREAM_REPO")?,
            upstream_repo: repo_var("SYNC_UPSTREAM_REPO")?,
            upstream_fork: repo_var("SYNC_UPSTREAM_FORK")?,
            downstream_path: PathBuf::from(required("SYNC_DOWNSTREAM_PATH")?),
            upstream_path: PathBuf::from(required("SYNC_UPSTREAM_PATH")?),
            github_api_token: required("SYNC_GITHUB_API_TOKEN")?,
            github_api_url: optional("SYNC_GITHUB_API_URL", "https://api.github.com"),
            github_username: required("SYNC_GITHUB_USERNAME")?,
            github_email: required("SYNC_GITHUB_EMAIL")?,
            github_name: required("SYNC_GITHUB_NAME")?,
            upstream_default_branch: optional("SYNC_UPSTREAM_DEFAULT_BRANCH", "main"),
            suppress_force_push: parse_flag(env::var("SYNC_SUPPRESS_FORCE_PUSH").ok().as_deref()),
            log_filter: optional("SYNC_LOG_FILTER", "upstream_sync=info"),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn optional(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn repo_var(var: &'static str) -> Result<RepoId, ConfigError> {
    required(var)?
        .parse()
        .map_err(|source| ConfigError::InvalidRepo { var, source })
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing() {
        assert!(!parse_flag(None));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(Some("FALSE")));
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("true")));
    }
}
