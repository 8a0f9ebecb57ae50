//! Entry point: processes the single webhook delivery carried by the
//! `GITHUB_CONTEXT` environment variable, then exits.
//!
//! Exit contract: 0 when the delivery was processed (including no-op
//! deliveries), 1 on any failure. Failures are logged with the full payload
//! before exiting so the delivery can be replayed offline.

use std::process::ExitCode;

use serde_json::Value;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upstream_sync::config::SyncConfig;
use upstream_sync::engine::SyncEngine;
use upstream_sync::git::{CommitIdentity, LocalGitRepo, WorkingCopies};
use upstream_sync::github::GitHubClient;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let payload = match read_event_payload() {
        Ok(payload) => payload,
        Err(error) => {
            error!(%error, "could not read the triggering event");
            return ExitCode::FAILURE;
        }
    };

    let octocrab = octocrab::Octocrab::builder()
        .base_uri(config.github_api_url.as_str())
        .and_then(|builder| {
            builder
                .personal_token(config.github_api_token.clone())
                .build()
        });
    let octocrab = match octocrab {
        Ok(octocrab) => octocrab,
        Err(error) => {
            error!(%error, "could not construct the GitHub client");
            return ExitCode::FAILURE;
        }
    };
    let api = GitHubClient::new(octocrab, config.upstream_default_branch.clone());

    let identity = CommitIdentity {
        name: config.github_name.clone(),
        email: config.github_email.clone(),
    };
    let vcs = WorkingCopies::new(
        LocalGitRepo::new(&config.downstream_path, identity.clone()),
        LocalGitRepo::new(&config.upstream_path, identity),
        config.upstream_fork.clone(),
        config.upstream_default_branch.clone(),
        config.github_username.clone(),
        config.github_api_token.clone(),
        config.suppress_force_push,
    );

    let engine = SyncEngine::new(config, api, vcs);
    match engine.run(&payload).await {
        Ok(()) => ExitCode::SUCCESS,
        // Already logged with full payload context by the engine.
        Err(_) => ExitCode::FAILURE,
    }
}

/// Extracts the webhook event from the `GITHUB_CONTEXT` JSON blob that
/// GitHub Actions exposes to workflow steps.
fn read_event_payload() -> Result<Value, Box<dyn std::error::Error>> {
    let raw = std::env::var("GITHUB_CONTEXT")
        .map_err(|_| "the GITHUB_CONTEXT environment variable is not set")?;
    let mut context: Value = serde_json::from_str(&raw)?;
    context
        .get_mut("event")
        .map(Value::take)
        .ok_or_else(|| "GITHUB_CONTEXT has no 'event' key".into())
}
