//! Core domain types for the sync engine.
//!
//! This module contains the fundamental identifier types used throughout the
//! crate, designed to prevent accidental mixing of different kinds of values.

pub mod ids;

// Re-export commonly used types at the module level
pub use ids::{BranchName, InvalidRepoId, PrNumber, PullRequestId, RepoId, Sha};
