//! One-way synchronization of upstreamable pull-request changes.
//!
//! This library mirrors changes from pull requests in a downstream repository
//! into pull requests against an upstream repository. Each webhook delivery is
//! mapped, through the live remote state, to an ordered queue of idempotent
//! remote operations ([`steps::Step`]) that the run queue executes in order.

pub mod config;
pub mod engine;
pub mod events;
pub mod git;
pub mod github;
pub mod run;
pub mod steps;
pub mod text;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
