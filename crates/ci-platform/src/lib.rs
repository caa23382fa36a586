//! CI-Platform: GitHub Environment Configuration for tofu-bootstrap
//!
//! This crate makes the CI platform aware of a bootstrapped environment:
//! deployment environments with optional approval gates, environment and
//! repository variables, and team access to the repository.
//!
//! ## Layer 1 - CI Platform
//!
//! Focus: idempotent upserts against the GitHub REST API.

mod ci_traits;
mod error;
pub mod fakes;
mod github;

pub use ci_traits::{
    CiPlatform, CiResult, EnvironmentSpec, ProtectionRules, RepoRef, TeamPermission,
};
pub use error::CiError;
pub use github::{GitHubClient, GitHubConfig};
