//! CI platform trait definitions
//!
//! `CiPlatform` covers the handful of repository-administration calls the
//! bootstrap needs. Every operation is an upsert: calling it again with the
//! same arguments converges to the same end state without duplicating
//! anything or failing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CiError;

/// Result type for CI platform operations
pub type CiResult<T> = std::result::Result<T, CiError>;

/// Owner/name pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Deployment protection applied to an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRules {
    /// Numeric id of the team whose approval is required
    pub required_reviewer_team_id: u64,
    pub wait_timer_seconds: u32,
    /// When true, the person who triggered a run may approve it
    pub allow_self_review: bool,
}

/// Desired state of one CI environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    pub protection: Option<ProtectionRules>,
    pub variables: BTreeMap<String, String>,
}

/// Repository permission levels grantable to a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamPermission {
    Pull,
    Triage,
    Push,
    Maintain,
    Admin,
}

impl TeamPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamPermission::Pull => "pull",
            TeamPermission::Triage => "triage",
            TeamPermission::Push => "push",
            TeamPermission::Maintain => "maintain",
            TeamPermission::Admin => "admin",
        }
    }
}

/// CI platform seam.
#[async_trait]
pub trait CiPlatform: Send + Sync {
    /// Create the environment, or bring its protection rules to `spec`.
    /// Variables in `spec` are not written here.
    async fn upsert_environment(&self, repo: &RepoRef, spec: &EnvironmentSpec) -> CiResult<()>;

    /// Create or overwrite an environment-scoped variable.
    async fn set_environment_variable(
        &self,
        repo: &RepoRef,
        environment: &str,
        name: &str,
        value: &str,
    ) -> CiResult<()>;

    /// Create or overwrite a repository-scoped variable.
    async fn set_repository_variable(&self, repo: &RepoRef, name: &str, value: &str)
        -> CiResult<()>;

    /// Grant a team of the repository owner's organization access to the
    /// repository. Re-granting the same permission is a no-op.
    async fn grant_team_permission(
        &self,
        repo: &RepoRef,
        team_slug: &str,
        permission: TeamPermission,
    ) -> CiResult<()>;

    /// Resolve a team slug to its numeric id.
    async fn team_id(&self, org: &str, team_slug: &str) -> CiResult<u64>;
}
