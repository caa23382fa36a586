//! Bootstrap inputs and their validated form.
//!
//! `BootstrapInput` is what a caller hands over (strings straight from the
//! command line and the git remote). `BootstrapRequest::from_input` turns it
//! into an immutable, validated request or fails with an
//! `InputValidationError` without touching anything remote.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use ci_platform::RepoRef;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::InputValidationError;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Deployment stage a bootstrap run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sbx,
    Dev,
    Tst,
    Stg,
    Prd,
}

impl Environment {
    pub const ALL: [Environment; 5] = [
        Environment::Sbx,
        Environment::Dev,
        Environment::Tst,
        Environment::Stg,
        Environment::Prd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sbx => "sbx",
            Environment::Dev => "dev",
            Environment::Tst => "tst",
            Environment::Stg => "stg",
            Environment::Prd => "prd",
        }
    }
}

impl FromStr for Environment {
    type Err = InputValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| InputValidationError::InvalidEnvironment(s.to_string()))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Repository URL
// ---------------------------------------------------------------------------

fn repository_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:",
            // https://, http://, ssh://, git:// with optional user and port
            r"(?:https?|ssh|git)://(?:[^@/\s]+@)?(?i:(?:www\.)?github\.com)(?::\d+)?/",
            // scp-like git@github.com:owner/repo
            r"|[^@/\s]+@(?i:(?:www\.)?github\.com):",
            // bare github.com/owner/repo
            r"|(?i:(?:www\.)?github\.com)/",
            r")",
            r"(?P<owner>[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)/",
            r"(?P<repo>[A-Za-z0-9._-]+?)",
            r"(?:\.git)?/*$",
        ))
        .unwrap_or_else(|e| panic!("repository URL pattern is invalid: {e}"))
    })
}

/// Parse a git remote URL into its `(owner, repo)` pair.
///
/// Accepts https/http/ssh/git URLs, scp-like `git@github.com:owner/repo` and a
/// bare `github.com/owner/repo`. The host must be `github.com` (optionally
/// `www.`); remotes on any other host are rejected because the deployed roles
/// trust GitHub's OIDC issuer for `owner/repo`. A trailing `.git` and trailing
/// slashes are ignored.
pub fn parse_repository_url(url: &str) -> Result<RepoRef, InputValidationError> {
    let trimmed = url.trim();
    let caps = repository_url_pattern()
        .captures(trimmed)
        .ok_or_else(|| InputValidationError::UnparsableRepositoryUrl(url.to_string()))?;

    let owner = &caps["owner"];
    let repo = &caps["repo"];
    if repo == "." || repo == ".." {
        return Err(InputValidationError::UnparsableRepositoryUrl(
            url.to_string(),
        ));
    }
    Ok(RepoRef::new(owner, repo))
}

// ---------------------------------------------------------------------------
// Input and request
// ---------------------------------------------------------------------------

/// Unvalidated inputs for one bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapInput {
    pub tenant: String,
    pub environment: String,
    /// Remote URL of the repository being bootstrapped
    pub repository_url: String,
    pub region: String,
    /// Overrides the organization prefix (defaults to the lower-cased owner)
    pub organization: Option<String>,
}

/// A validated bootstrap request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapRequest {
    organization: String,
    tenant: String,
    environment: Environment,
    github_owner: String,
    github_repo: String,
    aws_region: String,
}

impl BootstrapRequest {
    /// Validate raw inputs. Performs no I/O.
    pub fn from_input(input: &BootstrapInput) -> Result<Self, InputValidationError> {
        let environment = Environment::from_str(input.environment.trim())?;

        let tenant = input.tenant.trim();
        if tenant.is_empty() {
            return Err(InputValidationError::EmptyTenant);
        }

        let repo = parse_repository_url(&input.repository_url)?;

        let region = input.region.trim();
        if region.is_empty() {
            return Err(InputValidationError::MissingRegion);
        }

        let organization = match input.organization.as_deref().map(str::trim) {
            Some(org) if !org.is_empty() => org.to_string(),
            _ => repo.owner.to_lowercase(),
        };

        Ok(BootstrapRequest {
            organization,
            tenant: tenant.to_string(),
            environment,
            github_owner: repo.owner,
            github_repo: repo.name,
            aws_region: region.to_string(),
        })
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn github_owner(&self) -> &str {
        &self.github_owner
    }

    pub fn github_repo(&self) -> &str {
        &self.github_repo
    }

    pub fn aws_region(&self) -> &str {
        &self.aws_region
    }

    pub fn repository(&self) -> RepoRef {
        RepoRef::new(&self.github_owner, &self.github_repo)
    }
}
