//! GitHub REST API client
//!
//! Implements `CiPlatform` against the GitHub REST API (v2022-11-28).
//! Environments are written with `PUT` (create-or-update), variables with a
//! `PATCH` that falls back to `POST` when the variable does not exist yet.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::ci_traits::*;
use crate::error::CiError;

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

/// GitHub client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL (GitHub Enterprise Server uses `https://host/api/v3`)
    pub api_url: String,
    /// Token with `repo` and `read:org` scope (or the fine-grained equivalent)
    #[serde(skip_serializing)]
    pub token: String,
    pub user_agent: String,
}

impl GitHubConfig {
    /// Create config for the public GitHub API
    pub fn new(token: &str) -> Self {
        GitHubConfig {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.to_string(),
            user_agent: format!("tofu-bootstrap/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Create config from environment variables
    ///
    /// Reads:
    /// - GITHUB_TOKEN (required)
    /// - GITHUB_API_URL (optional, default: "https://api.github.com")
    pub fn from_env() -> Result<Self, CiError> {
        let token = std::env::var("GITHUB_TOKEN")
            .map_err(|_| CiError::Config("GITHUB_TOKEN not set".to_string()))?;
        let config = Self::new(&token);
        match std::env::var("GITHUB_API_URL") {
            Ok(url) => Ok(config.with_api_url(&url)),
            Err(_) => Ok(config),
        }
    }

    /// Point the client at a different API base URL
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }
}

/// GitHub REST client
pub struct GitHubClient {
    config: GitHubConfig,
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct TeamResponse {
    id: u64,
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: GitHubConfig) -> Result<Self, CiError> {
        if config.token.trim().is_empty() {
            return Err(CiError::Config("GitHub token is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| CiError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(GitHubClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, CiError> {
        Self::new(GitHubConfig::from_env()?)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.config.api_url, path))
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request and map any non-success status to `CiError::Status`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> CiResult<reqwest::Response> {
        let mut builder = self.request(method.clone(), path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(method = %method, path = %path, status = status.as_u16(), "github request");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(CiError::Status {
            method: method.to_string(),
            path: path.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// PATCH an existing variable; on 404 create it with POST.
    async fn upsert_variable(
        &self,
        collection_path: &str,
        name: &str,
        value: &str,
    ) -> CiResult<()> {
        let body = json!({ "name": name, "value": value });
        let item_path = format!("{collection_path}/{name}");

        match self
            .send(Method::PATCH, &item_path, Some(body.clone()))
            .await
        {
            Ok(_) => {
                debug!(variable = %name, "variable updated");
                Ok(())
            }
            Err(CiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                self.send(Method::POST, collection_path, Some(body)).await?;
                info!(variable = %name, "variable created");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }
}

fn environment_body(spec: &EnvironmentSpec) -> serde_json::Value {
    match &spec.protection {
        Some(rules) => json!({
            "wait_timer": rules.wait_timer_seconds,
            "prevent_self_review": !rules.allow_self_review,
            "reviewers": [
                { "type": "Team", "id": rules.required_reviewer_team_id }
            ],
        }),
        None => json!({}),
    }
}

#[async_trait]
impl CiPlatform for GitHubClient {
    async fn upsert_environment(&self, repo: &RepoRef, spec: &EnvironmentSpec) -> CiResult<()> {
        let path = format!(
            "/repos/{}/{}/environments/{}",
            repo.owner, repo.name, spec.name
        );
        self.send(Method::PUT, &path, Some(environment_body(spec)))
            .await?;
        info!(repo = %repo, environment = %spec.name, "environment upserted");
        Ok(())
    }

    async fn set_environment_variable(
        &self,
        repo: &RepoRef,
        environment: &str,
        name: &str,
        value: &str,
    ) -> CiResult<()> {
        let collection = format!(
            "/repos/{}/{}/environments/{}/variables",
            repo.owner, repo.name, environment
        );
        self.upsert_variable(&collection, name, value).await
    }

    async fn set_repository_variable(
        &self,
        repo: &RepoRef,
        name: &str,
        value: &str,
    ) -> CiResult<()> {
        let collection = format!("/repos/{}/{}/actions/variables", repo.owner, repo.name);
        self.upsert_variable(&collection, name, value).await
    }

    async fn grant_team_permission(
        &self,
        repo: &RepoRef,
        team_slug: &str,
        permission: TeamPermission,
    ) -> CiResult<()> {
        let path = format!(
            "/orgs/{}/teams/{}/repos/{}/{}",
            repo.owner, team_slug, repo.owner, repo.name
        );
        match self
            .send(
                Method::PUT,
                &path,
                Some(json!({ "permission": permission.as_str() })),
            )
            .await
        {
            Ok(_) => {
                info!(repo = %repo, team = %team_slug, permission = permission.as_str(), "team access granted");
                Ok(())
            }
            Err(CiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(CiError::NotFound(format!(
                    "team {}/{} or repository {}",
                    repo.owner, team_slug, repo
                )))
            }
            Err(other) => Err(other),
        }
    }

    async fn team_id(&self, org: &str, team_slug: &str) -> CiResult<u64> {
        let path = format!("/orgs/{org}/teams/{team_slug}");
        let response = match self.send(Method::GET, &path, None).await {
            Ok(response) => response,
            Err(CiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(CiError::NotFound(format!("team {org}/{team_slug}")));
            }
            Err(other) => return Err(other),
        };

        let team: TeamResponse = response.json().await?;
        Ok(team.id)
    }
}
