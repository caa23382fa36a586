//! CI environment configuration.
//!
//! Makes the repository's GitHub Actions aware of the bootstrapped backend.
//! Two environments are written: `<env>` for plans and `<env>-approval`,
//! gated on the reviewer team, for applies. Both carry the same variables.
//!
//! Every step is an upsert. A failure stops the sequence and leaves earlier
//! steps in place; re-running converges.

use std::collections::BTreeMap;
use std::fmt;

use ci_platform::{CiPlatform, EnvironmentSpec, ProtectionRules, RepoRef, TeamPermission};
use serde::Serialize;
use tracing::info;

use crate::domain::{BootstrapError, Environment, Result};
use crate::obs;
use crate::outputs::StackOutputs;

pub const VAR_ENVIRONMENT: &str = "ENVIRONMENT";
pub const VAR_ROLE_PLAN: &str = "AWS_ROLE_TFPLAN";
pub const VAR_ROLE_APPLY: &str = "AWS_ROLE_TFAPPLY";
pub const VAR_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

pub const APPROVAL_SUFFIX: &str = "-approval";
pub const DEFAULT_REVIEWER_TEAM: &str = "platform-approvers";

/// The steps of CI configuration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStep {
    CreateEnvironment,
    SetEnvironmentVariables,
    GrantTeamAccess,
    ResolveReviewerTeam,
    CreateApprovalEnvironment,
    SetApprovalVariables,
    SetRepositoryVariables,
}

impl CiStep {
    pub const ALL: [CiStep; 7] = [
        CiStep::CreateEnvironment,
        CiStep::SetEnvironmentVariables,
        CiStep::GrantTeamAccess,
        CiStep::ResolveReviewerTeam,
        CiStep::CreateApprovalEnvironment,
        CiStep::SetApprovalVariables,
        CiStep::SetRepositoryVariables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CiStep::CreateEnvironment => "create environment",
            CiStep::SetEnvironmentVariables => "set environment variables",
            CiStep::GrantTeamAccess => "grant team access",
            CiStep::ResolveReviewerTeam => "resolve reviewer team",
            CiStep::CreateApprovalEnvironment => "create approval environment",
            CiStep::SetApprovalVariables => "set approval environment variables",
            CiStep::SetRepositoryVariables => "set repository variables",
        }
    }
}

impl fmt::Display for CiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What CI configuration wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CiConfigReport {
    pub environments: Vec<String>,
    pub reviewer_team: String,
    pub reviewer_team_id: u64,
}

/// Variables shared by the direct and the approval environment.
pub fn environment_variables(
    environment: Environment,
    outputs: &StackOutputs,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (VAR_ENVIRONMENT.to_string(), environment.as_str().to_string()),
        (VAR_ROLE_PLAN.to_string(), outputs.plan_role_arn.clone()),
        (VAR_ROLE_APPLY.to_string(), outputs.apply_role_arn.clone()),
    ])
}

pub fn approval_environment_name(environment: Environment) -> String {
    format!("{}{}", environment.as_str(), APPROVAL_SUFFIX)
}

/// Applies the CI configuration for one environment.
pub struct CiEnvironmentConfigurator<'a> {
    platform: &'a dyn CiPlatform,
    reviewer_team: String,
}

impl<'a> CiEnvironmentConfigurator<'a> {
    pub fn new(platform: &'a dyn CiPlatform, reviewer_team: &str) -> Self {
        Self {
            platform,
            reviewer_team: reviewer_team.to_string(),
        }
    }

    pub async fn configure(
        &self,
        repo: &RepoRef,
        environment: Environment,
        region: &str,
        outputs: &StackOutputs,
    ) -> Result<CiConfigReport> {
        let variables = environment_variables(environment, outputs);
        let direct = EnvironmentSpec {
            name: environment.as_str().to_string(),
            protection: None,
            variables: variables.clone(),
        };

        step(
            CiStep::CreateEnvironment,
            self.platform.upsert_environment(repo, &direct),
        )
        .await?;
        step(
            CiStep::SetEnvironmentVariables,
            self.set_variables(repo, &direct),
        )
        .await?;
        step(
            CiStep::GrantTeamAccess,
            self.platform
                .grant_team_permission(repo, &self.reviewer_team, TeamPermission::Pull),
        )
        .await?;
        let team_id = step(
            CiStep::ResolveReviewerTeam,
            self.platform.team_id(&repo.owner, &self.reviewer_team),
        )
        .await?;

        let approval = EnvironmentSpec {
            name: approval_environment_name(environment),
            protection: Some(ProtectionRules {
                required_reviewer_team_id: team_id,
                wait_timer_seconds: 0,
                allow_self_review: true,
            }),
            variables,
        };
        step(
            CiStep::CreateApprovalEnvironment,
            self.platform.upsert_environment(repo, &approval),
        )
        .await?;
        step(
            CiStep::SetApprovalVariables,
            self.set_variables(repo, &approval),
        )
        .await?;
        step(
            CiStep::SetRepositoryVariables,
            self.platform
                .set_repository_variable(repo, VAR_DEFAULT_REGION, region),
        )
        .await?;

        info!(
            repo = %repo,
            environment = %direct.name,
            approval = %approval.name,
            "CI environments configured"
        );
        Ok(CiConfigReport {
            environments: vec![direct.name, approval.name],
            reviewer_team: self.reviewer_team.clone(),
            reviewer_team_id: team_id,
        })
    }

    async fn set_variables(
        &self,
        repo: &RepoRef,
        spec: &EnvironmentSpec,
    ) -> ci_platform::CiResult<()> {
        for (name, value) in &spec.variables {
            self.platform
                .set_environment_variable(repo, &spec.name, name, value)
                .await?;
        }
        Ok(())
    }
}

async fn step<T>(
    step: CiStep,
    fut: impl std::future::Future<Output = ci_platform::CiResult<T>>,
) -> Result<T> {
    let value = fut
        .await
        .map_err(|source| BootstrapError::CiConfigurationFailed { step, source })?;
    obs::emit_ci_step_completed(step.as_str());
    Ok(value)
}
