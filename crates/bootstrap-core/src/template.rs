//! The state-backend resource graph.
//!
//! The CloudFormation template is versioned data shipped inside the binary.
//! This module names its parameters and outputs and builds the parameter map
//! for a run.

use std::collections::BTreeMap;

use crate::domain::{BootstrapRequest, DerivedNames};
use crate::trust::Thumbprint;

/// Template parameter names.
pub mod parameters {
    pub const STATE_BUCKET: &str = "StateBucket";
    pub const STATE_TABLE: &str = "StateTable";
    pub const GITHUB_ORGANIZATION: &str = "GitHubOrganization";
    pub const GITHUB_REPOSITORY: &str = "GitHubRepository";
    pub const PLAN_ROLE_NAME: &str = "PlanRoleName";
    pub const APPLY_ROLE_NAME: &str = "ApplyRoleName";
    pub const OIDC_THUMBPRINT: &str = "GitHubOIDCThumbprint";

    pub const ALL: [&str; 7] = [
        STATE_BUCKET,
        STATE_TABLE,
        GITHUB_ORGANIZATION,
        GITHUB_REPOSITORY,
        PLAN_ROLE_NAME,
        APPLY_ROLE_NAME,
        OIDC_THUMBPRINT,
    ];
}

/// Template output keys.
pub mod outputs {
    pub const S3_BUCKET_NAME: &str = "S3BucketName";
    pub const DYNAMODB_TABLE_NAME: &str = "DynamoDBTableName";
    pub const OIDC_PROVIDER_ARN: &str = "GitHubOIDCProviderArn";
    pub const PLAN_ROLE_ARN: &str = "GitHubActionsPlanRoleArn";
    pub const APPLY_ROLE_ARN: &str = "GitHubActionsApplyRoleArn";

    pub const ALL: [&str; 5] = [
        S3_BUCKET_NAME,
        DYNAMODB_TABLE_NAME,
        OIDC_PROVIDER_ARN,
        PLAN_ROLE_ARN,
        APPLY_ROLE_ARN,
    ];
}

/// A deployable template and its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGraphTemplate {
    pub id: &'static str,
    pub version: &'static str,
    pub body: &'static str,
}

impl ResourceGraphTemplate {
    /// S3 state bucket, DynamoDB lock table, GitHub OIDC provider and the
    /// plan/apply roles.
    pub const fn tfstate_backend() -> Self {
        ResourceGraphTemplate {
            id: "tfstate-backend",
            version: "3",
            body: include_str!("../templates/tfstate-backend.yaml"),
        }
    }
}

impl std::fmt::Display for ResourceGraphTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// Parameter map for the state-backend template.
pub fn stack_parameters(
    request: &BootstrapRequest,
    names: &DerivedNames,
    thumbprint: &Thumbprint,
) -> BTreeMap<String, String> {
    [
        (parameters::STATE_BUCKET, names.state_bucket_name.as_str()),
        (parameters::STATE_TABLE, names.state_table_name.as_str()),
        (parameters::GITHUB_ORGANIZATION, request.github_owner()),
        (parameters::GITHUB_REPOSITORY, request.github_repo()),
        (parameters::PLAN_ROLE_NAME, names.plan_role_name.as_str()),
        (parameters::APPLY_ROLE_NAME, names.apply_role_name.as_str()),
        (parameters::OIDC_THUMBPRINT, thumbprint.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
