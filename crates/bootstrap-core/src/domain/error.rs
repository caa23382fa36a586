//! Error taxonomy for the bootstrap workflow.

use std::path::PathBuf;

use ci_platform::CiError;
use stack_manager::ResourceFailure;

use crate::ci_config::CiStep;

/// Problems with the caller's input. Always raised before any remote call.
#[derive(Debug, thiserror::Error)]
pub enum InputValidationError {
    #[error("invalid environment '{0}': expected one of sbx, dev, tst, stg, prd")]
    InvalidEnvironment(String),

    #[error("tenant must not be empty")]
    EmptyTenant,

    #[error("unparsable repository URL '{0}': expected a github.com <owner>/<repo> remote")]
    UnparsableRepositoryUrl(String),

    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidResourceName {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("not inside a git working tree: {0}")]
    NotInRepository(String),

    #[error("git remote '{0}' is not configured")]
    MissingRemote(String),

    #[error("no AWS region configured; pass --region or set AWS_REGION")]
    MissingRegion,

    #[error("scaffold sample directory not found: {}", .0.display())]
    ScaffoldTemplateMissing(PathBuf),

    #[error("key '{key}' not found in {}", .path.display())]
    ScaffoldKeyMissing { key: String, path: PathBuf },

    #[error(
        "key '{key}' in {} is not a plain `{key}: value` line; set it by hand",
        .path.display()
    )]
    ScaffoldUnsupportedLayout { key: String, path: PathBuf },

    #[error("{} is not valid YAML: {reason}", .path.display())]
    ScaffoldInvalidYaml { path: PathBuf, reason: String },

    #[error("scaffold io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced by a bootstrap run.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    InputValidation(#[from] InputValidationError),

    #[error("trust fact unavailable for {host}: {reason}")]
    TrustFactUnavailable { host: String, reason: String },

    #[error("resource graph rejected for stack {stack_name}: {reason}")]
    ResourceGraphRejected { stack_name: String, reason: String },

    #[error("resource graph deploy failed for stack {stack_name}: {reason}{}", render_failures(.failures))]
    ResourceGraphDeployFailed {
        stack_name: String,
        /// Terminal status, if the submission got that far
        status: Option<String>,
        reason: String,
        failures: Vec<ResourceFailure>,
    },

    #[error("outputs unavailable for stack {stack_name}: {reason}")]
    OutputsUnavailable { stack_name: String, reason: String },

    #[error("CI configuration failed at step '{step}': {source}")]
    CiConfigurationFailed {
        step: CiStep,
        #[source]
        source: CiError,
    },
}

impl BootstrapError {
    pub fn is_input_validation(&self) -> bool {
        matches!(self, BootstrapError::InputValidation(_))
    }
}

fn render_failures(failures: &[ResourceFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = failures.iter().map(|f| format!("\n  - {f}")).collect();
    lines.concat()
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;
