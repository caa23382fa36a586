//! Bootstrap-Core: OpenTofu State Backend Bootstrap
//!
//! Provisions what an OpenTofu pipeline needs before it can run for one
//! tenant/environment pair: an S3 state bucket and DynamoDB lock table, a
//! GitHub Actions OIDC trust with plan and apply roles (one CloudFormation
//! stack), and the GitHub environments that hand those roles to workflows.
//!
//! ## Layer 2 - Bootstrap Workflow
//!
//! Focus: deterministic naming, an idempotent deploy, and a run that can
//! always be repeated from the start.
//!
//! ## Key Components
//!
//! - `DerivedNames`: every resource name, derived once per run
//! - `TrustFactResolver`: OIDC issuer fingerprint from a live handshake
//! - `ResourceGraphDeployer`: create/update the stack and wait for it
//! - `OutputExtractor`: role ARNs and backend names from the settled stack
//! - `CiEnvironmentConfigurator`: direct and approval-gated environments
//! - `BootstrapOrchestrator`: sequences the above as a state machine

pub mod ci_config;
pub mod deployer;
pub mod domain;
pub mod git;
pub mod obs;
pub mod orchestrator;
pub mod outputs;
pub mod scaffold;
pub mod telemetry;
pub mod template;
pub mod trust;

pub use ci_config::{CiConfigReport, CiEnvironmentConfigurator, CiStep, DEFAULT_REVIEWER_TEAM};
pub use deployer::{DeployChange, DeployReport, ResourceGraphDeployer, DEFAULT_POLL_INTERVAL};
pub use domain::{
    parse_repository_url, BootstrapError, BootstrapInput, BootstrapRequest, DerivedNames,
    Environment, InputValidationError, Result,
};
pub use git::{is_git_repo, remote_url, repository_root, DEFAULT_REMOTE};
pub use orchestrator::{
    BootstrapConfig, BootstrapFailure, BootstrapOrchestrator, BootstrapReport, BootstrapStage,
};
pub use outputs::{OutputExtractor, StackOutputs};
pub use scaffold::{scaffold_environment, ScaffoldOutcome};
pub use telemetry::init_tracing;
pub use template::{stack_parameters, ResourceGraphTemplate};
pub use trust::{
    StaticTrustFact, Thumbprint, TlsThumbprintResolver, TrustError, TrustFactResolver,
    GITHUB_OIDC_HOST,
};
