//! Bootstrap orchestration.
//!
//! Sequences one run as a linear state machine:
//!
//! ```text
//! Start -> NamesDerived -> Scaffolded -> TrustResolved -> StackDeployed
//!       -> OutputsExtracted -> CiConfigured -> Done
//! ```
//!
//! Any error stops the run as `BootstrapFailure { stage, error }`, where
//! `stage` is the stage that was being attempted. There is no compensation
//! and no automatic retry: every stage is idempotent, so the recovery path is
//! to fix the cause and run again from `Start`.
//!
//! Input validation and local scaffolding happen before the first remote
//! call, so an input error never leaves anything behind remotely.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ci_platform::CiPlatform;
use serde::Serialize;
use stack_manager::StackManager;
use tracing::Instrument;

use crate::ci_config::{CiConfigReport, CiEnvironmentConfigurator, DEFAULT_REVIEWER_TEAM};
use crate::deployer::{DeployReport, ResourceGraphDeployer, DEFAULT_POLL_INTERVAL};
use crate::domain::{BootstrapError, BootstrapInput, BootstrapRequest, DerivedNames, Result};
use crate::obs;
use crate::outputs::{OutputExtractor, StackOutputs};
use crate::scaffold::{scaffold_environment, ScaffoldOutcome};
use crate::template::{stack_parameters, ResourceGraphTemplate};
use crate::trust::{Thumbprint, TrustFactResolver};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Run-wide settings that are not part of the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Team that reviews applies and gets read access to the repository
    pub reviewer_team: String,
    pub poll_interval: Duration,
    /// Directory holding `_sample`; `None` disables scaffolding
    pub environments_dir: Option<PathBuf>,
    pub termination_protection: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            reviewer_team: DEFAULT_REVIEWER_TEAM.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            environments_dir: None,
            termination_protection: true,
        }
    }
}

impl BootstrapConfig {
    pub fn with_reviewer_team(mut self, team: &str) -> Self {
        self.reviewer_team = team.to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_environments_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.environments_dir = Some(dir.into());
        self
    }

    pub fn with_termination_protection(mut self, enabled: bool) -> Self {
        self.termination_protection = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStage {
    Start,
    NamesDerived,
    Scaffolded,
    TrustResolved,
    StackDeployed,
    OutputsExtracted,
    CiConfigured,
    Done,
}

impl BootstrapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapStage::Start => "start",
            BootstrapStage::NamesDerived => "names_derived",
            BootstrapStage::Scaffolded => "scaffolded",
            BootstrapStage::TrustResolved => "trust_resolved",
            BootstrapStage::StackDeployed => "stack_deployed",
            BootstrapStage::OutputsExtracted => "outputs_extracted",
            BootstrapStage::CiConfigured => "ci_configured",
            BootstrapStage::Done => "done",
        }
    }

    /// What the run is doing while trying to reach this stage.
    pub fn activity(&self) -> &'static str {
        match self {
            BootstrapStage::Start => "starting",
            BootstrapStage::NamesDerived => "validating input and deriving names",
            BootstrapStage::Scaffolded => "scaffolding the environment directory",
            BootstrapStage::TrustResolved => "resolving the OIDC issuer fingerprint",
            BootstrapStage::StackDeployed => "deploying the state backend stack",
            BootstrapStage::OutputsExtracted => "reading stack outputs",
            BootstrapStage::CiConfigured => "configuring CI environments",
            BootstrapStage::Done => "finishing",
        }
    }
}

impl std::fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run that stopped at `stage`.
#[derive(Debug, thiserror::Error)]
#[error("bootstrap failed while {}", .stage.activity())]
pub struct BootstrapFailure {
    /// Stage that was being attempted
    pub stage: BootstrapStage,
    /// Stages reached before the failure
    pub completed: Vec<BootstrapStage>,
    #[source]
    pub error: BootstrapError,
}

impl BootstrapFailure {
    pub fn is_input_validation(&self) -> bool {
        self.error.is_input_validation()
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub request: BootstrapRequest,
    pub names: DerivedNames,
    pub scaffold: Option<ScaffoldOutcome>,
    pub thumbprint: Thumbprint,
    pub deploy: DeployReport,
    pub outputs: StackOutputs,
    pub ci: CiConfigReport,
    pub stages: Vec<BootstrapStage>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Stages reached so far; turns stage results into run failures.
struct Progress {
    reached: Vec<BootstrapStage>,
}

impl Progress {
    fn new() -> Self {
        Self {
            reached: vec![BootstrapStage::Start],
        }
    }

    fn record<T>(
        &mut self,
        stage: BootstrapStage,
        result: Result<T>,
    ) -> std::result::Result<T, BootstrapFailure> {
        match result {
            Ok(value) => {
                obs::emit_stage_completed(stage.as_str());
                self.reached.push(stage);
                Ok(value)
            }
            Err(error) => {
                obs::emit_bootstrap_failed(stage.as_str(), &error);
                Err(BootstrapFailure {
                    stage,
                    completed: self.reached.clone(),
                    error,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the bootstrap workflow against the given collaborators.
pub struct BootstrapOrchestrator<'a> {
    stacks: &'a dyn StackManager,
    ci: &'a dyn CiPlatform,
    trust: &'a dyn TrustFactResolver,
    config: BootstrapConfig,
}

impl<'a> BootstrapOrchestrator<'a> {
    pub fn new(
        stacks: &'a dyn StackManager,
        ci: &'a dyn CiPlatform,
        trust: &'a dyn TrustFactResolver,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            stacks,
            ci,
            trust,
            config,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Run the whole workflow once.
    pub async fn run(
        &self,
        input: &BootstrapInput,
    ) -> std::result::Result<BootstrapReport, BootstrapFailure> {
        let mut progress = Progress::new();
        let (request, names) = progress.record(BootstrapStage::NamesDerived, derive(input))?;

        let span = obs::bootstrap_span(request.tenant(), request.environment().as_str());
        self.run_validated(request, names, progress)
            .instrument(span)
            .await
    }

    async fn run_validated(
        &self,
        request: BootstrapRequest,
        names: DerivedNames,
        mut progress: Progress,
    ) -> std::result::Result<BootstrapReport, BootstrapFailure> {
        let started_at = Utc::now();
        let clock = Instant::now();
        obs::emit_bootstrap_started(&request.repository().to_string(), request.aws_region());

        let scaffold = progress.record(BootstrapStage::Scaffolded, self.scaffold(&request))?;

        let thumbprint =
            progress.record(BootstrapStage::TrustResolved, self.resolve_trust().await)?;

        let template = ResourceGraphTemplate::tfstate_backend();
        let deploy = progress.record(
            BootstrapStage::StackDeployed,
            ResourceGraphDeployer::new(self.stacks)
                .with_poll_interval(self.config.poll_interval)
                .with_termination_protection(self.config.termination_protection)
                .deploy(
                    &template,
                    &names.stack_name,
                    stack_parameters(&request, &names, &thumbprint),
                )
                .await,
        )?;

        let outputs = progress.record(
            BootstrapStage::OutputsExtracted,
            self.extract_outputs(&names).await,
        )?;

        let ci = progress.record(
            BootstrapStage::CiConfigured,
            CiEnvironmentConfigurator::new(self.ci, &self.config.reviewer_team)
                .configure(
                    &request.repository(),
                    request.environment(),
                    request.aws_region(),
                    &outputs,
                )
                .await,
        )?;

        progress.record(BootstrapStage::Done, Ok(()))?;
        let duration_ms = clock.elapsed().as_millis() as u64;
        obs::emit_bootstrap_finished(&names.stack_name, deploy.change.as_str(), duration_ms);

        Ok(BootstrapReport {
            request,
            names,
            scaffold,
            thumbprint,
            deploy,
            outputs,
            ci,
            stages: progress.reached,
            started_at,
            duration_ms,
        })
    }

    fn scaffold(&self, request: &BootstrapRequest) -> Result<Option<ScaffoldOutcome>> {
        let Some(dir) = &self.config.environments_dir else {
            return Ok(None);
        };
        let outcome = scaffold_environment(dir, request.environment(), request.tenant())?;
        Ok(Some(outcome))
    }

    async fn resolve_trust(&self) -> Result<Thumbprint> {
        self.trust
            .resolve()
            .await
            .map_err(|e| BootstrapError::TrustFactUnavailable {
                host: self.trust.host().to_string(),
                reason: e.to_string(),
            })
    }

    async fn extract_outputs(&self, names: &DerivedNames) -> Result<StackOutputs> {
        let outputs = OutputExtractor::new(self.stacks)
            .extract(&names.stack_name)
            .await?;
        outputs.verify_against(names)?;
        Ok(outputs)
    }
}

fn derive(input: &BootstrapInput) -> Result<(BootstrapRequest, DerivedNames)> {
    let request = BootstrapRequest::from_input(input)?;
    let names = DerivedNames::derive(&request)?;
    Ok((request, names))
}
