//! tofu-bootstrap - OpenTofu state backend bootstrap CLI
//!
//! Run from inside the infrastructure repository:
//!
//! ```text
//! tofu-bootstrap <TENANT> <ENVIRONMENT> [--region us-east-1]
//! ```
//!
//! One run provisions the state bucket, lock table and GitHub Actions roles
//! for the tenant/environment pair, then writes the `<env>` and
//! `<env>-approval` GitHub environments. Every step is idempotent; after a
//! failure, fix the cause and run the same command again.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::{info, Level};

use bootstrap_core::{
    init_tracing, is_git_repo, remote_url, repository_root, BootstrapConfig, BootstrapFailure,
    BootstrapInput, BootstrapOrchestrator, BootstrapReport, Environment, InputValidationError,
    ScaffoldOutcome, TlsThumbprintResolver, DEFAULT_REMOTE, DEFAULT_REVIEWER_TEAM,
    GITHUB_OIDC_HOST,
};
use ci_platform::{GitHubClient, GitHubConfig};
use stack_manager::{default_region, CloudFormationStackManager};

const EXIT_FAILURE: u8 = 1;
const EXIT_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tofu-bootstrap")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Bootstrap an OpenTofu state backend and GitHub Actions trust for one tenant/environment",
    long_about = None
)]
struct Cli {
    /// Tenant owning the backend (lowercase letters, digits and '-')
    tenant: String,

    /// Target environment: sbx, dev, tst, stg or prd
    environment: Environment,

    /// AWS region (default: the AWS SDK's configured region)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Organization prefix for resource names (default: the repository owner, lowercased)
    #[arg(long, env = "BOOTSTRAP_ORGANIZATION")]
    organization: Option<String>,

    /// GitHub team that reviews applies
    #[arg(long, env = "BOOTSTRAP_REVIEWER_TEAM", default_value = DEFAULT_REVIEWER_TEAM)]
    reviewer_team: String,

    /// GitHub token with repo and read:org scope
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    github_api_url: String,

    /// Host whose TLS certificate backs the OIDC provider thumbprint
    #[arg(long, default_value = GITHUB_OIDC_HOST)]
    oidc_host: String,

    /// Seconds between stack status checks
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,

    /// Directory (relative to the repository root) holding `_sample`
    #[arg(long, default_value = "environments")]
    environments_dir: PathBuf,

    /// Do not create the local environment directory
    #[arg(long)]
    skip_scaffold: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines and print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("error: cannot read the current directory: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    if !is_git_repo(&cwd) {
        Cli::command()
            .error(
                ErrorKind::InvalidValue,
                "must be run inside the git working tree of the infrastructure repository",
            )
            .exit();
    }

    match run(cli, &cwd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", render_error(&err));
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli, cwd: &Path) -> Result<()> {
    let root = repository_root(cwd)?;
    let repository_url = remote_url(&root, DEFAULT_REMOTE)?;

    let region = match cli.region {
        Some(region) => region,
        None => default_region()
            .await
            .ok_or(InputValidationError::MissingRegion)?,
    };

    let stacks = CloudFormationStackManager::from_region(&region).await;
    let ci = GitHubClient::new(
        GitHubConfig::new(&cli.github_token).with_api_url(&cli.github_api_url),
    )
    .context("failed to build GitHub client")?;
    let trust = TlsThumbprintResolver::new(&cli.oidc_host);

    let mut config = BootstrapConfig::default()
        .with_reviewer_team(&cli.reviewer_team)
        .with_poll_interval(Duration::from_secs(cli.poll_interval_secs));
    if !cli.skip_scaffold {
        config = config.with_environments_dir(root.join(&cli.environments_dir));
    }

    let input = BootstrapInput {
        tenant: cli.tenant,
        environment: cli.environment.as_str().to_string(),
        repository_url,
        region,
        organization: cli.organization,
    };
    info!(root = %root.display(), "bootstrapping from repository");

    let report = BootstrapOrchestrator::new(&stacks, &ci, &trust, config)
        .run(&input)
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&report));
    }
    Ok(())
}

fn render_summary(report: &BootstrapReport) -> String {
    let scaffold = match &report.scaffold {
        Some(ScaffoldOutcome::Created(path)) => format!("created {}", path.display()),
        Some(ScaffoldOutcome::Skipped(path)) => format!("kept existing {}", path.display()),
        None => "skipped".to_string(),
    };
    let request = &report.request;

    let mut out = format!(
        "Bootstrapped {} {} for tenant {} in {}\n",
        request.repository(),
        request.environment(),
        request.tenant(),
        request.aws_region()
    );
    out.push_str(&format!(
        "  Stack:        {} ({}, {})\n",
        report.names.stack_name,
        report.deploy.change.as_str(),
        report.deploy.status
    ));
    out.push_str(&format!("  State bucket: {}\n", report.outputs.bucket_name));
    out.push_str(&format!("  Lock table:   {}\n", report.outputs.table_name));
    out.push_str(&format!("  Plan role:    {}\n", report.outputs.plan_role_arn));
    out.push_str(&format!("  Apply role:   {}\n", report.outputs.apply_role_arn));
    out.push_str(&format!(
        "  Environments: {} (reviewers: {})\n",
        report.ci.environments.join(", "),
        report.ci.reviewer_team
    ));
    out.push_str(&format!("  Scaffold:     {scaffold}\n"));
    out.push_str(&format!("  Duration:     {} ms\n", report.duration_ms));
    out
}

fn render_error(err: &anyhow::Error) -> String {
    let mut out = format!("error: {err}\n");
    if let Some(failure) = err.downcast_ref::<BootstrapFailure>() {
        out.push_str(&format!("  stage: {}\n", failure.stage));
    }
    for cause in err.chain().skip(1) {
        out.push_str(&format!("  caused by: {cause}\n"));
    }
    out.push_str("fix the cause and re-run; completed steps are skipped or converge\n");
    out
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let input_error = err
        .downcast_ref::<BootstrapFailure>()
        .map(BootstrapFailure::is_input_validation)
        .unwrap_or_else(|| err.downcast_ref::<InputValidationError>().is_some());
    if input_error {
        EXIT_INPUT
    } else {
        EXIT_FAILURE
    }
}
