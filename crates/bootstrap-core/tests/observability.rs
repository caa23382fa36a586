//! Observability tests for bootstrap run lifecycle tracing.

use std::time::Duration;

use bootstrap_core::obs::{
    bootstrap_span, emit_bootstrap_failed, emit_bootstrap_finished, emit_bootstrap_started,
    emit_ci_step_completed, emit_stack_status,
};
use bootstrap_core::{
    BootstrapConfig, BootstrapInput, BootstrapOrchestrator, StaticTrustFact, Thumbprint,
};
use ci_platform::fakes::MemoryCiPlatform;
use stack_manager::fakes::MemoryStackManager;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_bootstrap_started_logs_repository_and_region() {
    emit_bootstrap_started("contoso/infra", "us-east-1");
    assert!(logs_contain("bootstrap.started"));
    assert!(logs_contain("contoso/infra"));
    assert!(logs_contain("us-east-1"));
}

#[traced_test]
#[test]
fn test_emit_bootstrap_finished_logs_change_and_duration() {
    emit_bootstrap_finished("contoso-cf-dataops-dev-tfstate", "unchanged", 1234);
    assert!(logs_contain("bootstrap.finished"));
    assert!(logs_contain("unchanged"));
    assert!(logs_contain("1234"));
}

#[traced_test]
#[test]
fn test_emit_bootstrap_failed_logs_at_error() {
    emit_bootstrap_failed("stack_deployed", &"stack ended in ROLLBACK_COMPLETE");
    assert!(logs_contain("ERROR"));
    assert!(logs_contain("bootstrap.failed"));
    assert!(logs_contain("ROLLBACK_COMPLETE"));
}

#[traced_test]
#[test]
fn test_events_inside_span_carry_tenant_and_environment() {
    let span = bootstrap_span("dataops", "dev");
    span.in_scope(|| {
        emit_stack_status("contoso-cf-dataops-dev-tfstate", "CREATE_IN_PROGRESS");
        emit_ci_step_completed("create environment");
    });
    assert!(logs_contain("tenant=dataops"));
    assert!(logs_contain("environment=dev"));
    assert!(logs_contain("CREATE_IN_PROGRESS"));
    assert!(logs_contain("ci.step_completed"));
}

#[traced_test]
#[tokio::test]
async fn test_rejected_input_logs_failure_without_run_span() {
    let stacks = MemoryStackManager::new();
    let ci = MemoryCiPlatform::new();
    let trust = StaticTrustFact::new(
        Thumbprint::try_from("6938fd4d98bab03faadb97b34396831e3780aea1".to_string()).unwrap(),
    );
    let config = BootstrapConfig::default().with_poll_interval(Duration::from_millis(1));

    let input = BootstrapInput {
        tenant: "dataops".to_string(),
        environment: "qa".to_string(),
        repository_url: "https://github.com/contoso/infra".to_string(),
        region: "us-east-1".to_string(),
        organization: None,
    };
    BootstrapOrchestrator::new(&stacks, &ci, &trust, config)
        .run(&input)
        .await
        .unwrap_err();

    assert!(logs_contain("bootstrap.failed"));
    assert!(logs_contain("names_derived"));
    assert!(!logs_contain("bootstrap.started"));
}
