//! Structured observability hooks for bootstrap run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via `bootstrap_span`
//! - Emission functions for lifecycle events: start, stage completion,
//!   stack status changes, CI steps, finish and failure
//!
//! Events are emitted at `info!` level (failures at `error!`). Filtering and
//! JSON output are configured through `telemetry::init_tracing`.

use tracing::{error, info};

/// Span covering one bootstrap run, tagged with tenant and environment.
///
/// Attach it to the run's future with `tracing::Instrument` so that every
/// event emitted while the run is polled carries both fields.
///
/// # Example
///
/// ```ignore
/// run(request).instrument(bootstrap_span("dataops", "dev")).await
/// ```
pub fn bootstrap_span(tenant: &str, environment: &str) -> tracing::Span {
    tracing::info_span!(
        "bootstrap.run",
        tenant = %tenant,
        environment = %environment
    )
}

/// Emit event: run started for a repository.
pub fn emit_bootstrap_started(repository: &str, region: &str) {
    info!(event = "bootstrap.started", repository = %repository, region = %region);
}

/// Emit event: a stage of the run completed.
pub fn emit_stage_completed(stage: &str) {
    info!(event = "bootstrap.stage_completed", stage = %stage);
}

/// Emit event: the stack was observed in a new status while waiting.
pub fn emit_stack_status(stack_name: &str, status: &str) {
    info!(event = "stack.status", stack = %stack_name, status = %status);
}

/// Emit event: a CI configuration step finished.
pub fn emit_ci_step_completed(step: &str) {
    info!(event = "ci.step_completed", step = %step);
}

/// Emit event: run finished with the deploy change kind and duration.
pub fn emit_bootstrap_finished(stack_name: &str, change: &str, duration_ms: u64) {
    info!(
        event = "bootstrap.finished",
        stack = %stack_name,
        change = %change,
        duration_ms = duration_ms,
    );
}

/// Emit event: run failed at a stage.
pub fn emit_bootstrap_failed(stage: &str, error: &dyn std::fmt::Display) {
    error!(event = "bootstrap.failed", stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_span_create() {
        let span = bootstrap_span("dataops", "dev");
        let _guard = span.enter();
        emit_stage_completed("names_derived");
    }
}
