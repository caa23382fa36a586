//! Stack output extraction.

use serde::Serialize;
use stack_manager::{StackDescription, StackManager};

use crate::domain::{BootstrapError, DerivedNames, Result};
use crate::template::outputs;

/// Identifiers the deployed stack exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutputs {
    pub bucket_name: String,
    pub table_name: String,
    pub oidc_provider_arn: String,
    pub plan_role_arn: String,
    pub apply_role_arn: String,
}

impl StackOutputs {
    /// Check the stack reports the backend this run derived. A mismatch means
    /// the stack name collides with a stack managing something else.
    pub fn verify_against(&self, names: &DerivedNames) -> Result<()> {
        let mismatch = |what: &str, reported: &str, expected: &str| {
            BootstrapError::OutputsUnavailable {
                stack_name: names.stack_name.clone(),
                reason: format!("stack reports {what} '{reported}', expected '{expected}'"),
            }
        };
        if self.bucket_name != names.state_bucket_name {
            return Err(mismatch("bucket", &self.bucket_name, &names.state_bucket_name));
        }
        if self.table_name != names.state_table_name {
            return Err(mismatch("table", &self.table_name, &names.state_table_name));
        }
        Ok(())
    }
}

/// Reads named outputs from a settled stack.
pub struct OutputExtractor<'a> {
    manager: &'a dyn StackManager,
}

impl<'a> OutputExtractor<'a> {
    pub fn new(manager: &'a dyn StackManager) -> Self {
        Self { manager }
    }

    /// Fetch the outputs of `stack_name`.
    ///
    /// Fails with `OutputsUnavailable` when the stack is absent, not in a
    /// stable state, or any expected output is missing or empty.
    ///
    /// `UPDATE_ROLLBACK_COMPLETE` and `IMPORT_ROLLBACK_COMPLETE` count as
    /// stable: the stack is back on its last good template and its outputs
    /// still describe live resources. The deployer reports a rolled-back
    /// update as a failure before outputs are ever read. `ROLLBACK_COMPLETE`
    /// (a create that never succeeded) is refused.
    pub async fn extract(&self, stack_name: &str) -> Result<StackOutputs> {
        let unavailable = |reason: String| BootstrapError::OutputsUnavailable {
            stack_name: stack_name.to_string(),
            reason,
        };

        let desc = self
            .manager
            .describe_stack(stack_name)
            .await
            .map_err(|e| unavailable(format!("describe failed: {e}")))?
            .ok_or_else(|| unavailable("stack does not exist".to_string()))?;

        if !desc.status.is_stable() {
            return Err(unavailable(format!("stack is in {}", desc.status)));
        }

        let outputs = StackOutputs {
            bucket_name: required(&desc, outputs::S3_BUCKET_NAME).map_err(unavailable)?,
            table_name: required(&desc, outputs::DYNAMODB_TABLE_NAME).map_err(unavailable)?,
            oidc_provider_arn: required_arn(&desc, outputs::OIDC_PROVIDER_ARN)
                .map_err(unavailable)?,
            plan_role_arn: required_arn(&desc, outputs::PLAN_ROLE_ARN).map_err(unavailable)?,
            apply_role_arn: required_arn(&desc, outputs::APPLY_ROLE_ARN).map_err(unavailable)?,
        };
        Ok(outputs)
    }
}

fn required(desc: &StackDescription, key: &str) -> std::result::Result<String, String> {
    match desc.output(key).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        Some(_) => Err(format!("output {key} is empty")),
        None => Err(format!("output {key} is missing")),
    }
}

fn required_arn(desc: &StackDescription, key: &str) -> std::result::Result<String, String> {
    let value = required(desc, key)?;
    if !value.starts_with("arn:") {
        return Err(format!("output {key} is not an ARN: '{value}'"));
    }
    Ok(value)
}
