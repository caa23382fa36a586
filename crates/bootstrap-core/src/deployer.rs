//! Resource graph deployment.
//!
//! Submits the template as a named stack and blocks until the stack manager
//! reports a terminal state. The stack is never deleted or otherwise repaired
//! here: anything the manager cannot move forward on its own is reported back
//! to the operator.
//!
//! Decision table for an existing stack:
//!
//! | observed status             | action                                 |
//! |-----------------------------|----------------------------------------|
//! | absent                      | create                                 |
//! | `*_IN_PROGRESS`             | wait for it to settle, then re-decide  |
//! | stable (`CREATE_COMPLETE`…) | update ("no updates" is `Unchanged`)   |
//! | `ROLLBACK_COMPLETE`         | reject: must be deleted by hand        |
//! | any other failed state      | reject: needs manual intervention      |

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use stack_manager::{
    StackDescription, StackError, StackManager, StackRequest, StackStatus, UpdateOutcome,
};
use tracing::{debug, info, warn};

use crate::domain::{BootstrapError, Result};
use crate::obs;
use crate::template::ResourceGraphTemplate;

/// Default interval between stack status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// What a deployment did to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployChange {
    Created,
    Updated,
    Unchanged,
}

impl DeployChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployChange::Created => "created",
            DeployChange::Updated => "updated",
            DeployChange::Unchanged => "unchanged",
        }
    }
}

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub stack_id: String,
    pub stack_name: String,
    pub change: DeployChange,
    pub status: String,
}

/// Deploys a template as a named stack and waits for it to settle.
pub struct ResourceGraphDeployer<'a> {
    manager: &'a dyn StackManager,
    poll_interval: Duration,
    termination_protection: bool,
}

impl<'a> ResourceGraphDeployer<'a> {
    pub fn new(manager: &'a dyn StackManager) -> Self {
        Self {
            manager,
            poll_interval: DEFAULT_POLL_INTERVAL,
            termination_protection: true,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_termination_protection(mut self, enabled: bool) -> Self {
        self.termination_protection = enabled;
        self
    }

    /// Deploy `template` as `stack_name` with `parameters`.
    ///
    /// Returns once the stack is in a terminal state. Success means
    /// `CREATE_COMPLETE`, `UPDATE_COMPLETE` or `IMPORT_COMPLETE` after a
    /// submission, or an accepted no-op update.
    pub async fn deploy(
        &self,
        template: &ResourceGraphTemplate,
        stack_name: &str,
        parameters: BTreeMap<String, String>,
    ) -> Result<DeployReport> {
        info!(stack = %stack_name, template = %template, "deploying resource graph");

        self.manager
            .validate_template(template.body)
            .await
            .map_err(|e| submission_error(stack_name, e))?;

        let existing = match self.describe(stack_name).await? {
            Some(desc) if desc.status.is_in_progress() => {
                info!(
                    stack = %stack_name,
                    status = %desc.status,
                    "stack busy with an earlier operation, waiting for it to settle"
                );
                Some(self.wait_until_settled(stack_name).await?)
            }
            other => other,
        };

        let request = StackRequest {
            stack_name: stack_name.to_string(),
            template_body: template.body.to_string(),
            parameters,
            client_request_token: format!("tofu-bootstrap-{}", uuid::Uuid::new_v4()),
            termination_protection: self.termination_protection,
        };

        match existing {
            None => self.create(&request).await,
            Some(desc) if desc.status.is_stable() => self.update(&request, desc).await,
            Some(desc) if desc.status == StackStatus::RollbackComplete => {
                Err(BootstrapError::ResourceGraphRejected {
                    stack_name: stack_name.to_string(),
                    reason: "stack is in ROLLBACK_COMPLETE after a failed first create and \
                             cannot be updated; delete it and re-run"
                        .to_string(),
                })
            }
            Some(desc) => Err(BootstrapError::ResourceGraphRejected {
                stack_name: stack_name.to_string(),
                reason: format!(
                    "stack is in {} and needs manual intervention before it can be updated",
                    desc.status
                ),
            }),
        }
    }

    async fn create(&self, request: &StackRequest) -> Result<DeployReport> {
        let stack_id = self
            .manager
            .create_stack(request)
            .await
            .map_err(|e| submission_error(&request.stack_name, e))?;
        info!(stack = %request.stack_name, stack_id = %stack_id, "stack create submitted");

        let settled = self.wait_until_settled(&request.stack_name).await?;
        self.finish(settled, DeployChange::Created).await
    }

    async fn update(
        &self,
        request: &StackRequest,
        current: StackDescription,
    ) -> Result<DeployReport> {
        let outcome = self
            .manager
            .update_stack(request)
            .await
            .map_err(|e| submission_error(&request.stack_name, e))?;

        match outcome {
            UpdateOutcome::NoChanges => {
                info!(stack = %request.stack_name, "stack already up to date");
                Ok(DeployReport {
                    stack_id: current.stack_id,
                    stack_name: current.stack_name,
                    change: DeployChange::Unchanged,
                    status: current.status.to_string(),
                })
            }
            UpdateOutcome::Submitted { stack_id } => {
                info!(stack = %request.stack_name, stack_id = %stack_id, "stack update submitted");
                let settled = self.wait_until_settled(&request.stack_name).await?;
                self.finish(settled, DeployChange::Updated).await
            }
        }
    }

    async fn finish(
        &self,
        settled: StackDescription,
        change: DeployChange,
    ) -> Result<DeployReport> {
        if settled.status.is_complete() {
            return Ok(DeployReport {
                stack_id: settled.stack_id,
                stack_name: settled.stack_name,
                change,
                status: settled.status.to_string(),
            });
        }

        let failures = match self.manager.resource_failures(&settled.stack_name).await {
            Ok(failures) => failures,
            Err(e) => {
                warn!(stack = %settled.stack_name, error = %e, "could not read stack events");
                Vec::new()
            }
        };
        let reason = match settled.status_reason {
            Some(reason) => format!("stack ended in {}: {reason}", settled.status),
            None => format!("stack ended in {}", settled.status),
        };
        Err(BootstrapError::ResourceGraphDeployFailed {
            stack_name: settled.stack_name,
            status: Some(settled.status.to_string()),
            reason,
            failures,
        })
    }

    async fn describe(&self, stack_name: &str) -> Result<Option<StackDescription>> {
        self.manager
            .describe_stack(stack_name)
            .await
            .map_err(|e| BootstrapError::ResourceGraphDeployFailed {
                stack_name: stack_name.to_string(),
                status: None,
                reason: format!("describe failed: {e}"),
                failures: Vec::new(),
            })
    }

    /// Poll until the stack leaves every `*_IN_PROGRESS` state. There is no
    /// overall deadline; the manager's own timeouts bound the operation.
    async fn wait_until_settled(&self, stack_name: &str) -> Result<StackDescription> {
        let mut last_status: Option<StackStatus> = None;
        loop {
            let desc = self.describe(stack_name).await?.ok_or_else(|| {
                BootstrapError::ResourceGraphDeployFailed {
                    stack_name: stack_name.to_string(),
                    status: None,
                    reason: "stack disappeared while waiting for it to settle".to_string(),
                    failures: Vec::new(),
                }
            })?;

            if last_status.as_ref() != Some(&desc.status) {
                obs::emit_stack_status(stack_name, desc.status.as_str());
                last_status = Some(desc.status.clone());
            }

            if !desc.status.is_in_progress() {
                return Ok(desc);
            }
            debug!(stack = %stack_name, interval = ?self.poll_interval, "waiting");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Map an error from a validate/create/update submission.
fn submission_error(stack_name: &str, error: StackError) -> BootstrapError {
    if error.is_rejection() {
        BootstrapError::ResourceGraphRejected {
            stack_name: stack_name.to_string(),
            reason: error.to_string(),
        }
    } else {
        BootstrapError::ResourceGraphDeployFailed {
            stack_name: stack_name.to_string(),
            status: None,
            reason: error.to_string(),
            failures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_manager::fakes::{settled_description, MemoryStackManager, StackCall};
    use stack_manager::{ResourceFailure, StackOutput};

    const STACK: &str = "contoso-cf-dataops-dev-tfstate";

    fn params(bucket: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("StateBucket".to_string(), bucket.to_string())])
    }

    fn deployer(manager: &MemoryStackManager) -> ResourceGraphDeployer<'_> {
        ResourceGraphDeployer::new(manager).with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_create_then_unchanged() {
        let manager = MemoryStackManager::new();
        let template = ResourceGraphTemplate::tfstate_backend();

        let first = deployer(&manager)
            .deploy(&template, STACK, params("b"))
            .await
            .unwrap();
        assert_eq!(first.change, DeployChange::Created);
        assert_eq!(first.status, "CREATE_COMPLETE");

        let second = deployer(&manager)
            .deploy(&template, STACK, params("b"))
            .await
            .unwrap();
        assert_eq!(second.change, DeployChange::Unchanged);
        assert_eq!(second.stack_id, first.stack_id);
        assert_eq!(manager.submissions(), 2);
    }

    #[tokio::test]
    async fn test_changed_parameters_update() {
        let manager = MemoryStackManager::new();
        let template = ResourceGraphTemplate::tfstate_backend();
        deployer(&manager)
            .deploy(&template, STACK, params("b"))
            .await
            .unwrap();

        let report = deployer(&manager)
            .deploy(&template, STACK, params("c"))
            .await
            .unwrap();
        assert_eq!(report.change, DeployChange::Updated);
        assert_eq!(report.status, "UPDATE_COMPLETE");
    }

    #[tokio::test]
    async fn test_validation_error_is_rejection_without_submission() {
        let manager = MemoryStackManager::new();
        manager.fail_next_call(StackError::Validation {
            message: "Template format error".into(),
        });
        let err = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::ResourceGraphRejected { .. }));
        assert_eq!(manager.submissions(), 0);
    }

    #[tokio::test]
    async fn test_access_denied_is_deploy_failure() {
        let manager = MemoryStackManager::new();
        manager.fail_next_call(StackError::AccessDenied {
            message: "not authorized to perform cloudformation:ValidateTemplate".into(),
        });
        let err = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::ResourceGraphDeployFailed { status: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_create_reports_resource_reasons() {
        let manager = MemoryStackManager::new();
        manager.roll_back_next_deploy(vec![ResourceFailure {
            logical_id: "StateBucketResource".into(),
            resource_type: "AWS::S3::Bucket".into(),
            status: "CREATE_FAILED".into(),
            reason: "contoso-s3-dataops-dev-tfstate already exists".into(),
        }]);

        let err = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap_err();
        match err {
            BootstrapError::ResourceGraphDeployFailed {
                status, failures, ..
            } => {
                assert_eq!(status.as_deref(), Some("ROLLBACK_COMPLETE"));
                assert_eq!(failures.len(), 1);
                assert!(failures[0].reason.contains("already exists"));
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(manager
            .calls()
            .contains(&StackCall::ResourceFailures(STACK.to_string())));
    }

    #[tokio::test]
    async fn test_rollback_complete_is_rejected_and_left_alone() {
        let manager = MemoryStackManager::new();
        manager.seed_stack(
            settled_description(STACK, StackStatus::RollbackComplete, BTreeMap::new()),
            vec![],
        );
        let err = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap_err();
        match err {
            BootstrapError::ResourceGraphRejected { reason, .. } => {
                assert!(reason.contains("delete it"));
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(manager.submissions(), 0);
        assert_eq!(manager.status_of(STACK), Some(StackStatus::RollbackComplete));
    }

    #[tokio::test]
    async fn test_update_rollback_failed_needs_intervention() {
        let manager = MemoryStackManager::new();
        manager.seed_stack(
            settled_description(STACK, StackStatus::UpdateRollbackFailed, BTreeMap::new()),
            vec![],
        );
        let err = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UPDATE_ROLLBACK_FAILED"));
        assert_eq!(manager.submissions(), 0);
    }

    #[tokio::test]
    async fn test_in_progress_stack_is_waited_on_before_update() {
        let manager = MemoryStackManager::with_outputs(|_| {
            vec![StackOutput {
                key: "S3BucketName".into(),
                value: "b".into(),
                export_name: None,
            }]
        });
        manager.seed_stack(
            settled_description(STACK, StackStatus::CreateInProgress, params("b")),
            vec![StackStatus::CreateInProgress, StackStatus::CreateComplete],
        );

        let report = deployer(&manager)
            .deploy(&ResourceGraphTemplate::tfstate_backend(), STACK, params("b"))
            .await
            .unwrap();

        // The seeded stack has no template body, so the update is a real one.
        assert_eq!(report.change, DeployChange::Updated);
        let calls = manager.calls();
        let describes_before_update = calls
            .iter()
            .take_while(|c| !matches!(c, StackCall::Update(_)))
            .filter(|c| matches!(c, StackCall::Describe(_)))
            .count();
        assert_eq!(describes_before_update, 3);
        assert!(!calls.iter().any(|c| matches!(c, StackCall::Create(_))));
    }

    #[tokio::test]
    async fn test_failed_update_surfaces_status() {
        let manager = MemoryStackManager::new();
        let template = ResourceGraphTemplate::tfstate_backend();
        deployer(&manager)
            .deploy(&template, STACK, params("b"))
            .await
            .unwrap();

        manager.roll_back_next_deploy(vec![]);
        let err = deployer(&manager)
            .deploy(&template, STACK, params("c"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::ResourceGraphDeployFailed { ref status, .. }
                if status.as_deref() == Some("UPDATE_ROLLBACK_COMPLETE")
        ));
    }
}
