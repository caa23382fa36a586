//! Stack manager trait definitions
//!
//! `StackManager` is the seam between the bootstrap workflow and the cloud
//! resource manager. It exposes exactly the calls the deployer needs:
//! validate a template, describe a stack, submit a create or an update, and
//! read back why the last operation failed.
//!
//! Implementations must not wait: they submit and return. Waiting for a
//! terminal state is the caller's job (see `StackStatus::is_in_progress`).
//! In-memory fakes are provided via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StackError;

/// Result type for stack operations
pub type StackResult<T> = std::result::Result<T, StackError>;

// ---------------------------------------------------------------------------
// StackStatus
// ---------------------------------------------------------------------------

/// Coarse lifecycle of a stack as seen by the bootstrap workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Complete,
    Failed,
}

/// CloudFormation stack status.
///
/// Unrecognised values are kept verbatim in `Unknown` so that a newer
/// service status never turns into a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StackStatus {
    CreateInProgress,
    CreateFailed,
    CreateComplete,
    RollbackInProgress,
    RollbackFailed,
    RollbackComplete,
    DeleteInProgress,
    DeleteFailed,
    DeleteComplete,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackFailed,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    ReviewInProgress,
    ImportInProgress,
    ImportComplete,
    ImportRollbackInProgress,
    ImportRollbackFailed,
    ImportRollbackComplete,
    Unknown(String),
}

impl StackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StackStatus::CreateInProgress => "CREATE_IN_PROGRESS",
            StackStatus::CreateFailed => "CREATE_FAILED",
            StackStatus::CreateComplete => "CREATE_COMPLETE",
            StackStatus::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            StackStatus::RollbackFailed => "ROLLBACK_FAILED",
            StackStatus::RollbackComplete => "ROLLBACK_COMPLETE",
            StackStatus::DeleteInProgress => "DELETE_IN_PROGRESS",
            StackStatus::DeleteFailed => "DELETE_FAILED",
            StackStatus::DeleteComplete => "DELETE_COMPLETE",
            StackStatus::UpdateInProgress => "UPDATE_IN_PROGRESS",
            StackStatus::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            StackStatus::UpdateComplete => "UPDATE_COMPLETE",
            StackStatus::UpdateFailed => "UPDATE_FAILED",
            StackStatus::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            StackStatus::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            StackStatus::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            StackStatus::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            StackStatus::ReviewInProgress => "REVIEW_IN_PROGRESS",
            StackStatus::ImportInProgress => "IMPORT_IN_PROGRESS",
            StackStatus::ImportComplete => "IMPORT_COMPLETE",
            StackStatus::ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
            StackStatus::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            StackStatus::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
            StackStatus::Unknown(raw) => raw,
        }
    }

    /// The manager is still working on the stack and will move it on its own.
    ///
    /// `REVIEW_IN_PROGRESS` is excluded: it only moves when someone executes
    /// a pending change set, so waiting on it would never end.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, StackStatus::ReviewInProgress) && self.as_str().ends_with("_IN_PROGRESS")
    }

    /// The last submitted operation succeeded and outputs are current.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateComplete | StackStatus::UpdateComplete | StackStatus::ImportComplete
        )
    }

    pub fn phase(&self) -> StackPhase {
        if self.is_in_progress() {
            StackPhase::InProgress
        } else if self.is_complete() {
            StackPhase::Complete
        } else {
            StackPhase::Failed
        }
    }

    /// Settled states in which the stack is usable and CloudFormation accepts
    /// an `UpdateStack`.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            StackStatus::CreateComplete
                | StackStatus::UpdateComplete
                | StackStatus::UpdateRollbackComplete
                | StackStatus::ImportComplete
                | StackStatus::ImportRollbackComplete
        )
    }
}

impl From<&str> for StackStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "CREATE_IN_PROGRESS" => StackStatus::CreateInProgress,
            "CREATE_FAILED" => StackStatus::CreateFailed,
            "CREATE_COMPLETE" => StackStatus::CreateComplete,
            "ROLLBACK_IN_PROGRESS" => StackStatus::RollbackInProgress,
            "ROLLBACK_FAILED" => StackStatus::RollbackFailed,
            "ROLLBACK_COMPLETE" => StackStatus::RollbackComplete,
            "DELETE_IN_PROGRESS" => StackStatus::DeleteInProgress,
            "DELETE_FAILED" => StackStatus::DeleteFailed,
            "DELETE_COMPLETE" => StackStatus::DeleteComplete,
            "UPDATE_IN_PROGRESS" => StackStatus::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => StackStatus::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => StackStatus::UpdateComplete,
            "UPDATE_FAILED" => StackStatus::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => StackStatus::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_FAILED" => StackStatus::UpdateRollbackFailed,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                StackStatus::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => StackStatus::UpdateRollbackComplete,
            "REVIEW_IN_PROGRESS" => StackStatus::ReviewInProgress,
            "IMPORT_IN_PROGRESS" => StackStatus::ImportInProgress,
            "IMPORT_COMPLETE" => StackStatus::ImportComplete,
            "IMPORT_ROLLBACK_IN_PROGRESS" => StackStatus::ImportRollbackInProgress,
            "IMPORT_ROLLBACK_FAILED" => StackStatus::ImportRollbackFailed,
            "IMPORT_ROLLBACK_COMPLETE" => StackStatus::ImportRollbackComplete,
            other => StackStatus::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Requests and descriptions
// ---------------------------------------------------------------------------

/// Desired state submitted to the manager for one named stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_body: String,
    /// Template parameters, keyed by the template's parameter names
    pub parameters: BTreeMap<String, String>,
    /// Idempotency token; a retried submission with the same token is
    /// treated by the manager as the same request
    pub client_request_token: String,
    /// Only honoured on create
    pub termination_protection: bool,
}

/// A single stack output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    pub export_name: Option<String>,
}

/// Snapshot of a stack as reported by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub stack_id: String,
    pub stack_name: String,
    pub status: StackStatus,
    pub status_reason: Option<String>,
    pub parameters: BTreeMap<String, String>,
    pub outputs: Vec<StackOutput>,
}

impl StackDescription {
    /// Look up an output value by key.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }
}

/// Result of submitting an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was accepted and the stack is now transitioning
    Submitted { stack_id: String },
    /// Desired state equals current state; nothing was submitted
    NoChanges,
}

/// One resource that failed during the stack's most recent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: String,
}

impl std::fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) {}: {}",
            self.logical_id, self.resource_type, self.status, self.reason
        )
    }
}

// ---------------------------------------------------------------------------
// StackManager
// ---------------------------------------------------------------------------

/// Cloud resource manager seam.
///
/// Guarantees expected from implementations:
/// - `describe_stack` returns `Ok(None)` for a stack that does not exist
///   (never an error).
/// - `create_stack` fails with `StackError::AlreadyExists` if the name is taken.
/// - `update_stack` returns `UpdateOutcome::NoChanges` rather than an error
///   when the submitted template and parameters match the deployed ones.
/// - Ordering between resources is resolved by the manager from the
///   template's declared dependencies.
#[async_trait]
pub trait StackManager: Send + Sync {
    /// Check a template body without deploying it.
    async fn validate_template(&self, template_body: &str) -> StackResult<()>;

    /// Describe a stack by name, `None` if it does not exist.
    async fn describe_stack(&self, stack_name: &str) -> StackResult<Option<StackDescription>>;

    /// Submit a new stack, returning its stack id.
    async fn create_stack(&self, request: &StackRequest) -> StackResult<String>;

    /// Submit an update to an existing stack.
    async fn update_stack(&self, request: &StackRequest) -> StackResult<UpdateOutcome>;

    /// Failed resource events of the stack's most recent operation, oldest first.
    async fn resource_failures(&self, stack_name: &str) -> StackResult<Vec<ResourceFailure>>;
}
