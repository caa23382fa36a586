//! In-memory fake for the stack manager trait (testing only)
//!
//! `MemoryStackManager` keeps stacks in a `HashMap` and moves them through
//! their lifecycle one step per `describe_stack` call, so callers that poll
//! observe an in-progress state before the terminal one. Every trait call is
//! recorded for idempotence assertions.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StackError;
use crate::stack_traits::*;

/// Computes the outputs a stack would expose for a given request.
pub type OutputSynthesizer = Box<dyn Fn(&StackRequest) -> Vec<StackOutput> + Send + Sync>;

/// A call observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    ValidateTemplate,
    Describe(String),
    Create(String),
    Update(String),
    ResourceFailures(String),
}

#[derive(Debug)]
struct FakeStack {
    description: StackDescription,
    template_body: String,
    /// Statuses the stack moves through on subsequent describes
    pending: VecDeque<StackStatus>,
    /// Description to restore when a failed update rolls back
    rollback_to: Option<StackDescription>,
    failures: Vec<ResourceFailure>,
}

/// In-memory stack manager.
pub struct MemoryStackManager {
    stacks: Mutex<HashMap<String, FakeStack>>,
    calls: Mutex<Vec<StackCall>>,
    next_error: Mutex<Option<StackError>>,
    next_failure: Mutex<Option<Vec<ResourceFailure>>>,
    synthesize: OutputSynthesizer,
}

impl Default for MemoryStackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStackManager {
    /// A fake whose stacks expose no outputs.
    pub fn new() -> Self {
        Self::with_outputs(|_| Vec::new())
    }

    /// A fake whose stacks expose the outputs computed by `synthesize`.
    pub fn with_outputs<F>(synthesize: F) -> Self
    where
        F: Fn(&StackRequest) -> Vec<StackOutput> + Send + Sync + 'static,
    {
        Self {
            stacks: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            next_failure: Mutex::new(None),
            synthesize: Box::new(synthesize),
        }
    }

    /// Place a stack directly into the fake, e.g. one left mid-deploy by a
    /// killed run. It moves through `then` on subsequent describes.
    pub fn seed_stack(&self, description: StackDescription, then: Vec<StackStatus>) {
        let mut stacks = self.stacks.lock().unwrap();
        stacks.insert(
            description.stack_name.clone(),
            FakeStack {
                description,
                template_body: String::new(),
                pending: then.into(),
                rollback_to: None,
                failures: Vec::new(),
            },
        );
    }

    /// Make the next validate/create/update call fail with `error`.
    pub fn fail_next_call(&self, error: StackError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// Make the next submitted create/update roll back with these failures.
    pub fn roll_back_next_deploy(&self, failures: Vec<ResourceFailure>) {
        *self.next_failure.lock().unwrap() = Some(failures);
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<StackCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of create and update submissions observed.
    pub fn submissions(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, StackCall::Create(_) | StackCall::Update(_)))
            .count()
    }

    /// Current status of a stack without advancing it.
    pub fn status_of(&self, stack_name: &str) -> Option<StackStatus> {
        let stacks = self.stacks.lock().unwrap();
        stacks
            .get(stack_name)
            .map(|s| s.description.status.clone())
    }

    fn record(&self, call: StackCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_error(&self) -> StackResult<()> {
        match self.next_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn stack_id_for(name: &str) -> String {
    format!("arn:aws:cloudformation:us-east-1:123456789012:stack/{name}/fake")
}

#[async_trait]
impl StackManager for MemoryStackManager {
    async fn validate_template(&self, template_body: &str) -> StackResult<()> {
        self.record(StackCall::ValidateTemplate);
        self.take_error()?;
        if template_body.trim().is_empty() {
            return Err(StackError::Validation {
                message: "Template format error: empty template".to_string(),
            });
        }
        Ok(())
    }

    async fn describe_stack(&self, stack_name: &str) -> StackResult<Option<StackDescription>> {
        self.record(StackCall::Describe(stack_name.to_string()));
        let mut stacks = self.stacks.lock().unwrap();
        let Some(stack) = stacks.get_mut(stack_name) else {
            return Ok(None);
        };

        let snapshot = stack.description.clone();
        if let Some(next) = stack.pending.pop_front() {
            if next == StackStatus::UpdateRollbackComplete {
                if let Some(previous) = stack.rollback_to.take() {
                    stack.description.parameters = previous.parameters;
                    stack.description.outputs = previous.outputs;
                }
            }
            if !next.is_in_progress() && !next.is_complete() {
                stack.description.status_reason = Some(
                    "The following resource(s) failed to create or update".to_string(),
                );
            }
            stack.description.status = next;
        }
        Ok(Some(snapshot))
    }

    async fn create_stack(&self, request: &StackRequest) -> StackResult<String> {
        self.record(StackCall::Create(request.stack_name.clone()));
        self.take_error()?;

        let mut stacks = self.stacks.lock().unwrap();
        if stacks.contains_key(&request.stack_name) {
            return Err(StackError::AlreadyExists {
                message: format!("Stack [{}] already exists", request.stack_name),
            });
        }

        let failure = self.next_failure.lock().unwrap().take();
        let pending = match &failure {
            Some(_) => vec![StackStatus::RollbackInProgress, StackStatus::RollbackComplete],
            None => vec![StackStatus::CreateComplete],
        };

        let stack_id = stack_id_for(&request.stack_name);
        stacks.insert(
            request.stack_name.clone(),
            FakeStack {
                description: StackDescription {
                    stack_id: stack_id.clone(),
                    stack_name: request.stack_name.clone(),
                    status: StackStatus::CreateInProgress,
                    status_reason: None,
                    parameters: request.parameters.clone(),
                    outputs: if failure.is_some() {
                        Vec::new()
                    } else {
                        (self.synthesize)(request)
                    },
                },
                template_body: request.template_body.clone(),
                pending: pending.into(),
                rollback_to: None,
                failures: failure.unwrap_or_default(),
            },
        );
        Ok(stack_id)
    }

    async fn update_stack(&self, request: &StackRequest) -> StackResult<UpdateOutcome> {
        self.record(StackCall::Update(request.stack_name.clone()));
        self.take_error()?;

        let mut stacks = self.stacks.lock().unwrap();
        let Some(stack) = stacks.get_mut(&request.stack_name) else {
            return Err(StackError::Validation {
                message: format!("Stack with id {} does not exist", request.stack_name),
            });
        };

        if !stack.description.status.is_stable() {
            return Err(StackError::Validation {
                message: format!(
                    "Stack:{} is in {} state and can not be updated.",
                    request.stack_name, stack.description.status
                ),
            });
        }

        if stack.template_body == request.template_body
            && stack.description.parameters == request.parameters
        {
            return Ok(UpdateOutcome::NoChanges);
        }

        let failure = self.next_failure.lock().unwrap().take();
        let previous = stack.description.clone();
        stack.description.status = StackStatus::UpdateInProgress;
        stack.description.status_reason = None;
        stack.description.parameters = request.parameters.clone();
        stack.description.outputs = (self.synthesize)(request);
        stack.template_body = request.template_body.clone();
        stack.pending = match &failure {
            Some(_) => vec![
                StackStatus::UpdateRollbackInProgress,
                StackStatus::UpdateRollbackComplete,
            ],
            None => vec![
                StackStatus::UpdateCompleteCleanupInProgress,
                StackStatus::UpdateComplete,
            ],
        }
        .into();
        stack.rollback_to = failure.as_ref().map(|_| previous);
        stack.failures = failure.unwrap_or_default();

        Ok(UpdateOutcome::Submitted {
            stack_id: stack.description.stack_id.clone(),
        })
    }

    async fn resource_failures(&self, stack_name: &str) -> StackResult<Vec<ResourceFailure>> {
        self.record(StackCall::ResourceFailures(stack_name.to_string()));
        let stacks = self.stacks.lock().unwrap();
        Ok(stacks
            .get(stack_name)
            .map(|s| s.failures.clone())
            .unwrap_or_default())
    }
}

/// Convenience for seeding: a settled description with no outputs.
pub fn settled_description(
    stack_name: &str,
    status: StackStatus,
    parameters: BTreeMap<String, String>,
) -> StackDescription {
    StackDescription {
        stack_id: stack_id_for(stack_name),
        stack_name: stack_name.to_string(),
        status,
        status_reason: None,
        parameters,
        outputs: Vec::new(),
    }
}
