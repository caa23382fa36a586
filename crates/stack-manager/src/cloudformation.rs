//! CloudFormation-backed `StackManager`
//!
//! Thin translation layer over `aws-sdk-cloudformation`: requests are mapped
//! onto `CreateStack` / `UpdateStack` / `DescribeStacks`, and SDK errors are
//! classified into `StackError` by their service error code.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, StackEvent};
use aws_sdk_cloudformation::Client;
use tracing::{debug, info, instrument};

use crate::error::StackError;
use crate::stack_traits::*;

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";
const MISSING_STACK_MESSAGE: &str = "does not exist";
const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// `StackManager` backed by the AWS CloudFormation API.
#[derive(Clone)]
pub struct CloudFormationStackManager {
    client: Client,
}

impl CloudFormationStackManager {
    /// Wrap an existing SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default credential chain, pinned to `region`.
    pub async fn from_region(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        info!(region = %region, "CloudFormation client configured");
        Self::new(Client::new(&config))
    }
}

/// Region resolved by the default AWS configuration chain, if any.
pub async fn default_region() -> Option<String> {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    config.region().map(|r| r.to_string())
}

#[async_trait]
impl StackManager for CloudFormationStackManager {
    #[instrument(skip(self, template_body), fields(bytes = template_body.len()))]
    async fn validate_template(&self, template_body: &str) -> StackResult<()> {
        self.client
            .validate_template()
            .template_body(template_body)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn describe_stack(&self, stack_name: &str) -> StackResult<Option<StackDescription>> {
        let output = match self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let err = classify(err);
                if is_missing_stack(&err) {
                    debug!("stack does not exist");
                    return Ok(None);
                }
                return Err(err);
            }
        };

        Ok(output.stacks().first().map(to_description))
    }

    #[instrument(skip(self, request), fields(stack = %request.stack_name))]
    async fn create_stack(&self, request: &StackRequest) -> StackResult<String> {
        let output = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_parameters(Some(to_parameters(&request.parameters)))
            .capabilities(Capability::CapabilityNamedIam)
            .enable_termination_protection(request.termination_protection)
            .client_request_token(&request.client_request_token)
            .send()
            .await
            .map_err(classify)?;

        let stack_id = output.stack_id().unwrap_or(&request.stack_name).to_string();
        info!(stack_id = %stack_id, "stack create submitted");
        Ok(stack_id)
    }

    #[instrument(skip(self, request), fields(stack = %request.stack_name))]
    async fn update_stack(&self, request: &StackRequest) -> StackResult<UpdateOutcome> {
        let result = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_parameters(Some(to_parameters(&request.parameters)))
            .capabilities(Capability::CapabilityNamedIam)
            .client_request_token(&request.client_request_token)
            .send()
            .await;

        match result {
            Ok(output) => {
                let stack_id = output.stack_id().unwrap_or(&request.stack_name).to_string();
                info!(stack_id = %stack_id, "stack update submitted");
                Ok(UpdateOutcome::Submitted { stack_id })
            }
            Err(err) => {
                let err = classify(err);
                if is_no_updates(&err) {
                    info!("stack already matches desired state");
                    return Ok(UpdateOutcome::NoChanges);
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn resource_failures(&self, stack_name: &str) -> StackResult<Vec<ResourceFailure>> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(classify)?;

        Ok(failures_since_last_operation(stack_name, output.stack_events()))
    }
}

/// Failed resource events of the most recent create/update, oldest first.
///
/// `events` is newest first, as `DescribeStackEvents` returns them. The scan
/// stops at the stack's own `*_IN_PROGRESS` event that opened the operation,
/// so failures from earlier operations are not reported.
fn failures_since_last_operation(stack_name: &str, events: &[StackEvent]) -> Vec<ResourceFailure> {
    let mut failures = Vec::new();
    for event in events {
        let status = event.resource_status().map(|s| s.as_str()).unwrap_or_default();
        let logical_id = event.logical_resource_id().unwrap_or_default();
        let resource_type = event.resource_type().unwrap_or_default();

        if resource_type == STACK_RESOURCE_TYPE
            && logical_id == stack_name
            && (status == "CREATE_IN_PROGRESS" || status == "UPDATE_IN_PROGRESS")
        {
            break;
        }

        if status.ends_with("_FAILED") {
            failures.push(ResourceFailure {
                logical_id: logical_id.to_string(),
                resource_type: resource_type.to_string(),
                status: status.to_string(),
                reason: event
                    .resource_status_reason()
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    failures.reverse();
    failures
}

fn to_parameters(parameters: &BTreeMap<String, String>) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|(key, value)| {
            Parameter::builder()
                .parameter_key(key)
                .parameter_value(value)
                .build()
        })
        .collect()
}

fn to_description(stack: &Stack) -> StackDescription {
    let stack_name = stack.stack_name().unwrap_or_default().to_string();
    StackDescription {
        stack_id: stack.stack_id().unwrap_or(&stack_name).to_string(),
        status: stack
            .stack_status()
            .map(|s| StackStatus::from(s.as_str()))
            .unwrap_or_else(|| StackStatus::Unknown(String::new())),
        status_reason: stack.stack_status_reason().map(str::to_string),
        parameters: stack
            .parameters()
            .iter()
            .filter_map(|p| {
                Some((
                    p.parameter_key()?.to_string(),
                    p.parameter_value().unwrap_or_default().to_string(),
                ))
            })
            .collect(),
        outputs: stack
            .outputs()
            .iter()
            .filter_map(|o| {
                Some(StackOutput {
                    key: o.output_key()?.to_string(),
                    value: o.output_value().unwrap_or_default().to_string(),
                    export_name: o.export_name().map(str::to_string),
                })
            })
            .collect(),
        stack_name,
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> StackError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let context = DisplayErrorContext(&err).to_string();
    classify_code(err.code(), err.message(), context)
}

/// Map a service error code onto `StackError`. `context` is the rendered SDK
/// error, used when the service sent no message or no response at all.
fn classify_code(code: Option<&str>, message: Option<&str>, context: String) -> StackError {
    let Some(code) = code else {
        return StackError::Transport(context);
    };
    let message = message.map(str::to_string).unwrap_or(context);

    match code {
        "ValidationError" => StackError::Validation { message },
        "AlreadyExistsException" => StackError::AlreadyExists { message },
        "InsufficientCapabilitiesException" => StackError::InsufficientCapabilities { message },
        "AccessDenied" | "AccessDeniedException" => StackError::AccessDenied { message },
        "LimitExceededException" => StackError::LimitExceeded { message },
        code => StackError::Service {
            code: code.to_string(),
            message,
        },
    }
}

/// `UpdateStack` against a stack that already matches the request.
fn is_no_updates(err: &StackError) -> bool {
    matches!(err, StackError::Validation { message } if message.contains(NO_UPDATES_MESSAGE))
}

/// `DescribeStacks` for a name with no live stack.
fn is_missing_stack(err: &StackError) -> bool {
    matches!(err, StackError::Validation { message } if message.contains(MISSING_STACK_MESSAGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_cloudformation::types::{Output, ResourceStatus, StackStatus as CfnStackStatus};

    const STACK: &str = "contoso-cf-dataops-dev-tfstate";

    fn event(logical_id: &str, resource_type: &str, status: ResourceStatus) -> StackEvent {
        StackEvent::builder()
            .stack_name(STACK)
            .logical_resource_id(logical_id)
            .resource_type(resource_type)
            .resource_status(status)
            .resource_status_reason(format!("{logical_id} reason"))
            .build()
    }

    fn stack_event(status: ResourceStatus) -> StackEvent {
        event(STACK, STACK_RESOURCE_TYPE, status)
    }

    // ------------------------------------------------------------------
    // Error classification
    // ------------------------------------------------------------------

    #[test]
    fn test_classify_code_table() {
        let cases = [
            ("ValidationError", "Validation"),
            ("AlreadyExistsException", "AlreadyExists"),
            ("InsufficientCapabilitiesException", "InsufficientCapabilities"),
            ("AccessDenied", "AccessDenied"),
            ("AccessDeniedException", "AccessDenied"),
            ("LimitExceededException", "LimitExceeded"),
        ];
        for (code, expected) in cases {
            let err = classify_code(Some(code), Some("boom"), "ctx".into());
            let variant = match &err {
                StackError::Validation { message } => ("Validation", message),
                StackError::AlreadyExists { message } => ("AlreadyExists", message),
                StackError::InsufficientCapabilities { message } => {
                    ("InsufficientCapabilities", message)
                }
                StackError::AccessDenied { message } => ("AccessDenied", message),
                StackError::LimitExceeded { message } => ("LimitExceeded", message),
                other => panic!("{code} classified as {other:?}"),
            };
            assert_eq!(variant, (expected, &"boom".to_string()), "{code}");
        }
    }

    #[test]
    fn test_classify_unknown_code_keeps_code() {
        assert_eq!(
            classify_code(Some("Throttling"), Some("Rate exceeded"), "ctx".into()),
            StackError::Service {
                code: "Throttling".into(),
                message: "Rate exceeded".into(),
            }
        );
    }

    #[test]
    fn test_classify_without_message_uses_context() {
        assert_eq!(
            classify_code(Some("ValidationError"), None, "service error: ctx".into()),
            StackError::Validation {
                message: "service error: ctx".into()
            }
        );
    }

    #[test]
    fn test_classify_without_code_is_transport() {
        let err = classify_code(None, None, "dispatch failure: dns error".into());
        assert_eq!(err, StackError::Transport("dispatch failure: dns error".into()));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_no_updates_is_recognised() {
        let err = classify_code(
            Some("ValidationError"),
            Some("No updates are to be performed."),
            String::new(),
        );
        assert!(is_no_updates(&err));
        assert!(!is_missing_stack(&err));

        let other = classify_code(
            Some("ValidationError"),
            Some("Template format error: unsupported structure."),
            String::new(),
        );
        assert!(!is_no_updates(&other));

        // Same text under a non-validation code is a real failure.
        let access = classify_code(
            Some("AccessDenied"),
            Some("No updates are to be performed"),
            String::new(),
        );
        assert!(!is_no_updates(&access));
    }

    #[test]
    fn test_missing_stack_is_recognised() {
        let err = classify_code(
            Some("ValidationError"),
            Some(&format!("Stack with id {STACK} does not exist")),
            String::new(),
        );
        assert!(is_missing_stack(&err));
        assert!(!is_no_updates(&err));

        let denied = classify_code(
            Some("AccessDenied"),
            Some("User is not authorized to perform: cloudformation:DescribeStacks"),
            String::new(),
        );
        assert!(!is_missing_stack(&denied));
    }

    // ------------------------------------------------------------------
    // Stack description
    // ------------------------------------------------------------------

    #[test]
    fn test_to_description_maps_status_parameters_and_outputs() {
        let stack = Stack::builder()
            .stack_id("arn:aws:cloudformation:us-east-1:123456789012:stack/x/abc")
            .stack_name(STACK)
            .stack_status(CfnStackStatus::UpdateRollbackComplete)
            .stack_status_reason("rolled back")
            .parameters(
                Parameter::builder()
                    .parameter_key("StateBucket")
                    .parameter_value("contoso-cf-dataops-dev-tfstate")
                    .build(),
            )
            .outputs(
                Output::builder()
                    .output_key("StateBucketName")
                    .output_value("contoso-cf-dataops-dev-tfstate")
                    .export_name(format!("{STACK}-StateBucketName"))
                    .build(),
            )
            .outputs(Output::builder().output_value("orphan").build())
            .build();

        let desc = to_description(&stack);
        assert_eq!(desc.stack_name, STACK);
        assert!(desc.stack_id.starts_with("arn:aws:cloudformation:"));
        assert_eq!(desc.status, StackStatus::UpdateRollbackComplete);
        assert_eq!(desc.status_reason.as_deref(), Some("rolled back"));
        assert_eq!(
            desc.parameters.get("StateBucket").map(String::as_str),
            Some("contoso-cf-dataops-dev-tfstate")
        );
        // Outputs without a key are dropped.
        assert_eq!(desc.outputs.len(), 1);
        assert_eq!(
            desc.output("StateBucketName"),
            Some("contoso-cf-dataops-dev-tfstate")
        );
        assert_eq!(
            desc.outputs[0].export_name.as_deref(),
            Some("contoso-cf-dataops-dev-tfstate-StateBucketName")
        );
    }

    #[test]
    fn test_to_description_defaults_missing_fields() {
        let desc = to_description(&Stack::builder().stack_name(STACK).build());
        assert_eq!(desc.stack_id, STACK);
        assert_eq!(desc.status, StackStatus::Unknown(String::new()));
        assert!(desc.status_reason.is_none());
        assert!(desc.parameters.is_empty());
        assert!(desc.outputs.is_empty());
    }

    #[test]
    fn test_to_parameters_preserves_pairs() {
        let params = BTreeMap::from([
            ("Environment".to_string(), "dev".to_string()),
            ("Tenant".to_string(), "dataops".to_string()),
        ]);
        let converted = to_parameters(&params);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].parameter_key(), Some("Environment"));
        assert_eq!(converted[0].parameter_value(), Some("dev"));
        assert_eq!(converted[1].parameter_key(), Some("Tenant"));
    }

    // ------------------------------------------------------------------
    // Resource failures
    // ------------------------------------------------------------------

    #[test]
    fn test_failures_stop_at_operation_start() {
        // Newest first: a failed update, then the update's opening event,
        // then an older create that also failed.
        let events = vec![
            stack_event(ResourceStatus::UpdateRollbackComplete),
            event("StateLockTable", "AWS::DynamoDB::Table", ResourceStatus::UpdateFailed),
            event("StateBucketResource", "AWS::S3::Bucket", ResourceStatus::UpdateFailed),
            event("StateBucketResource", "AWS::S3::Bucket", ResourceStatus::UpdateInProgress),
            stack_event(ResourceStatus::UpdateInProgress),
            event("GitHubOIDCProvider", "Custom::Old", ResourceStatus::CreateFailed),
            stack_event(ResourceStatus::CreateInProgress),
        ];

        let failures = failures_since_last_operation(STACK, &events);
        let ids: Vec<&str> = failures.iter().map(|f| f.logical_id.as_str()).collect();
        assert_eq!(ids, ["StateBucketResource", "StateLockTable"]);
        assert_eq!(failures[0].resource_type, "AWS::S3::Bucket");
        assert_eq!(failures[0].status, "UPDATE_FAILED");
        assert_eq!(failures[0].reason, "StateBucketResource reason");
    }

    #[test]
    fn test_failures_ignore_in_progress_of_nested_resources() {
        // A nested resource named like the stack is not the opening event.
        let events = vec![
            event("StateLockTable", "AWS::DynamoDB::Table", ResourceStatus::CreateFailed),
            event(STACK, "AWS::S3::Bucket", ResourceStatus::CreateInProgress),
            event("AccessLogBucket", "AWS::S3::Bucket", ResourceStatus::CreateFailed),
            stack_event(ResourceStatus::CreateInProgress),
        ];

        let failures = failures_since_last_operation(STACK, &events);
        let ids: Vec<&str> = failures.iter().map(|f| f.logical_id.as_str()).collect();
        assert_eq!(ids, ["AccessLogBucket", "StateLockTable"]);
    }

    #[test]
    fn test_failures_empty_when_nothing_failed() {
        let events = vec![
            stack_event(ResourceStatus::CreateComplete),
            event("StateBucketResource", "AWS::S3::Bucket", ResourceStatus::CreateComplete),
            stack_event(ResourceStatus::CreateInProgress),
        ];
        assert!(failures_since_last_operation(STACK, &events).is_empty());
        assert!(failures_since_last_operation(STACK, &[]).is_empty());
    }
}
