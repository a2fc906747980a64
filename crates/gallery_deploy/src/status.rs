use std::fmt;

use aws_sdk_s3::error::ProvideErrorMetadata;
use gallery_core::naming::ResourceNames;
use serde::Serialize;

use crate::clients::AwsClients;
use crate::error::{aws_error, is_not_found};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Present,
    Missing,
    Error,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Missing => "missing",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub resource: &'static str,
    pub name: String,
    pub state: ResourceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackStatus {
    pub stack: String,
    pub region: String,
    pub resources: Vec<ResourceStatus>,
}

impl StackStatus {
    pub fn is_healthy(&self) -> bool {
        self.resources
            .iter()
            .all(|resource| resource.state == ResourceState::Present)
    }

    pub fn trigger_connected(&self) -> bool {
        self.resources
            .iter()
            .any(|resource| resource.resource == "trigger" && resource.state == ResourceState::Present)
    }
}

/// Looks up every resource of the stack. Lookup failures are reported per
/// resource; none of them aborts the others.
pub async fn stack_status(clients: &AwsClients, names: &ResourceNames, region: &str) -> StackStatus {
    let resources = vec![
        bucket_status(&clients.s3, &names.bucket).await,
        table_status(&clients.dynamodb, &names.table).await,
        role_status(&clients.iam, &names.role).await,
        function_status(&clients.lambda, &names.function).await,
        trigger_status(&clients.s3, names).await,
    ];

    for resource in &resources {
        tracing::debug!(
            resource = resource.resource,
            name = %resource.name,
            state = %resource.state,
            "Checked resource"
        );
    }

    StackStatus {
        stack: names.stack.clone(),
        region: region.to_string(),
        resources,
    }
}

fn lookup_status<T, E>(
    resource: &'static str,
    name: &str,
    result: Result<T, E>,
    detail: impl FnOnce(T) -> Option<String>,
) -> ResourceStatus
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let (state, detail) = match result {
        Ok(output) => (ResourceState::Present, detail(output)),
        Err(error) if is_not_found(&error) => (ResourceState::Missing, None),
        Err(error) => (
            ResourceState::Error,
            Some(aws_error("status")(error).to_string()),
        ),
    };
    ResourceStatus {
        resource,
        name: name.to_string(),
        state,
        detail,
    }
}

pub async fn bucket_status(s3: &aws_sdk_s3::Client, bucket: &str) -> ResourceStatus {
    let result = s3.head_bucket().bucket(bucket).send().await;
    lookup_status("bucket", bucket, result, |_| None)
}

pub async fn table_status(dynamodb: &aws_sdk_dynamodb::Client, table: &str) -> ResourceStatus {
    let result = dynamodb.describe_table().table_name(table).send().await;
    lookup_status("table", table, result, |output| {
        output
            .table()
            .and_then(|table| table.table_status())
            .map(|status| status.as_str().to_string())
    })
}

pub async fn role_status(iam: &aws_sdk_iam::Client, role: &str) -> ResourceStatus {
    let result = iam.get_role().role_name(role).send().await;
    lookup_status("role", role, result, |_| None)
}

pub async fn function_status(lambda: &aws_sdk_lambda::Client, function: &str) -> ResourceStatus {
    let result = lambda.get_function().function_name(function).send().await;
    lookup_status("function", function, result, |output| {
        output
            .configuration()
            .and_then(|configuration| configuration.state())
            .map(|state| state.as_str().to_string())
    })
}

/// The trigger counts as present when the bucket notifies this stack's
/// function. A bucket without such a configuration reports it missing.
pub async fn trigger_status(s3: &aws_sdk_s3::Client, names: &ResourceNames) -> ResourceStatus {
    let function_suffix = format!(":function:{}", names.function);
    let result = s3
        .get_bucket_notification_configuration()
        .bucket(&names.bucket)
        .send()
        .await;

    let mut status = lookup_status("trigger", &names.notification_id, result, |output| {
        output
            .lambda_function_configurations()
            .iter()
            .map(|configuration| configuration.lambda_function_arn())
            .find(|arn| arn.ends_with(&function_suffix))
            .map(str::to_string)
    });
    if status.state == ResourceState::Present && status.detail.is_none() {
        status.state = ResourceState::Missing;
    }
    status
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::operation::describe_table::{DescribeTableError, DescribeTableOutput};
    use aws_sdk_dynamodb::types::{TableDescription, TableStatus};
    use aws_sdk_iam::operation::get_role::GetRoleError;
    use aws_sdk_lambda::operation::get_function::{GetFunctionError, GetFunctionOutput};
    use aws_sdk_lambda::types::{FunctionConfiguration, State};
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_bucket_notification_configuration::GetBucketNotificationConfigurationOutput;
    use aws_sdk_s3::operation::head_bucket::{HeadBucketError, HeadBucketOutput};
    use aws_sdk_s3::types::{Event, LambdaFunctionConfiguration};
    use aws_smithy_mocks::{mock, mock_client};

    use super::*;

    const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:demo-analyzer";

    fn names() -> ResourceNames {
        ResourceNames::for_stack("demo").expect("stack is valid")
    }

    fn coded(code: &str) -> ErrorMetadata {
        ErrorMetadata::builder().code(code).build()
    }

    fn notification_output(arn: &str) -> GetBucketNotificationConfigurationOutput {
        GetBucketNotificationConfigurationOutput::builder()
            .lambda_function_configurations(
                LambdaFunctionConfiguration::builder()
                    .lambda_function_arn(arn)
                    .events(Event::from("s3:ObjectCreated:*"))
                    .build()
                    .expect("configuration is complete"),
            )
            .build()
    }

    #[tokio::test]
    async fn reports_state_details_and_connected_trigger() {
        let head_rule = mock!(aws_sdk_s3::Client::head_bucket)
            .then_output(|| HeadBucketOutput::builder().build());
        let notification_rule =
            mock!(aws_sdk_s3::Client::get_bucket_notification_configuration)
                .match_requests(|req| req.bucket() == Some("demo-images"))
                .then_output(|| notification_output(FUNCTION_ARN));
        let s3 = mock_client!(aws_sdk_s3, [&head_rule, &notification_rule]);

        let describe_rule = mock!(aws_sdk_dynamodb::Client::describe_table).then_output(|| {
            DescribeTableOutput::builder()
                .table(
                    TableDescription::builder()
                        .table_status(TableStatus::Active)
                        .build(),
                )
                .build()
        });
        let dynamodb = mock_client!(aws_sdk_dynamodb, [&describe_rule]);

        let function_rule = mock!(aws_sdk_lambda::Client::get_function).then_output(|| {
            GetFunctionOutput::builder()
                .configuration(FunctionConfiguration::builder().state(State::Active).build())
                .build()
        });
        let lambda = mock_client!(aws_sdk_lambda, [&function_rule]);

        let table = table_status(&dynamodb, "demo-metadata").await;
        assert_eq!(table.state, ResourceState::Present);
        assert_eq!(table.detail.as_deref(), Some("ACTIVE"));

        let function = function_status(&lambda, "demo-analyzer").await;
        assert_eq!(function.state, ResourceState::Present);
        assert_eq!(function.detail.as_deref(), Some("Active"));

        assert_eq!(
            bucket_status(&s3, "demo-images").await.state,
            ResourceState::Present
        );
        let trigger = trigger_status(&s3, &names()).await;
        assert_eq!(trigger.state, ResourceState::Present);
        assert_eq!(trigger.detail.as_deref(), Some(FUNCTION_ARN));
    }

    #[tokio::test]
    async fn trigger_for_another_function_is_missing() {
        let notification_rule =
            mock!(aws_sdk_s3::Client::get_bucket_notification_configuration).then_output(|| {
                notification_output("arn:aws:lambda:us-east-1:123456789012:function:other")
            });
        let s3 = mock_client!(aws_sdk_s3, [&notification_rule]);

        let trigger = trigger_status(&s3, &names()).await;
        assert_eq!(trigger.state, ResourceState::Missing);
    }

    #[tokio::test]
    async fn torn_down_stack_reports_everything_missing() {
        let head_rule = mock!(aws_sdk_s3::Client::head_bucket)
            .then_error(|| HeadBucketError::generic(coded("NotFound")));
        let notification_rule =
            mock!(aws_sdk_s3::Client::get_bucket_notification_configuration).then_error(|| {
                aws_sdk_s3::operation::get_bucket_notification_configuration::GetBucketNotificationConfigurationError::generic(
                    coded("NoSuchBucket"),
                )
            });
        let describe_rule = mock!(aws_sdk_dynamodb::Client::describe_table)
            .then_error(|| DescribeTableError::generic(coded("ResourceNotFoundException")));
        let role_rule = mock!(aws_sdk_iam::Client::get_role)
            .then_error(|| GetRoleError::generic(coded("NoSuchEntity")));
        let function_rule = mock!(aws_sdk_lambda::Client::get_function)
            .then_error(|| GetFunctionError::generic(coded("AccessDeniedException")));
        let sts_rule = mock!(aws_sdk_sts::Client::get_caller_identity).then_output(|| {
            aws_sdk_sts::operation::get_caller_identity::GetCallerIdentityOutput::builder().build()
        });

        let clients = AwsClients {
            s3: mock_client!(aws_sdk_s3, [&head_rule, &notification_rule]),
            dynamodb: mock_client!(aws_sdk_dynamodb, [&describe_rule]),
            iam: mock_client!(aws_sdk_iam, [&role_rule]),
            lambda: mock_client!(aws_sdk_lambda, [&function_rule]),
            sts: mock_client!(aws_sdk_sts, [&sts_rule]),
        };

        let status = stack_status(&clients, &names(), "us-east-1").await;

        let states: Vec<(&str, ResourceState)> = status
            .resources
            .iter()
            .map(|resource| (resource.resource, resource.state))
            .collect();
        assert_eq!(
            states,
            vec![
                ("bucket", ResourceState::Missing),
                ("table", ResourceState::Missing),
                ("role", ResourceState::Missing),
                ("function", ResourceState::Error),
                ("trigger", ResourceState::Missing),
            ]
        );
        assert!(!status.is_healthy());
        assert!(!status.trigger_connected());
        assert!(status.resources[3]
            .detail
            .as_deref()
            .unwrap_or_default()
            .contains("AccessDeniedException"));
    }

    #[test]
    fn stack_is_healthy_only_when_every_resource_is_present() {
        let resource = |resource: &'static str, state| ResourceStatus {
            resource,
            name: format!("demo-{resource}"),
            state,
            detail: None,
        };
        let mut status = StackStatus {
            stack: "demo".to_string(),
            region: "us-east-1".to_string(),
            resources: vec![
                resource("bucket", ResourceState::Present),
                resource("table", ResourceState::Present),
                resource("role", ResourceState::Present),
                resource("function", ResourceState::Present),
                resource("trigger", ResourceState::Present),
            ],
        };
        assert!(status.is_healthy());
        assert!(status.trigger_connected());

        status.resources[4].state = ResourceState::Missing;
        assert!(!status.is_healthy());
        assert!(!status.trigger_connected());
    }
}
