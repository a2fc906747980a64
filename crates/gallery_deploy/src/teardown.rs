use std::fmt;

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use gallery_core::naming::ResourceNames;
use serde::Serialize;

use crate::clients::AwsClients;
use crate::error::{aws_error, is_not_found, DeployError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOutcome {
    Deleted,
    Absent,
    Failed,
}

impl fmt::Display for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deleted => "deleted",
            Self::Absent => "absent",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub resource: &'static str,
    pub name: String,
    pub outcome: ResourceOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub stack: String,
    pub resources: Vec<ResourceReport>,
}

impl TeardownReport {
    fn new(stack: &str) -> Self {
        Self {
            stack: stack.to_string(),
            resources: Vec::new(),
        }
    }

    fn record(
        &mut self,
        resource: &'static str,
        name: &str,
        result: Result<ResourceOutcome, DeployError>,
    ) {
        let (outcome, detail) = match result {
            Ok(outcome) => {
                tracing::info!(resource, name, %outcome, "Teardown step finished");
                (outcome, None)
            }
            Err(error) => {
                tracing::error!(resource, name, error = %error, "Teardown step failed");
                (ResourceOutcome::Failed, Some(error.to_string()))
            }
        };
        self.resources.push(ResourceReport {
            resource,
            name: name.to_string(),
            outcome,
            detail,
        });
    }

    pub fn failed_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|report| report.outcome == ResourceOutcome::Failed)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn into_result(self) -> Result<Self, DeployError> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(DeployError::Teardown {
                failed: self.failed_count(),
                stack: self.stack,
            })
        }
    }
}

/// Deletes the stack in reverse dependency order. Every resource is attempted
/// even when an earlier one fails.
pub async fn teardown(clients: &AwsClients, names: &ResourceNames) -> TeardownReport {
    tracing::info!(stack = %names.stack, "Tearing down stack");
    let mut report = TeardownReport::new(&names.stack);

    let result = delete_function(&clients.lambda, &names.function).await;
    report.record("function", &names.function, result);

    let result = delete_role_policy(&clients.iam, &names.role, &names.access_policy).await;
    report.record("role_policy", &names.access_policy, result);

    let result = delete_role(&clients.iam, &names.role).await;
    report.record("role", &names.role, result);

    let result = delete_bucket(&clients.s3, &names.bucket).await;
    report.record("bucket", &names.bucket, result);

    let result = delete_table(&clients.dynamodb, &names.table).await;
    report.record("table", &names.table, result);

    report
}

fn deletion_outcome<T, E>(
    result: Result<T, E>,
    step: &'static str,
) -> Result<ResourceOutcome, DeployError>
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match result {
        Ok(_) => Ok(ResourceOutcome::Deleted),
        Err(error) if is_not_found(&error) => Ok(ResourceOutcome::Absent),
        Err(error) => Err(aws_error(step)(error)),
    }
}

pub async fn delete_function(
    lambda: &aws_sdk_lambda::Client,
    function: &str,
) -> Result<ResourceOutcome, DeployError> {
    let result = lambda.delete_function().function_name(function).send().await;
    deletion_outcome(result, "delete function")
}

pub async fn delete_role_policy(
    iam: &aws_sdk_iam::Client,
    role: &str,
    policy: &str,
) -> Result<ResourceOutcome, DeployError> {
    let result = iam
        .delete_role_policy()
        .role_name(role)
        .policy_name(policy)
        .send()
        .await;
    deletion_outcome(result, "delete role policy")
}

pub async fn delete_role(
    iam: &aws_sdk_iam::Client,
    role: &str,
) -> Result<ResourceOutcome, DeployError> {
    let result = iam.delete_role().role_name(role).send().await;
    deletion_outcome(result, "delete role")
}

pub async fn delete_table(
    dynamodb: &aws_sdk_dynamodb::Client,
    table: &str,
) -> Result<ResourceOutcome, DeployError> {
    let result = dynamodb.delete_table().table_name(table).send().await;
    deletion_outcome(result, "delete table")
}

/// A bucket has to be empty before it can be deleted.
pub async fn delete_bucket(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
) -> Result<ResourceOutcome, DeployError> {
    match empty_bucket(s3, bucket).await {
        Ok(removed) => {
            tracing::info!(bucket, removed, "Bucket emptied");
        }
        Err(EmptyBucketError::Missing) => return Ok(ResourceOutcome::Absent),
        Err(EmptyBucketError::Failed(error)) => return Err(error),
    }

    let result = s3.delete_bucket().bucket(bucket).send().await;
    deletion_outcome(result, "delete bucket")
}

enum EmptyBucketError {
    Missing,
    Failed(DeployError),
}

/// Deletes every object page by page. A listing page holds at most 1000
/// keys, which is also the `DeleteObjects` batch limit.
async fn empty_bucket(s3: &aws_sdk_s3::Client, bucket: &str) -> Result<usize, EmptyBucketError> {
    const STEP: &str = "empty bucket";

    let mut removed = 0usize;
    let mut continuation_token: Option<String> = None;
    loop {
        let page = match s3
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token.take())
            .send()
            .await
        {
            Ok(page) => page,
            Err(error) if is_not_found(&error) => return Err(EmptyBucketError::Missing),
            Err(error) => return Err(EmptyBucketError::Failed(aws_error(STEP)(error))),
        };

        let mut objects = Vec::with_capacity(page.contents().len());
        for object in page.contents() {
            let Some(key) = object.key() else {
                continue;
            };
            let identifier = ObjectIdentifier::builder()
                .key(key)
                .build()
                .map_err(|error| EmptyBucketError::Failed(aws_error(STEP)(error)))?;
            objects.push(identifier);
        }

        if !objects.is_empty() {
            let batch_len = objects.len();
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|error| EmptyBucketError::Failed(aws_error(STEP)(error)))?;
            let output = s3
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|error| EmptyBucketError::Failed(aws_error(STEP)(error)))?;
            if let Some(failure) = output.errors().first() {
                return Err(EmptyBucketError::Failed(DeployError::Aws {
                    step: STEP,
                    message: format!(
                        "{} object(s) could not be deleted, first {}: {}",
                        output.errors().len(),
                        failure.key().unwrap_or("<unknown>"),
                        failure.message().unwrap_or("no message")
                    ),
                }));
            }
            removed += batch_len;
        }

        match page.next_continuation_token() {
            Some(token) if page.is_truncated().unwrap_or(false) => {
                continuation_token = Some(token.to_string());
            }
            _ => return Ok(removed),
        }
    }
}
