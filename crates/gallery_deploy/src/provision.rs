use std::fs;
use std::path::{Path, PathBuf};

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType, TableStatus,
};
use aws_sdk_lambda::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::operation::create_function::CreateFunctionError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Architecture, Environment, FunctionCode, Runtime, State};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Event, LambdaFunctionConfiguration,
    NotificationConfiguration,
};
use chrono::Utc;
use gallery_core::contract::{
    DeploymentManifest, IMAGE_ID_ATTRIBUTE, MANIFEST_SCHEMA_VERSION, MODEL_ID_ENV, TABLE_NAME_ENV,
};
use gallery_core::naming::{bucket_arn, function_arn, role_arn, ResourceNames};
use gallery_core::policy::{
    lambda_access_policy, lambda_trust_policy, render_policy, INVOKE_FUNCTION_ACTION,
    S3_SERVICE_PRINCIPAL,
};
use gallery_core::retry::RetryPolicy;

use crate::clients::AwsClients;
use crate::error::{aws_error, DeployError};
use crate::retry::{poll_until, retry_when, retry_with_policy};

pub const LAMBDA_RUNTIME: &str = "provided.al2023";
pub const LAMBDA_HANDLER: &str = "bootstrap";
pub const OBJECT_CREATED_EVENT: &str = "s3:ObjectCreated:*";
pub const DEFAULT_MEMORY_MB: i32 = 256;
pub const DEFAULT_TIMEOUT_SECS: i32 = 60;
/// Direct-upload limit for `CreateFunction` zip payloads.
pub const MAX_DIRECT_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// Error code `CreateFunction` returns while the execution role propagates.
pub const ROLE_NOT_READY_CODE: &str = "InvalidParameterValueException";
/// S3 needs no location constraint in its home region.
const S3_HOME_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LambdaArchitecture {
    #[value(name = "x86_64")]
    X86_64,
    Arm64,
}

impl LambdaArchitecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub stack: String,
    pub region: String,
    pub model_id: String,
    pub package: PathBuf,
    pub architecture: LambdaArchitecture,
    pub memory_mb: i32,
    pub timeout_secs: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionPolicies {
    pub role_propagation: RetryPolicy,
    pub trigger_registration: RetryPolicy,
    pub activation_poll: RetryPolicy,
}

impl Default for ProvisionPolicies {
    fn default() -> Self {
        Self {
            role_propagation: RetryPolicy::role_propagation(),
            trigger_registration: RetryPolicy::trigger_registration(),
            activation_poll: RetryPolicy::activation_poll(),
        }
    }
}

/// Creates every resource of the stack in dependency order and returns the
/// manifest describing it. Stops at the first failing step.
pub async fn deploy(
    clients: &AwsClients,
    options: &DeployOptions,
    policies: &ProvisionPolicies,
) -> Result<DeploymentManifest, DeployError> {
    let names = ResourceNames::for_stack(&options.stack)?;
    let package = read_package(&options.package)?;

    tracing::info!(stack = %names.stack, region = %options.region, "Deploying stack");

    let account_id = resolve_account_id(&clients.sts).await?;
    tracing::info!(account_id = %account_id, "Resolved caller account");

    create_bucket(&clients.s3, &names.bucket, &options.region).await?;
    tracing::info!(bucket = %names.bucket, "Bucket created");

    create_table(&clients.dynamodb, &names.table, policies.activation_poll).await?;
    tracing::info!(table = %names.table, "Table active");

    let role_arn = create_role(&clients.iam, &names, &options.region, &account_id).await?;
    tracing::info!(role = %names.role, "Execution role created");

    let function_arn = create_function(
        &clients.lambda,
        &names,
        options,
        &role_arn,
        &account_id,
        package,
        policies.role_propagation,
    )
    .await?;
    wait_for_function_active(&clients.lambda, &names.function, policies.activation_poll).await?;
    tracing::info!(function = %names.function, "Function active");

    grant_bucket_invoke(&clients.lambda, &names, &account_id).await?;
    register_trigger(
        &clients.s3,
        &names,
        &function_arn,
        policies.trigger_registration,
    )
    .await?;
    tracing::info!(bucket = %names.bucket, function = %names.function, "Trigger connected");

    Ok(DeploymentManifest {
        stack: names.stack.clone(),
        region: options.region.clone(),
        account_id,
        model_id: options.model_id.clone(),
        bucket: names.bucket,
        table: names.table,
        function_name: names.function,
        function_arn,
        role_name: names.role,
        role_arn,
        deployed_at: Utc::now().to_rfc3339(),
        schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
    })
}

/// Reads the function zip and checks it can be uploaded inline.
pub fn read_package(path: &Path) -> Result<Vec<u8>, DeployError> {
    let bytes = fs::read(path).map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if !bytes.starts_with(ZIP_MAGIC) {
        return Err(DeployError::validation(format!(
            "function package {} is not a zip archive (build it with `cargo run -p xtask -- lambda-package`)",
            path.display()
        )));
    }
    if bytes.len() > MAX_DIRECT_UPLOAD_BYTES {
        return Err(DeployError::validation(format!(
            "function package {} is {} bytes, above the {MAX_DIRECT_UPLOAD_BYTES} byte upload limit",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub async fn resolve_account_id(sts: &aws_sdk_sts::Client) -> Result<String, DeployError> {
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .map_err(aws_error("resolve account"))?;
    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| DeployError::Aws {
            step: "resolve account",
            message: "caller identity has no account id".to_string(),
        })
}

pub async fn create_bucket(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    region: &str,
) -> Result<(), DeployError> {
    let mut request = s3.create_bucket().bucket(bucket);
    if region != S3_HOME_REGION {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }
    request
        .send()
        .await
        .map(|_| ())
        .map_err(aws_error("create bucket"))
}

pub async fn create_table(
    dynamodb: &aws_sdk_dynamodb::Client,
    table: &str,
    activation_poll: RetryPolicy,
) -> Result<(), DeployError> {
    const STEP: &str = "create table";

    let key_attribute = AttributeDefinition::builder()
        .attribute_name(IMAGE_ID_ATTRIBUTE)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(aws_error(STEP))?;
    let key_schema = KeySchemaElement::builder()
        .attribute_name(IMAGE_ID_ATTRIBUTE)
        .key_type(KeyType::Hash)
        .build()
        .map_err(aws_error(STEP))?;

    dynamodb
        .create_table()
        .table_name(table)
        .attribute_definitions(key_attribute)
        .key_schema(key_schema)
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await
        .map_err(aws_error(STEP))?;

    poll_until(activation_poll, &format!("table {table}"), || async move {
        let description = dynamodb
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(aws_error("describe table"))?;
        let active = description
            .table()
            .and_then(|table| table.table_status())
            .map(|status| *status == TableStatus::Active)
            .unwrap_or(false);
        Ok(active.then_some(()))
    })
    .await
}

pub async fn create_role(
    iam: &aws_sdk_iam::Client,
    names: &ResourceNames,
    region: &str,
    account_id: &str,
) -> Result<String, DeployError> {
    iam.create_role()
        .role_name(&names.role)
        .assume_role_policy_document(render_policy(&lambda_trust_policy()))
        .description(format!("Execution role for {}", names.function))
        .send()
        .await
        .map_err(aws_error("create role"))?;

    attach_access_policy(iam, names, region, account_id).await?;
    Ok(role_arn(account_id, &names.role))
}

pub async fn attach_access_policy(
    iam: &aws_sdk_iam::Client,
    names: &ResourceNames,
    region: &str,
    account_id: &str,
) -> Result<(), DeployError> {
    iam.put_role_policy()
        .role_name(&names.role)
        .policy_name(&names.access_policy)
        .policy_document(render_policy(&lambda_access_policy(
            names, region, account_id,
        )))
        .send()
        .await
        .map(|_| ())
        .map_err(aws_error("attach role policy"))
}

/// A new role is not assumable by Lambda right away; until it is,
/// `CreateFunction` fails with [`ROLE_NOT_READY_CODE`] and is retried.
/// Every other error aborts at once.
pub async fn create_function(
    lambda: &aws_sdk_lambda::Client,
    names: &ResourceNames,
    options: &DeployOptions,
    role_arn: &str,
    account_id: &str,
    package: Vec<u8>,
    role_propagation: RetryPolicy,
) -> Result<String, DeployError> {
    const STEP: &str = "create function";

    let created = retry_when(
        role_propagation,
        STEP,
        |attempt| {
            tracing::debug!(function = %names.function, attempt, "Creating function");
            let request = lambda
                .create_function()
                .function_name(&names.function)
                .runtime(Runtime::from(LAMBDA_RUNTIME))
                .handler(LAMBDA_HANDLER)
                .role(role_arn)
                .architectures(Architecture::from(options.architecture.as_str()))
                .memory_size(options.memory_mb)
                .timeout(options.timeout_secs)
                .code(FunctionCode::builder().zip_file(Blob::new(package.clone())).build())
                .environment(
                    Environment::builder()
                        .variables(TABLE_NAME_ENV, &names.table)
                        .variables(MODEL_ID_ENV, &options.model_id)
                        .build(),
                );
            async move { request.send().await }
        },
        |error: &SdkError<CreateFunctionError>| error.code() == Some(ROLE_NOT_READY_CODE),
        |error| aws_error(STEP)(error),
    )
    .await?;

    Ok(created
        .function_arn()
        .map(str::to_string)
        .unwrap_or_else(|| function_arn(&options.region, account_id, &names.function)))
}

pub async fn wait_for_function_active(
    lambda: &aws_sdk_lambda::Client,
    function: &str,
    activation_poll: RetryPolicy,
) -> Result<(), DeployError> {
    poll_until(activation_poll, &format!("function {function}"), || async move {
        let configuration = lambda
            .get_function_configuration()
            .function_name(function)
            .send()
            .await
            .map_err(aws_error("describe function"))?;
        match configuration.state() {
            Some(State::Active) => Ok(Some(())),
            Some(State::Failed) => Err(DeployError::Aws {
                step: "create function",
                message: format!(
                    "function entered Failed state: {}",
                    configuration.state_reason().unwrap_or("no reason given")
                ),
            }),
            _ => Ok(None),
        }
    })
    .await
}

pub async fn grant_bucket_invoke(
    lambda: &aws_sdk_lambda::Client,
    names: &ResourceNames,
    account_id: &str,
) -> Result<(), DeployError> {
    lambda
        .add_permission()
        .function_name(&names.function)
        .statement_id(&names.invoke_statement_id)
        .action(INVOKE_FUNCTION_ACTION)
        .principal(S3_SERVICE_PRINCIPAL)
        .source_arn(bucket_arn(&names.bucket))
        .source_account(account_id)
        .send()
        .await
        .map(|_| ())
        .map_err(aws_error("grant bucket invoke"))
}

/// S3 validates the destination when the configuration is written and rejects
/// it until the invoke permission has propagated.
pub async fn register_trigger(
    s3: &aws_sdk_s3::Client,
    names: &ResourceNames,
    function_arn: &str,
    trigger_registration: RetryPolicy,
) -> Result<(), DeployError> {
    const STEP: &str = "register bucket trigger";

    retry_with_policy(trigger_registration, STEP, |_| {
        let configuration = LambdaFunctionConfiguration::builder()
            .id(&names.notification_id)
            .lambda_function_arn(function_arn)
            .events(Event::from(OBJECT_CREATED_EVENT))
            .build();
        let request = s3
            .put_bucket_notification_configuration()
            .bucket(&names.bucket);
        async move {
            let configuration = configuration.map_err(aws_error(STEP))?;
            request
                .notification_configuration(
                    NotificationConfiguration::builder()
                        .lambda_function_configurations(configuration)
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(aws_error(STEP))
        }
    })
    .await
}
