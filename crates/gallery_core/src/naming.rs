use crate::contract::ValidationError;

pub const MIN_BUCKET_NAME_LEN: usize = 3;
pub const MAX_BUCKET_NAME_LEN: usize = 63;
pub const MAX_ROLE_NAME_LEN: usize = 64;
pub const MAX_FUNCTION_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Bucket,
    Table,
    Function,
    Role,
    AccessPolicy,
    InvokePermission,
    NotificationConfig,
}

impl ResourceKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Bucket => "images",
            Self::Table => "metadata",
            Self::Function => "analyzer",
            Self::Role => "lambda-role",
            Self::AccessPolicy => "access-policy",
            Self::InvokePermission => "s3-invoke",
            Self::NotificationConfig => "object-created",
        }
    }
}

/// Names of every resource that belongs to one deployed stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub stack: String,
    pub bucket: String,
    pub table: String,
    pub function: String,
    pub role: String,
    pub access_policy: String,
    pub invoke_statement_id: String,
    pub notification_id: String,
}

impl ResourceNames {
    pub fn for_stack(stack: &str) -> Result<Self, ValidationError> {
        let stack = stack.trim();
        validate_stack_name(stack)?;

        let names = Self {
            stack: stack.to_string(),
            bucket: resource_name(stack, ResourceKind::Bucket),
            table: resource_name(stack, ResourceKind::Table),
            function: resource_name(stack, ResourceKind::Function),
            role: resource_name(stack, ResourceKind::Role),
            access_policy: resource_name(stack, ResourceKind::AccessPolicy),
            invoke_statement_id: resource_name(stack, ResourceKind::InvokePermission),
            notification_id: resource_name(stack, ResourceKind::NotificationConfig),
        };

        if names.bucket.len() < MIN_BUCKET_NAME_LEN || names.bucket.len() > MAX_BUCKET_NAME_LEN {
            return Err(ValidationError::new(format!(
                "bucket name '{}' must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters",
                names.bucket
            )));
        }
        if names.role.len() > MAX_ROLE_NAME_LEN {
            return Err(ValidationError::new(format!(
                "role name '{}' exceeds {MAX_ROLE_NAME_LEN} characters",
                names.role
            )));
        }
        if names.function.len() > MAX_FUNCTION_NAME_LEN {
            return Err(ValidationError::new(format!(
                "function name '{}' exceeds {MAX_FUNCTION_NAME_LEN} characters",
                names.function
            )));
        }

        Ok(names)
    }
}

pub fn resource_name(stack: &str, kind: ResourceKind) -> String {
    format!("{stack}-{}", kind.suffix())
}

/// `{project}-{unix_seconds}`, e.g. `ai-gallery-1763811658`.
pub fn generate_stack_name(project: &str, unix_seconds: u64) -> String {
    format!("{}-{unix_seconds}", project.trim().to_ascii_lowercase())
}

pub fn validate_stack_name(stack: &str) -> Result<(), ValidationError> {
    if stack.is_empty() {
        return Err(ValidationError::new("stack name cannot be empty"));
    }
    if !stack
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
    {
        return Err(ValidationError::new(format!(
            "stack name '{stack}' may only contain lowercase letters, digits and hyphens"
        )));
    }
    if stack.starts_with('-') || stack.ends_with('-') {
        return Err(ValidationError::new(format!(
            "stack name '{stack}' cannot start or end with a hyphen"
        )));
    }
    Ok(())
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

pub fn table_arn(region: &str, account_id: &str, table: &str) -> String {
    format!("arn:aws:dynamodb:{region}:{account_id}:table/{table}")
}

pub fn function_arn(region: &str, account_id: &str, function: &str) -> String {
    format!("arn:aws:lambda:{region}:{account_id}:function:{function}")
}

pub fn role_arn(account_id: &str, role: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role}")
}

pub fn log_group_arn_pattern(region: &str, account_id: &str) -> String {
    format!("arn:aws:logs:{region}:{account_id}:*")
}
