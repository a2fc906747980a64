//! IAM documents attached to the caption function's execution role.

use serde_json::{json, Value};

use crate::naming::{bucket_arn, log_group_arn_pattern, table_arn, ResourceNames};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const S3_SERVICE_PRINCIPAL: &str = "s3.amazonaws.com";
pub const INVOKE_FUNCTION_ACTION: &str = "lambda:InvokeFunction";

pub fn lambda_trust_policy() -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": LAMBDA_SERVICE_PRINCIPAL },
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

pub fn lambda_access_policy(names: &ResourceNames, region: &str, account_id: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Sid": "WriteLogs",
                "Effect": "Allow",
                "Action": [
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents"
                ],
                "Resource": log_group_arn_pattern(region, account_id)
            },
            {
                "Sid": "ReadImages",
                "Effect": "Allow",
                "Action": "s3:GetObject",
                "Resource": format!("{}/*", bucket_arn(&names.bucket))
            },
            {
                "Sid": "WriteMetadata",
                "Effect": "Allow",
                "Action": "dynamodb:PutItem",
                "Resource": table_arn(region, account_id, &names.table)
            },
            {
                "Sid": "InvokeModel",
                "Effect": "Allow",
                "Action": "bedrock:InvokeModel",
                "Resource": "*"
            }
        ]
    })
}

/// Compact JSON suitable for IAM `PolicyDocument` parameters.
pub fn render_policy(document: &Value) -> String {
    document.to_string()
}
