use serde::{Deserialize, Serialize};

use crate::naming::ResourceNames;

pub const DEFAULT_PROJECT: &str = "ai-gallery";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const MANIFEST_SCHEMA_VERSION: &str = "v1";
pub const RECORD_SCHEMA_VERSION: &str = "v1";

/// Partition key of the metadata table.
pub const IMAGE_ID_ATTRIBUTE: &str = "image_id";
pub const DESCRIPTION_ATTRIBUTE: &str = "description";

pub const TABLE_NAME_ENV: &str = "TABLE_NAME";
pub const MODEL_ID_ENV: &str = "MODEL_ID";

/// One row of the metadata table, written once per captioned image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionRecord {
    pub image_id: String,
    pub description: String,
    pub bucket: String,
    pub model_id: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub record_schema: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptionStatus {
    Ok,
    PartialFailure,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedImage {
    pub image_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionResponse {
    pub status: CaptionStatus,
    pub processed: Vec<String>,
    pub failed: Vec<FailedImage>,
}

impl CaptionResponse {
    pub fn from_results(processed: Vec<String>, failed: Vec<FailedImage>) -> Self {
        let status = match (processed.is_empty(), failed.is_empty()) {
            (_, true) => CaptionStatus::Ok,
            (true, false) => CaptionStatus::Failed,
            (false, false) => CaptionStatus::PartialFailure,
        };
        Self {
            status,
            processed,
            failed,
        }
    }
}

/// Everything `teardown`, `status` and `analyze` need to find a deployed stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentManifest {
    pub stack: String,
    pub region: String,
    pub account_id: String,
    pub model_id: String,
    pub bucket: String,
    pub table: String,
    pub function_name: String,
    pub function_arn: String,
    pub role_name: String,
    pub role_arn: String,
    pub deployed_at: String,
    pub schema_version: String,
}

impl DeploymentManifest {
    pub fn names(&self) -> Result<ResourceNames, ValidationError> {
        ResourceNames::for_stack(&self.stack)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}
