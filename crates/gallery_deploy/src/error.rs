use std::path::PathBuf;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use gallery_core::contract::ValidationError;
use thiserror::Error;

/// Error codes that mean "already gone" across S3, DynamoDB, IAM and Lambda.
const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchBucket",
    "NotFound",
    "NoSuchEntity",
    "ResourceNotFoundException",
];

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{step} failed: {message}")]
    Aws { step: &'static str, message: String },

    #[error("{step} did not succeed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        step: &'static str,
        attempts: u32,
        last_error: Box<DeployError>,
    },

    #[error("timed out waiting for {what} after {attempts} checks")]
    Timeout { what: String, attempts: u32 },

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("teardown of stack {stack} left {failed} resource(s) in place")]
    Teardown { stack: String, failed: usize },
}

impl DeployError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }
}

/// Maps an SDK (or request-builder) error into [`DeployError::Aws`] for `step`,
/// keeping the full source chain in the message.
pub fn aws_error<E>(step: &'static str) -> impl FnOnce(E) -> DeployError
where
    E: std::error::Error,
{
    move |error| DeployError::Aws {
        step,
        message: DisplayErrorContext(&error).to_string(),
    }
}

pub fn is_not_found(error: &impl ProvideErrorMetadata) -> bool {
    error
        .code()
        .map(|code| NOT_FOUND_CODES.contains(&code))
        .unwrap_or(false)
}
