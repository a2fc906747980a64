//! AWS-oriented adapters and the caption handler for the image gallery.
//!
//! The handler only sees the adapter traits; `adapters::aws` binds them to
//! S3, Bedrock Runtime and DynamoDB for the deployed function.

pub mod adapters;
pub mod handlers;
