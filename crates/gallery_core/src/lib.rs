//! Shared image-gallery domain primitives.
//!
//! This crate owns resource naming, IAM policy documents, the retry policy,
//! and the request/record contracts shared by the caption function and the
//! deployment CLI. It intentionally excludes AWS SDK and Lambda runtime
//! concerns.

pub mod contract;
pub mod inference;
pub mod naming;
pub mod object_keys;
pub mod policy;
pub mod retry;
