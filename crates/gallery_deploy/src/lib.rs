//! Provisioning, teardown and smoke-test tooling for the image gallery stack.
//!
//! Every operation is a sequence of direct control-plane calls; nothing here
//! runs concurrently and nothing is rolled back automatically. A failed
//! `deploy` is cleaned up with `teardown`.

pub mod analyze;
pub mod clients;
pub mod error;
pub mod manifest;
pub mod provision;
pub mod retry;
pub mod status;
pub mod teardown;
