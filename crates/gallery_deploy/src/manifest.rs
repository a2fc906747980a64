use std::fs;
use std::path::Path;

use gallery_core::contract::{DeploymentManifest, DEFAULT_REGION, MANIFEST_SCHEMA_VERSION};
use gallery_core::naming::ResourceNames;

use crate::error::DeployError;

pub const DEFAULT_MANIFEST_PATH: &str = ".gallery-deployment.json";

/// Stack a command operates on, resolved from flags and the manifest file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTarget {
    pub names: ResourceNames,
    pub region: String,
    pub manifest: Option<DeploymentManifest>,
}

pub fn write_manifest(path: &Path, manifest: &DeploymentManifest) -> Result<(), DeployError> {
    let body = serde_json::to_string_pretty(manifest).map_err(|error| DeployError::Manifest {
        path: path.to_path_buf(),
        message: format!("failed to serialize: {error}"),
    })?;
    fs::write(path, body + "\n").map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_manifest(path: &Path) -> Result<DeploymentManifest, DeployError> {
    let body = fs::read_to_string(path).map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest: DeploymentManifest =
        serde_json::from_str(&body).map_err(|error| DeployError::Manifest {
            path: path.to_path_buf(),
            message: format!("malformed manifest: {error}"),
        })?;
    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(DeployError::Manifest {
            path: path.to_path_buf(),
            message: format!(
                "unsupported schema version '{}' (expected '{MANIFEST_SCHEMA_VERSION}')",
                manifest.schema_version
            ),
        });
    }
    Ok(manifest)
}

pub fn remove_manifest(path: &Path) -> Result<(), DeployError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DeployError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// An explicit `--stack` wins over the manifest; an explicit region wins over
/// the manifest's region, which wins over the default region.
pub fn resolve_target(
    stack: Option<&str>,
    region: Option<&str>,
    manifest_path: &Path,
) -> Result<StackTarget, DeployError> {
    let manifest = if manifest_path.exists() {
        Some(read_manifest(manifest_path)?)
    } else {
        None
    };

    let manifest = match (stack, manifest) {
        (Some(stack), Some(manifest)) if manifest.stack != stack.trim() => {
            tracing::warn!(
                requested = stack,
                manifest_stack = %manifest.stack,
                "Ignoring manifest for a different stack"
            );
            None
        }
        (_, manifest) => manifest,
    };

    let stack = match (stack, &manifest) {
        (Some(stack), _) => stack.to_string(),
        (None, Some(manifest)) => manifest.stack.clone(),
        (None, None) => {
            return Err(DeployError::validation(format!(
                "no --stack given and no manifest found at {}",
                manifest_path.display()
            )));
        }
    };

    let region = region
        .map(str::to_string)
        .or_else(|| manifest.as_ref().map(|manifest| manifest.region.clone()))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    Ok(StackTarget {
        names: ResourceNames::for_stack(&stack)?,
        region,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest(stack: &str) -> DeploymentManifest {
        let names = ResourceNames::for_stack(stack).expect("stack is valid");
        DeploymentManifest {
            stack: names.stack.clone(),
            region: "eu-central-1".to_string(),
            account_id: "123456789012".to_string(),
            model_id: "model".to_string(),
            bucket: names.bucket.clone(),
            table: names.table.clone(),
            function_name: names.function.clone(),
            function_arn: "arn".to_string(),
            role_name: names.role.clone(),
            role_arn: "arn".to_string(),
            deployed_at: "2026-01-01T00:00:00+00:00".to_string(),
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
        }
    }

    #[test]
    fn manifest_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("deployment.json");
        let manifest = sample_manifest("demo");

        write_manifest(&path, &manifest).expect("write succeeds");
        assert_eq!(read_manifest(&path).expect("read succeeds"), manifest);

        remove_manifest(&path).expect("remove succeeds");
        assert!(!path.exists());
        remove_manifest(&path).expect("removing twice is fine");
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("deployment.json");
        let mut manifest = sample_manifest("demo");
        manifest.schema_version = "v0".to_string();
        write_manifest(&path, &manifest).expect("write succeeds");

        let error = read_manifest(&path).expect_err("schema mismatch");
        assert!(error.to_string().contains("unsupported schema version 'v0'"));
    }

    #[test]
    fn target_comes_from_manifest_when_no_stack_given() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("deployment.json");
        write_manifest(&path, &sample_manifest("demo")).expect("write succeeds");

        let target = resolve_target(None, None, &path).expect("target resolves");
        assert_eq!(target.names.bucket, "demo-images");
        assert_eq!(target.region, "eu-central-1");
        assert!(target.manifest.is_some());

        let overridden = resolve_target(None, Some("us-west-2"), &path).expect("target resolves");
        assert_eq!(overridden.region, "us-west-2");
    }

    #[test]
    fn explicit_stack_ignores_other_manifest() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("deployment.json");
        write_manifest(&path, &sample_manifest("demo")).expect("write succeeds");

        let target = resolve_target(Some("other"), None, &path).expect("target resolves");
        assert_eq!(target.names.stack, "other");
        assert_eq!(target.region, DEFAULT_REGION);
        assert!(target.manifest.is_none());
    }

    #[test]
    fn missing_stack_and_manifest_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = resolve_target(None, None, &dir.path().join("absent.json"))
            .expect_err("nothing to resolve");
        assert!(error.to_string().contains("no --stack given"));
    }
}
