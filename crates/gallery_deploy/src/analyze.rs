use std::path::Path;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::primitives::ByteStream;
use gallery_core::contract::{DESCRIPTION_ATTRIBUTE, IMAGE_ID_ATTRIBUTE};
use gallery_core::naming::ResourceNames;
use gallery_core::object_keys::{media_type_for_key, upload_object_key};
use gallery_core::retry::RetryPolicy;
use uuid::Uuid;

use crate::clients::AwsClients;
use crate::error::{aws_error, DeployError};
use crate::retry::poll_until;

/// Shown when a record exists but carries no description attribute.
pub const MISSING_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    Described { image_id: String, description: String },
    TimedOut { image_id: String, attempts: u32 },
}

/// Uploads `image` under a fresh object key and waits for the caption record
/// the function writes for it.
pub async fn analyze_image(
    clients: &AwsClients,
    names: &ResourceNames,
    image: &Path,
    poll: RetryPolicy,
) -> Result<AnalyzeOutcome, DeployError> {
    let bytes = tokio::fs::read(image)
        .await
        .map_err(|source| DeployError::Io {
            path: image.to_path_buf(),
            source,
        })?;
    if bytes.is_empty() {
        return Err(DeployError::validation(format!(
            "{} is empty",
            image.display()
        )));
    }

    let file_name = image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let image_id = upload_object_key(&Uuid::new_v4().to_string(), &file_name);

    tracing::info!(image_id = %image_id, bucket = %names.bucket, size_bytes = bytes.len(), "Uploading image");
    upload_image(&clients.s3, &names.bucket, &image_id, bytes).await?;

    match wait_for_description(&clients.dynamodb, &names.table, &image_id, poll).await {
        Ok(description) => Ok(AnalyzeOutcome::Described {
            image_id,
            description,
        }),
        Err(DeployError::Timeout { attempts, .. }) => {
            tracing::warn!(image_id = %image_id, attempts, "No caption record appeared");
            Ok(AnalyzeOutcome::TimedOut { image_id, attempts })
        }
        Err(error) => Err(error),
    }
}

pub async fn upload_image(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    bytes: Vec<u8>,
) -> Result<(), DeployError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .content_type(media_type_for_key(key))
        .body(ByteStream::from(bytes))
        .send()
        .await
        .map(|_| ())
        .map_err(aws_error("upload image"))
}

pub async fn wait_for_description(
    dynamodb: &aws_sdk_dynamodb::Client,
    table: &str,
    image_id: &str,
    poll: RetryPolicy,
) -> Result<String, DeployError> {
    poll_until(poll, &format!("caption of {image_id}"), || {
        let request = dynamodb
            .get_item()
            .table_name(table)
            .key(IMAGE_ID_ATTRIBUTE, AttributeValue::S(image_id.to_string()));
        async move {
            let output = request.send().await.map_err(aws_error("read caption"))?;
            Ok(output.item().map(|item| {
                item.get(DESCRIPTION_ATTRIBUTE)
                    .and_then(|value| value.as_s().ok())
                    .cloned()
                    .unwrap_or_else(|| MISSING_DESCRIPTION.to_string())
            }))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    use aws_sdk_dynamodb::operation::get_item::GetItemOutput;
    use aws_sdk_s3::operation::put_object::PutObjectOutput;
    use aws_smithy_mocks::{mock, mock_client, RuleMode};

    use super::*;

    fn names() -> ResourceNames {
        ResourceNames::for_stack("demo").expect("stack is valid")
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO).expect("policy is valid")
    }

    fn image_file(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create image");
        file.write_all(b"\x89PNG fake").expect("write image");
        (dir, path)
    }

    fn clients(
        s3: aws_sdk_s3::Client,
        dynamodb: aws_sdk_dynamodb::Client,
    ) -> AwsClients {
        let iam_rule = mock!(aws_sdk_iam::Client::get_role)
            .then_error(|| {
                aws_sdk_iam::operation::get_role::GetRoleError::generic(
                    aws_sdk_s3::error::ErrorMetadata::builder().build(),
                )
            });
        let lambda_rule = mock!(aws_sdk_lambda::Client::get_function).then_output(|| {
            aws_sdk_lambda::operation::get_function::GetFunctionOutput::builder().build()
        });
        let sts_rule = mock!(aws_sdk_sts::Client::get_caller_identity).then_output(|| {
            aws_sdk_sts::operation::get_caller_identity::GetCallerIdentityOutput::builder().build()
        });
        AwsClients {
            s3,
            dynamodb,
            iam: mock_client!(aws_sdk_iam, [&iam_rule]),
            lambda: mock_client!(aws_sdk_lambda, [&lambda_rule]),
            sts: mock_client!(aws_sdk_sts, [&sts_rule]),
        }
    }

    #[tokio::test]
    async fn uploads_with_content_type_and_returns_description() {
        let (_dir, path) = image_file("holiday.PNG");

        let put_rule = mock!(aws_sdk_s3::Client::put_object)
            .match_requests(|req| {
                req.bucket() == Some("demo-images")
                    && req.key().map(|key| key.ends_with(".png")).unwrap_or(false)
                    && req.content_type() == Some("image/png")
            })
            .then_output(|| PutObjectOutput::builder().build());
        let get_rule = mock!(aws_sdk_dynamodb::Client::get_item)
            .match_requests(|req| req.table_name() == Some("demo-metadata"))
            .then_output(|| {
                GetItemOutput::builder()
                    .set_item(Some(HashMap::from([(
                        DESCRIPTION_ATTRIBUTE.to_string(),
                        AttributeValue::S("A beach at sunset.".to_string()),
                    )])))
                    .build()
            });

        let clients = clients(
            mock_client!(aws_sdk_s3, [&put_rule]),
            mock_client!(aws_sdk_dynamodb, [&get_rule]),
        );

        let outcome = analyze_image(&clients, &names(), &path, instant(3))
            .await
            .expect("analysis succeeds");

        match outcome {
            AnalyzeOutcome::Described {
                image_id,
                description,
            } => {
                assert!(image_id.ends_with(".png"));
                assert_eq!(description, "A beach at sunset.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(put_rule.num_calls(), 1);
        assert_eq!(get_rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn record_without_description_uses_placeholder() {
        let get_rule = mock!(aws_sdk_dynamodb::Client::get_item).then_output(|| {
            GetItemOutput::builder()
                .set_item(Some(HashMap::from([(
                    IMAGE_ID_ATTRIBUTE.to_string(),
                    AttributeValue::S("a.jpg".to_string()),
                )])))
                .build()
        });
        let dynamodb = mock_client!(aws_sdk_dynamodb, [&get_rule]);

        let description = wait_for_description(&dynamodb, "demo-metadata", "a.jpg", instant(3))
            .await
            .expect("record found");
        assert_eq!(description, MISSING_DESCRIPTION);
    }

    #[tokio::test]
    async fn times_out_when_no_record_appears() {
        let (_dir, path) = image_file("photo.jpg");

        let put_rule = mock!(aws_sdk_s3::Client::put_object)
            .then_output(|| PutObjectOutput::builder().build());
        let get_rule = mock!(aws_sdk_dynamodb::Client::get_item)
            .then_output(|| GetItemOutput::builder().build());

        let clients = clients(
            mock_client!(aws_sdk_s3, [&put_rule]),
            mock_client!(aws_sdk_dynamodb, RuleMode::MatchAny, [&get_rule]),
        );

        let outcome = analyze_image(&clients, &names(), &path, instant(4))
            .await
            .expect("timeout is not an error");

        assert!(matches!(
            outcome,
            AnalyzeOutcome::TimedOut { attempts: 4, .. }
        ));
        assert_eq!(get_rule.num_calls(), 4);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let put_rule = mock!(aws_sdk_s3::Client::put_object)
            .then_output(|| PutObjectOutput::builder().build());
        let get_rule = mock!(aws_sdk_dynamodb::Client::get_item)
            .then_output(|| GetItemOutput::builder().build());
        let clients = clients(
            mock_client!(aws_sdk_s3, [&put_rule]),
            mock_client!(aws_sdk_dynamodb, [&get_rule]),
        );

        let error = analyze_image(&clients, &names(), &dir.path().join("absent.jpg"), instant(1))
            .await
            .expect_err("file is missing");

        assert!(matches!(error, DeployError::Io { .. }));
        assert_eq!(put_rule.num_calls(), 0);
    }
}
