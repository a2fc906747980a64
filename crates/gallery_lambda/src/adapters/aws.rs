use std::collections::HashMap;

use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_s3::error::DisplayErrorContext;
use gallery_core::contract::{CaptionRecord, DESCRIPTION_ATTRIBUTE, IMAGE_ID_ATTRIBUTE};
use gallery_core::inference::CONTENT_TYPE_JSON;

use crate::adapters::caption_model::CaptionModel;
use crate::adapters::metadata_sink::MetadataSink;
use crate::adapters::object_source::ObjectSource;

#[derive(Debug, Clone)]
pub struct S3ObjectSource {
    s3_client: aws_sdk_s3::Client,
}

impl S3ObjectSource {
    pub fn new(s3_client: aws_sdk_s3::Client) -> Self {
        Self { s3_client }
    }
}

impl ObjectSource for S3ObjectSource {
    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let output = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to read object from s3: {}",
                    DisplayErrorContext(&error)
                )
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|error| format!("failed to read object body: {error}"))?;
        Ok(body.into_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct BedrockCaptionModel {
    bedrock_client: aws_sdk_bedrockruntime::Client,
    model_id: String,
}

impl BedrockCaptionModel {
    pub fn new(bedrock_client: aws_sdk_bedrockruntime::Client, model_id: impl Into<String>) -> Self {
        Self {
            bedrock_client,
            model_id: model_id.into(),
        }
    }
}

impl CaptionModel for BedrockCaptionModel {
    async fn invoke_model(&self, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let output = self
            .bedrock_client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type(CONTENT_TYPE_JSON)
            .accept(CONTENT_TYPE_JSON)
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to invoke model {}: {}",
                    self.model_id,
                    aws_sdk_bedrockruntime::error::DisplayErrorContext(&error)
                )
            })?;
        Ok(output.body.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct DynamoMetadataSink {
    dynamo_client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoMetadataSink {
    pub fn new(dynamo_client: aws_sdk_dynamodb::Client, table_name: impl Into<String>) -> Self {
        Self {
            dynamo_client,
            table_name: table_name.into(),
        }
    }
}

impl MetadataSink for DynamoMetadataSink {
    async fn put_record(&self, record: &CaptionRecord) -> Result<(), String> {
        self.dynamo_client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(caption_item(record)))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to write caption record to dynamodb: {}",
                    aws_sdk_dynamodb::error::DisplayErrorContext(&error)
                )
            })
    }
}

pub fn caption_item(record: &CaptionRecord) -> HashMap<String, AttributeValue> {
    HashMap::from([
        (
            IMAGE_ID_ATTRIBUTE.to_string(),
            AttributeValue::S(record.image_id.clone()),
        ),
        (
            DESCRIPTION_ATTRIBUTE.to_string(),
            AttributeValue::S(record.description.clone()),
        ),
        ("bucket".to_string(), AttributeValue::S(record.bucket.clone())),
        (
            "model_id".to_string(),
            AttributeValue::S(record.model_id.clone()),
        ),
        (
            "media_type".to_string(),
            AttributeValue::S(record.media_type.clone()),
        ),
        (
            "size_bytes".to_string(),
            AttributeValue::N(record.size_bytes.to_string()),
        ),
        (
            "created_at".to_string(),
            AttributeValue::S(record.created_at.clone()),
        ),
        (
            "record_schema".to_string(),
            AttributeValue::S(record.record_schema.clone()),
        ),
    ])
}
