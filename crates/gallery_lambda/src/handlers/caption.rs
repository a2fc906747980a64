use std::time::Instant;

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use gallery_core::contract::{
    CaptionRecord, CaptionResponse, CaptionStatus, FailedImage, ValidationError, MODEL_ID_ENV,
    RECORD_SCHEMA_VERSION, TABLE_NAME_ENV,
};
use gallery_core::inference::{
    build_request_body, parse_response_body, CAPTION_PROMPT, DEFAULT_MODEL_ID,
};
use gallery_core::object_keys::{decode_event_key, media_type_for_key};
use lambda_runtime::{tracing, Error, LambdaEvent};

use crate::adapters::caption_model::CaptionModel;
use crate::adapters::metadata_sink::MetadataSink;
use crate::adapters::object_source::ObjectSource;

const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionHandlerConfig {
    pub table_name: String,
    pub model_id: String,
    pub prompt: String,
}

impl CaptionHandlerConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        let table_name = lookup(TABLE_NAME_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ValidationError::new(format!("{TABLE_NAME_ENV} must be configured")))?;
        let model_id = lookup(MODEL_ID_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        Ok(Self {
            table_name,
            model_id,
            prompt: CAPTION_PROMPT.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionError {
    pub image_id: String,
    pub stage: &'static str,
    pub message: String,
}

impl CaptionError {
    fn new(image_id: &str, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            image_id: image_id.to_string(),
            stage,
            message: message.into(),
        }
    }
}

/// Lambda entry point. Per-image failures are reported in the response, so
/// the invocation itself only fails when the runtime does.
pub async fn function_handler(
    event: LambdaEvent<S3Event>,
    config: &CaptionHandlerConfig,
    source: &impl ObjectSource,
    model: &impl CaptionModel,
    sink: &impl MetadataSink,
) -> Result<CaptionResponse, Error> {
    let response = handle_s3_event(&event.payload, config, source, model, sink).await;
    if response.status != CaptionStatus::Ok {
        tracing::warn!(
            status = ?response.status,
            processed = response.processed.len(),
            failed = response.failed.len(),
            "Some images were not captioned"
        );
    }
    Ok(response)
}

pub async fn handle_s3_event(
    event: &S3Event,
    config: &CaptionHandlerConfig,
    source: &impl ObjectSource,
    model: &impl CaptionModel,
    sink: &impl MetadataSink,
) -> CaptionResponse {
    if event.records.is_empty() {
        tracing::warn!("No records found in S3 event");
        return CaptionResponse::from_results(Vec::new(), Vec::new());
    }

    let mut processed = Vec::with_capacity(event.records.len());
    let mut failed = Vec::new();

    for record in &event.records {
        if !is_object_created(record) {
            tracing::info!(
                event_name = record.event_name.as_deref().unwrap_or_default(),
                "Skipping non-create S3 event"
            );
            continue;
        }

        let started_at = Instant::now();
        match caption_record(record, config, source, model, sink).await {
            Ok(caption) => {
                tracing::info!(
                    image_id = %caption.image_id,
                    bucket = %caption.bucket,
                    size_bytes = caption.size_bytes,
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    "Caption stored"
                );
                processed.push(caption.image_id);
            }
            Err(error) => {
                tracing::error!(
                    image_id = %error.image_id,
                    stage = error.stage,
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    error = %error.message,
                    "Caption failed"
                );
                failed.push(FailedImage {
                    image_id: error.image_id,
                    error: format!("{}: {}", error.stage, error.message),
                });
            }
        }
    }

    CaptionResponse::from_results(processed, failed)
}

async fn caption_record(
    record: &S3EventRecord,
    config: &CaptionHandlerConfig,
    source: &impl ObjectSource,
    model: &impl CaptionModel,
    sink: &impl MetadataSink,
) -> Result<CaptionRecord, CaptionError> {
    let raw_key = record.s3.object.key.as_deref().unwrap_or_default();
    let image_id = decode_event_key(raw_key)
        .map_err(|error| CaptionError::new(raw_key, "resolve_object", error.message()))?;
    let bucket = record
        .s3
        .bucket
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| CaptionError::new(&image_id, "resolve_object", "record has no bucket name"))?;

    let image = source
        .fetch_object(bucket, &image_id)
        .await
        .map_err(|error| CaptionError::new(&image_id, "fetch_object", error))?;
    if image.is_empty() {
        return Err(CaptionError::new(&image_id, "fetch_object", "object is empty"));
    }

    let media_type = media_type_for_key(&image_id);
    let encoded = STANDARD.encode(&image);
    let request_body = build_request_body(&encoded, media_type, &config.prompt)
        .map_err(|error| CaptionError::new(&image_id, "encode_request", error.message()))?;

    let response_body = model
        .invoke_model(request_body)
        .await
        .map_err(|error| CaptionError::new(&image_id, "invoke_model", error))?;
    let description = parse_response_body(&response_body)
        .map_err(|error| CaptionError::new(&image_id, "parse_response", error.message()))?;

    let caption = CaptionRecord {
        image_id: image_id.clone(),
        description,
        bucket: bucket.to_string(),
        model_id: config.model_id.clone(),
        media_type: media_type.to_string(),
        size_bytes: image.len() as u64,
        created_at: Utc::now().to_rfc3339(),
        record_schema: RECORD_SCHEMA_VERSION.to_string(),
    };

    sink.put_record(&caption)
        .await
        .map_err(|error| CaptionError::new(&image_id, "write_record", error))?;

    Ok(caption)
}

fn is_object_created(record: &S3EventRecord) -> bool {
    record
        .event_name
        .as_deref()
        .map(|name| name.starts_with(OBJECT_CREATED_PREFIX))
        .unwrap_or(true)
}
