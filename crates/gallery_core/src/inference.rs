//! Request and response bodies for the hosted multimodal model.
//!
//! The function talks to Bedrock's `InvokeModel` using the Anthropic
//! messages format: one user turn holding the base64 image followed by the
//! caption prompt.

use serde::{Deserialize, Serialize};

use crate::contract::ValidationError;

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const MAX_TOKENS: u32 = 1000;
pub const CONTENT_TYPE_JSON: &str = "application/json";

pub const CAPTION_PROMPT: &str = "Describe this image in detail. Mention the main subjects, \
the setting, notable colors and any visible text. Answer in a single short paragraph.";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    anthropic_version: &'static str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: [RequestBlock<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RequestBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub fn build_request_body(
    image_base64: &str,
    media_type: &str,
    prompt: &str,
) -> Result<Vec<u8>, ValidationError> {
    if image_base64.is_empty() {
        return Err(ValidationError::new("image payload cannot be empty"));
    }

    let request = MessagesRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens: MAX_TOKENS,
        messages: [Message {
            role: "user",
            content: [
                RequestBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type,
                        data: image_base64,
                    },
                },
                RequestBlock::Text { text: prompt },
            ],
        }],
    };

    serde_json::to_vec(&request)
        .map_err(|error| ValidationError::new(format!("Failed to encode model request: {error}")))
}

/// Joins every text block of the model reply.
pub fn parse_response_body(body: &[u8]) -> Result<String, ValidationError> {
    let response: MessagesResponse = serde_json::from_slice(body)
        .map_err(|error| ValidationError::new(format!("Malformed model response: {error}")))?;

    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("\n");

    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::new("Model response contained no text"));
    }
    Ok(text.to_string())
}
