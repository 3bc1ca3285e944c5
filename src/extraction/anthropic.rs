//! Messages API client.
//!
//! One request per call: a single user message made of the uploaded
//! document (or image) block and the prompt text block. No streaming, no
//! retry.

use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Document { source: Base64Source },
    Image { source: Base64Source },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Base64Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ContentBlock {
    /// PDFs go in a `document` block, anything else in an `image` block
    pub fn for_upload(mime_type: &str, data: impl Into<String>) -> Self {
        let source = Base64Source {
            kind: "base64".to_string(),
            media_type: mime_type.to_string(),
            data: data.into(),
        };

        if mime_type == "application/pdf" {
            ContentBlock::Document { source }
        } else {
            ContentBlock::Image { source }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// A model that answers one message with one text reply
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &MessageRequest) -> Result<String, UpstreamError>;
}

/// Builds a fresh model client for one invocation
pub trait ModelConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Box<dyn LanguageModel>, UpstreamError>;
}

pub struct AnthropicConnector {
    pub api_url: String,
    pub timeout: Duration,
}

impl ModelConnector for AnthropicConnector {
    fn connect(&self, api_key: &str) -> Result<Box<dyn LanguageModel>, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| UpstreamError {
                status: None,
                message: e.to_string(),
            })?;

        Ok(Box::new(AnthropicClient {
            client,
            api_url: self.api_url.clone(),
            api_key: api_key.to_string(),
        }))
    }
}

pub struct AnthropicClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, request: &MessageRequest) -> Result<String, UpstreamError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| UpstreamError {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(UpstreamError {
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }

        first_text(&body)
    }
}

/// Upstream error text, falling back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Text of the first content block
fn first_text(body: &str) -> Result<String, UpstreamError> {
    let parsed: MessageResponse = serde_json::from_str(body).map_err(|e| UpstreamError {
        status: None,
        message: format!("Unexpected API response: {}", e),
    })?;

    parsed
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| UpstreamError {
            status: None,
            message: "Empty API response".to_string(),
        })
}
