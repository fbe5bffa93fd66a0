use crate::http::{build_client, build_judge_client};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

pub static CHAT_MODEL: Lazy<String> =
    Lazy::new(|| env::var("MISTRAL_CHAT_MODEL").unwrap_or_else(|_| "mistral-large-latest".into()));

pub static VISION_MODEL: Lazy<String> =
    Lazy::new(|| env::var("MISTRAL_VISION_MODEL").unwrap_or_else(|_| "pixtral-12b-2409".into()));

pub static MODERATION_MODEL: Lazy<String> = Lazy::new(|| {
    env::var("MISTRAL_MODERATION_MODEL").unwrap_or_else(|_| "mistral-moderation-latest".into())
});

#[derive(Debug, Clone)]
pub struct MistralConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Error)]
pub enum MistralError {
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    pub r#type: &'static str,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            r#type: "json_object",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletion {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ModerationRequest {
    model: String,
    input: Vec<ModerationInput>,
}

#[derive(Debug, Serialize)]
struct ModerationInput {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationResponse {
    #[serde(default)]
    pub results: Vec<ModerationResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModerationResult {
    #[serde(default)]
    pub categories: HashMap<String, bool>,
}

/// Thin client over the Mistral REST API. One long-lived instance is
/// constructed at startup and shared by every handler.
///
/// Two underlying HTTP clients: `http` has no total timeout (vision and
/// attribute calls may run long), `judge` carries the hard 10-second
/// timeout used for write-gating validation and moderation.
pub struct MistralClient {
    http: Client,
    judge: Client,
    config: MistralConfig,
}

impl MistralClient {
    pub fn new(config: MistralConfig) -> Self {
        Self {
            http: build_client(),
            judge: build_judge_client(),
            config,
        }
    }

    /// Chat completion over the unbounded client.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, MistralError> {
        self.send_chat(&self.http, request).await
    }

    /// Chat completion over the judge client (10-second budget).
    pub async fn chat_judged(&self, request: &ChatRequest) -> Result<ChatCompletion, MistralError> {
        self.send_chat(&self.judge, request).await
    }

    pub async fn moderate(&self, content: String) -> Result<ModerationResponse, MistralError> {
        let body = ModerationRequest {
            model: MODERATION_MODEL.clone(),
            input: vec![ModerationInput {
                role: "user".into(),
                content,
            }],
        };
        let response = self
            .judge
            .post(format!("{}/v1/chat/moderations", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| MistralError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(MistralError::Http(format!("HTTP {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|err| MistralError::InvalidResponse(err.to_string()))
    }

    async fn send_chat(
        &self,
        client: &Client,
        request: &ChatRequest,
    ) -> Result<ChatCompletion, MistralError> {
        let response = client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| MistralError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(MistralError::Http(format!("HTTP {}", response.status())));
        }

        response
            .json()
            .await
            .map_err(|err| MistralError::InvalidResponse(err.to_string()))
    }
}
