//! Chat completion client for OpenAI-compatible endpoints
//!
//! Supports non-streaming completion for the builder and the REST facade,
//! and streaming completion where content deltas are relayed in order over a
//! channel. End-of-stream closes the channel; failures are delivered as an
//! `Err` item so consumers can tell the two apart.

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Sampling options forwarded to the upstream
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Response from non-streaming completion
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Client for a chat completion upstream
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        // No client-wide timeout: streaming responses outlive any fixed
        // deadline. Non-streaming calls set a per-request timeout instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Model name to report for a request: the configured model wins,
    /// otherwise whatever the caller asked for.
    pub fn resolved_model(&self, requested: &str) -> String {
        if self.config.model.is_empty() {
            requested.to_string()
        } else {
            self.config.model.clone()
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn wire_model(&self) -> Option<&str> {
        match self.config.model.as_str() {
            "" => None,
            name => Some(name),
        }
    }

    /// Non-streaming chat completion
    pub async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        debug!(messages = messages.len(), "Requesting completion");

        let request = ChatRequest {
            model: self.wire_model(),
            messages,
            stream: false,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Upstream(format!("chat request: {}", e)))?;

        let response = Self::check_status(response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Upstream(format!("parse chat response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Upstream("chat response had no choices".to_string()))?;

        Ok(CompletionResponse {
            text: choice.message.content,
            model: parsed.model.unwrap_or_else(|| self.resolved_model("")),
            finish_reason: choice.finish_reason,
        })
    }

    /// Streaming chat completion.
    ///
    /// Returns a receiver of content deltas in upstream order. The channel
    /// closes after the `[DONE]` sentinel; upstream failures arrive as a
    /// final `Err` item. Dropping the receiver cancels the upstream read
    /// within one chunk.
    pub async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<flume::Receiver<Result<String>>> {
        debug!(messages = messages.len(), "Requesting streaming completion");

        let request = ChatRequest {
            model: self.wire_model(),
            messages,
            stream: true,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Upstream(format!("chat stream request: {}", e)))?;

        let response = Self::check_status(response).await?;

        let (tx, rx) = flume::bounded(32);
        tokio::spawn(relay_deltas(response, tx));
        Ok(rx)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::RateLimited(format!("chat: {}", body)));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Upstream(format!(
                "chat returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

/// Forward SSE content deltas from the upstream body into the channel.
///
/// SSE payloads are `data: <json>` lines terminated by `data: [DONE]`; HTTP
/// chunk boundaries can split lines, so bytes are buffered and only complete
/// lines are parsed.
async fn relay_deltas(response: reqwest::Response, tx: flume::Sender<Result<String>>) {
    let mut body = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(next) = body.next().await {
        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send_async(Err(RagError::Upstream(format!("chat stream read: {}", e))))
                    .await;
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(newline) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline).collect();
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                return;
            }
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => {
                    let delta = chunk
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.clone())
                        .unwrap_or_default();
                    if delta.is_empty() {
                        continue;
                    }
                    if tx.send_async(Ok(delta)).await.is_err() {
                        // Receiver gone: the client disconnected
                        debug!("Stream consumer dropped, stopping upstream read");
                        return;
                    }
                }
                Err(e) => {
                    warn!("Skipping unparseable stream chunk: {}", e);
                }
            }
        }
    }
}

/// Helper function to create a system message
pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::System,
        content: content.into(),
    }
}

/// Helper function to create a user message
pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::User,
        content: content.into(),
    }
}

/// Helper function to create an assistant message
pub fn assistant_message(content: impl Into<String>) -> Message {
    Message {
        role: Role::Assistant,
        content: content.into(),
    }
}
