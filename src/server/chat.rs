//! OpenAI-compatible REST chat facade
//!
//! The last user message drives retrieval; the retrieved block is injected
//! as a second system message and original system messages are dropped so
//! instructions are not duplicated. Streaming forwards upstream deltas as
//! SSE and always terminates the stream explicitly: `[DONE]` on success, a
//! JSON error event otherwise.

use super::{ApiResult, AppState};
use crate::error::RagError;
use crate::llm::{system_message, CompletionOptions, Message, Role};
use crate::search::{RetrievalContext, SearchOptions};
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::warn;

/// Incoming request, a strict subset of the OpenAI schema
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Wire message with a free-form role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Serialize)]
struct ResponseChoice {
    index: usize,
    message: ApiMessage,
    finish_reason: String,
}

#[derive(Debug, Serialize)]
struct StreamChunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Serialize)]
struct StreamChoice {
    index: usize,
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> ApiResult<Response> {
    let query = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| RagError::InvalidInput("request has no user message".to_string()))?;

    // Retrieval failure degrades to an un-augmented conversation
    let context = match state
        .engine
        .retrieve(&query, &SearchOptions::default())
        .await
    {
        Ok(context) => context,
        Err(e) => {
            warn!("Retrieval failed, answering without context: {}", e);
            RetrievalContext::default()
        }
    };

    let messages = augment_messages(&state.manifest.system_prompt, &context, &request.messages);
    let options = CompletionOptions {
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
    };
    let id = format!(
        "chatcmpl-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let model = state.llm.resolved_model(&request.model);

    if request.stream {
        stream_completion(state, messages, options, id, model).await
    } else {
        let completion = state.llm.complete(&messages, &options).await?;
        let response = ChatCompletionResponse {
            id,
            object: "chat.completion",
            created: Utc::now().timestamp(),
            model,
            choices: vec![ResponseChoice {
                index: 0,
                message: ApiMessage {
                    role: "assistant".to_string(),
                    content: completion.text,
                },
                finish_reason: "stop".to_string(),
            }],
        };
        Ok(Json(response).into_response())
    }
}

/// Relay upstream deltas as an SSE response
async fn stream_completion(
    state: AppState,
    messages: Vec<Message>,
    options: CompletionOptions,
    id: String,
    model: String,
) -> ApiResult<Response> {
    // Errors before headers go out are ordinary HTTP errors
    let deltas = state.llm.complete_stream(&messages, &options).await?;

    let (tx, events) = flume::bounded::<std::result::Result<Event, Infallible>>(32);
    tokio::spawn(async move {
        let created = Utc::now().timestamp();
        while let Ok(item) = deltas.recv_async().await {
            match item {
                Ok(content) => {
                    let chunk = StreamChunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model: model.clone(),
                        choices: vec![StreamChoice {
                            index: 0,
                            delta: StreamDelta {
                                content: Some(content),
                            },
                            finish_reason: None,
                        }],
                    };
                    let payload = serde_json::to_string(&chunk).unwrap_or_default();
                    if tx.send_async(Ok(Event::default().data(payload))).await.is_err() {
                        // Client disconnected; dropping `deltas` stops the
                        // upstream read within one chunk.
                        warn!("Streaming client disconnected, cancelling upstream");
                        return;
                    }
                }
                Err(e) => {
                    // Headers are already sent; the error becomes a terminal event
                    warn!("Streaming completion failed mid-response: {}", e);
                    let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                    let _ = tx.send_async(Ok(Event::default().data(payload))).await;
                    return;
                }
            }
        }
        let _ = tx.send_async(Ok(Event::default().data("[DONE]"))).await;
    });

    Ok(Sse::new(events.into_stream()).into_response())
}

/// Prepend the agent system prompt and retrieval context, dropping the
/// caller's system messages.
fn augment_messages(
    system_prompt: &str,
    context: &RetrievalContext,
    original: &[ApiMessage],
) -> Vec<Message> {
    let mut messages = vec![system_message(system_prompt)];
    if !context.is_empty() {
        messages.push(system_message(format!(
            "Here is relevant context from the knowledge base:\n\n{}",
            context.format_block()
        )));
    }
    for message in original {
        match message.role.as_str() {
            "system" => continue,
            "assistant" => messages.push(Message {
                role: Role::Assistant,
                content: message.content.clone(),
            }),
            _ => messages.push(Message {
                role: Role::User,
                content: message.content.clone(),
            }),
        }
    }
    messages
}
