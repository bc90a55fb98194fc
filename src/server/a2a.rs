//! A2A facade: agent-to-agent JSON-RPC on POST /rpc/agent
//!
//! `agent.info` describes the agent, `agent.query` answers with the LLM over
//! retrieved context, `agent.search` exposes raw hybrid retrieval results.

use super::AppState;
use crate::llm::{system_message, user_message, CompletionOptions, Message};
use crate::search::{RetrievalContext, SearchOptions};
use axum::{extract::State, Json};
use jsonrpc_core::{
    Error as RpcError, ErrorCode, Failure, Id, MethodCall, Output, Response as RpcResponse,
    Success, Version,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: String,
    /// Accepted for forward compatibility and currently ignored.
    // TODO: thread history into the augmented prompt once multi-turn A2A
    // callers exist.
    #[serde(default, rename = "history")]
    _history: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// POST /rpc/agent
pub async fn rpc_endpoint(State(state): State<AppState>, body: String) -> Json<RpcResponse> {
    let call: MethodCall = match serde_json::from_str(&body) {
        Ok(call) => call,
        Err(_) => {
            return Json(RpcResponse::Single(Output::Failure(Failure {
                jsonrpc: Some(Version::V2),
                error: RpcError::new(ErrorCode::ParseError),
                id: Id::Null,
            })));
        }
    };

    debug!(method = %call.method, "A2A call");
    let id = call.id.clone();
    let output = match dispatch(&state, call).await {
        Ok(result) => Output::Success(Success {
            jsonrpc: Some(Version::V2),
            result,
            id,
        }),
        Err(error) => Output::Failure(Failure {
            jsonrpc: Some(Version::V2),
            error,
            id,
        }),
    };
    Json(RpcResponse::Single(output))
}

async fn dispatch(state: &AppState, call: MethodCall) -> Result<Value, RpcError> {
    match call.method.as_str() {
        "agent.info" => Ok(agent_info(state)),
        "agent.query" => {
            let params: QueryParams = call.params.parse()?;
            agent_query(state, params).await
        }
        "agent.search" => {
            let params: SearchParams = call.params.parse()?;
            agent_search(state, params).await
        }
        _ => Err(RpcError::method_not_found()),
    }
}

fn agent_info(state: &AppState) -> Value {
    let tools: Vec<String> = if state.manifest.mcp_tools.is_empty() {
        vec![state.manifest.search_tool_name()]
    } else {
        state
            .manifest
            .mcp_tools
            .iter()
            .map(|tool| tool.name.clone())
            .collect()
    };

    json!({
        "name": state.manifest.name,
        "description": state.manifest.description,
        "version": state.manifest.version,
        "capabilities": ["query", "search"],
        "tools": tools,
        "counts": {
            "vectors": state.engine.vector_count(),
            "triples": state.engine.graph_count(),
        },
        "endpoints": {
            "chat": "/v1/chat/completions",
            "mcp": "/mcp",
            "a2a": "/rpc/agent",
        },
    })
}

async fn agent_query(state: &AppState, params: QueryParams) -> Result<Value, RpcError> {
    if params.query.trim().is_empty() {
        return Err(RpcError::invalid_params("query must not be empty"));
    }

    // Retrieval failure degrades to an un-augmented answer, as in REST chat
    let context = match state
        .engine
        .retrieve(&params.query, &SearchOptions::default())
        .await
    {
        Ok(context) => context,
        Err(e) => {
            warn!("A2A retrieval failed, answering without context: {}", e);
            RetrievalContext::default()
        }
    };
    let block = context.format_block();

    let mut messages: Vec<Message> = vec![system_message(&state.manifest.system_prompt)];
    if !context.is_empty() {
        messages.push(system_message(format!(
            "Here is relevant context from the knowledge base:\n\n{}",
            block
        )));
    }
    messages.push(user_message(&params.query));

    let completion = state
        .llm
        .complete(&messages, &CompletionOptions::default())
        .await
        .map_err(|e| RpcError {
            code: ErrorCode::InternalError,
            message: format!("completion failed: {}", e),
            data: None,
        })?;

    Ok(json!({
        "answer": completion.text,
        "context": block,
        "agent": state.manifest.name,
    }))
}

async fn agent_search(state: &AppState, params: SearchParams) -> Result<Value, RpcError> {
    if params.query.trim().is_empty() {
        return Err(RpcError::invalid_params("query must not be empty"));
    }

    let options = match params.top_k {
        Some(top_k) => SearchOptions::with_top_k(top_k),
        None => SearchOptions::default(),
    };
    let context = state
        .engine
        .retrieve(&params.query, &options)
        .await
        .map_err(|e| RpcError {
            code: ErrorCode::InternalError,
            message: format!("retrieval failed: {}", e),
            data: None,
        })?;

    let graph_results: Vec<Value> = context
        .graph_facts
        .iter()
        .map(|fact| {
            json!({
                "subject": fact.subject,
                "predicate": fact.predicate,
                "object": fact.object,
            })
        })
        .collect();

    Ok(json!({
        "vector_results": context.vector_hits,
        "graph_results": graph_results,
        "agent": state.manifest.name,
    }))
}
