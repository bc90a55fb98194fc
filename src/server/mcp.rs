//! MCP facade: JSON-RPC over POST plus an SSE discovery endpoint
//!
//! Implements the `initialize`, `tools/list`, and `tools/call` methods of
//! protocol revision 2024-11-05. The single advertised tool searches the
//! knowledge base through the hybrid retrieval engine.

use super::AppState;
use crate::manifest::McpToolSpec;
use crate::search::SearchOptions;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use jsonrpc_core::{
    Error as RpcError, ErrorCode, Failure, Id, MethodCall, Output, Response as RpcResponse,
    Success, Version,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Protocol revision advertised by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Keepalive interval for the SSE discovery endpoint
const SSE_PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: ToolArguments,
}

#[derive(Debug, Default, Deserialize)]
struct ToolArguments {
    #[serde(default)]
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

/// POST /mcp
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

    debug!(method = %call.method, "MCP call");
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
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": state.manifest.name,
                "version": "1.0.0",
            },
            "capabilities": { "tools": {} },
        })),
        "tools/list" => Ok(json!({ "tools": tool_listing(&state.manifest) })),
        "tools/call" => {
            let params: ToolCallParams = call.params.parse()?;
            tool_call(state, params).await
        }
        _ => Err(RpcError::method_not_found()),
    }
}

/// Manifest tools wrapped in their JSON schema; a default search tool is
/// synthesized when the builder has not written one back yet.
fn tool_listing(manifest: &crate::manifest::AgentManifest) -> Vec<Value> {
    let tools: Vec<McpToolSpec> = if manifest.mcp_tools.is_empty() {
        vec![McpToolSpec {
            name: manifest.search_tool_name(),
            description: format!(
                "Search the {} expert knowledge base for relevant information.",
                manifest.slug()
            ),
        }]
    } else {
        manifest.mcp_tools.clone()
    };

    tools
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query",
                        },
                        "top_k": {
                            "type": "integer",
                            "description": "Maximum number of results to return",
                        },
                    },
                    "required": ["query"],
                },
            })
        })
        .collect()
}

async fn tool_call(state: &AppState, params: ToolCallParams) -> Result<Value, RpcError> {
    let known = state
        .manifest
        .mcp_tools
        .iter()
        .any(|tool| tool.name == params.name)
        || params.name == state.manifest.search_tool_name();
    if !known {
        return Err(RpcError::invalid_params(format!(
            "unknown tool: {}",
            params.name
        )));
    }
    if params.arguments.query.trim().is_empty() {
        return Err(RpcError::invalid_params("query must not be empty"));
    }

    let options = match params.arguments.top_k {
        Some(top_k) => SearchOptions::with_top_k(top_k),
        None => SearchOptions::default(),
    };
    let context = state
        .engine
        .retrieve(&params.arguments.query, &options)
        .await
        .map_err(|e| RpcError {
            code: ErrorCode::InternalError,
            message: format!("retrieval failed: {}", e),
            data: None,
        })?;

    Ok(json!({
        "content": [{
            "type": "text",
            "text": context.format_block(),
        }]
    }))
}

/// GET /mcp: SSE discovery endpoint. Sends the endpoint event, then keeps
/// the connection alive with comment pings until the client disconnects.
pub async fn sse_endpoint(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = Uuid::new_v4();
    info!(%session, "MCP SSE client connected");

    let endpoint_event =
        Event::default().data(json!({ "type": "endpoint", "url": "/mcp" }).to_string());
    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint_event) })
        .chain(stream::pending());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_PING_INTERVAL)
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::AgentManifest;

    #[test]
    fn test_tool_listing_wraps_manifest_tools() {
        let manifest = AgentManifest {
            name: "demo".to_string(),
            mcp_tools: vec![McpToolSpec {
                name: "search_demo_knowledge".to_string(),
                description: "Search demo docs.".to_string(),
            }],
            ..Default::default()
        };

        let listing = tool_listing(&manifest);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0]["name"], "search_demo_knowledge");
        assert_eq!(listing[0]["inputSchema"]["required"][0], "query");
        assert_eq!(
            listing[0]["inputSchema"]["properties"]["query"]["type"],
            "string"
        );
        assert_eq!(
            listing[0]["inputSchema"]["properties"]["top_k"]["type"],
            "integer"
        );
    }

    #[test]
    fn test_tool_listing_synthesizes_default_tool() {
        let manifest = AgentManifest {
            name: "Fresh Agent".to_string(),
            ..Default::default()
        };

        let listing = tool_listing(&manifest);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0]["name"], "search_fresh_agent_knowledge");
    }
}
