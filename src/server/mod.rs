//! Runtime HTTP server: one listener, three protocol facades
//!
//! Routes: the OpenAI-compatible REST chat facade, MCP (JSON-RPC plus an SSE
//! discovery endpoint), and the A2A JSON-RPC surface, plus an unauthenticated
//! `/health`. Middleware order: request log, CORS, auth, route.

pub mod a2a;
pub mod chat;
pub mod mcp;

use crate::context::AppContext;
use crate::embedder::EmbeddingClient;
use crate::error::{RagError, Result};
use crate::knowledge::{graph_dir, vectors_dir, FlatVectorIndex, LexicalGraphStore};
use crate::llm::LlmClient;
use crate::manifest::AgentManifest;
use crate::reranker::RerankClient;
use crate::search::HybridSearchEngine;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup, cloned per request as needed
    pub manifest: Arc<AgentManifest>,
    /// Retrieval engine shared by every facade
    pub engine: Arc<HybridSearchEngine>,
    /// Chat completion upstream
    pub llm: Arc<LlmClient>,
    /// Bearer key; `None` leaves the server open
    pub api_key: Option<String>,
}

/// Error wrapper mapping the crate taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RagError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Upstream(_) | RagError::RateLimited(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Assemble the full router with its middleware stack
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.manifest.cors_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/mcp", get(mcp::sse_endpoint).post(mcp::rpc_endpoint))
        .route("/rpc/agent", post(a2a::rpc_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth))
        .layer(cors)
        .layer(middleware::from_fn(request_log))
        .with_state(state)
}

/// Open the databases and serve until interrupted
pub async fn serve(ctx: AppContext) -> Result<()> {
    ctx.config.validate()?;
    ctx.manifest.validate()?;
    let dimension = ctx.embedding_dimension();

    let vectors =
        Arc::new(FlatVectorIndex::open(vectors_dir(&ctx.project_dir), dimension).await?);
    let graph = Arc::new(LexicalGraphStore::open(graph_dir(&ctx.project_dir)).await?);
    let embedder = Arc::new(EmbeddingClient::new(ctx.config.embedder.clone(), dimension));
    let reranker = ctx
        .config
        .reranker
        .is_enabled()
        .then(|| Arc::new(RerankClient::new(ctx.config.reranker.clone())));
    if reranker.is_none() {
        info!("No reranker configured, serving cosine order");
    }

    let engine = Arc::new(HybridSearchEngine::new(vectors, graph, embedder, reranker));
    let llm = Arc::new(LlmClient::new(ctx.config.llm.clone()));
    let api_key =
        (!ctx.config.agent_api_key.is_empty()).then(|| ctx.config.agent_api_key.clone());
    if api_key.is_none() {
        warn!("AGENT_API_KEY not set, serving without authentication");
    }

    // An explicitly configured port wins; otherwise the manifest decides
    let port = if ctx.config.port != 8000 {
        ctx.config.port
    } else {
        ctx.manifest.server_port
    };

    let state = AppState {
        manifest: Arc::new(ctx.manifest.clone()),
        engine,
        llm,
        api_key,
    };
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RagError::Internal(format!("bind {}: {}", addr, e)))?;
    info!(agent = %ctx.manifest.name, %addr, "Serving REST chat, MCP, and A2A");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| RagError::Internal(format!("server: {}", e)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

/// One log line per completed request
async fn request_log(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "-".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        remote,
        "request"
    );
    response
}

/// Bearer auth on everything except /health and CORS preflight
async fn auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" || request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(key) if key == expected => next.run(request).await,
        _ => ApiError(RagError::Unauthorized(
            "missing or invalid bearer token".to_string(),
        ))
        .into_response(),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "agent": state.manifest.name,
        "version": state.manifest.version,
    }))
}
