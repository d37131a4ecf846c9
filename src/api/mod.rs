// REST API
// GET /search, POST /chat and GET /health over the catalog


use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use crate::chat::{ChatAssistant, ChatContext};
use crate::config::{Config, ServerConfig};
use crate::database::Database;
use crate::database::lancedb::VectorStore;
use crate::llm::SharedModel;
use crate::llm::prompts::QueryIntent;
use crate::search::{SearchError, SearchResponse, SearchType, SemanticSearch};

#[derive(Clone)]
pub struct AppState {
    pub search: SemanticSearch,
    pub chat: ChatAssistant,
    pub database: Arc<Database>,
    pub vector_store: Arc<VectorStore>,
}

impl AppState {
    #[inline]
    pub fn new(
        database: Arc<Database>,
        vector_store: Arc<VectorStore>,
        model: SharedModel,
        config: &Config,
    ) -> Self {
        let search = SemanticSearch::new(
            Arc::clone(&database),
            Arc::clone(&vector_store),
            Arc::clone(&model),
            config.search,
        );
        let chat = ChatAssistant::new(search.clone(), model);
        Self {
            search,
            chat,
            database,
            vector_store,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The language model provider failed
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Upstream(message) => {
                warn!("Provider failure: {}", message);
                (StatusCode::BAD_GATEWAY, message)
            }
            ApiError::Internal(message) => {
                error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::EmptyQuery | SearchError::InvalidSearchType(_) => {
                ApiError::BadRequest(error.to_string())
            }
            SearchError::Embedding(_) => ApiError::Upstream(error.to_string()),
            SearchError::Database(_) => ApiError::Internal(error.to_string()),
        }
    }
}

/// Raw query string. Values are parsed by hand so bad input gets a JSON error.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<String>,
    pub search_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub intent: QueryIntent,
    pub sources: ChatContext,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub universities: i64,
    pub courses: i64,
    pub embeddings: u64,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Missing required parameter: query".to_string(),
        ));
    }

    let limit = params
        .limit
        .map(|raw| {
            raw.trim().parse::<usize>().map_err(|_| {
                ApiError::BadRequest(format!("Invalid limit: {raw:?} (must be a positive integer)"))
            })
        })
        .transpose()?;

    let search_type = match params.search_type {
        Some(raw) => raw.parse::<SearchType>()?,
        None => SearchType::All,
    };

    let response = state.search.search(&query, limit, search_type).await?;
    Ok(Json(response))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let reply = state.chat.respond(&request.message).await;
    Ok(Json(ChatResponse {
        answer: reply.answer,
        intent: reply.intent,
        sources: reply.context,
    }))
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let counts = state
        .database
        .counts()
        .await
        .map_err(|e| ApiError::Internal(format!("{e:#}")))?;
    let embeddings = state
        .vector_store
        .count_embeddings(None)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        universities: counts.universities,
        courses: counts.courses,
        embeddings,
    }))
}

fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Build the application router
#[inline]
pub fn router(state: AppState, allowed_origins: &[String]) -> Result<Router> {
    Ok(Router::new()
        .route("/search", get(search))
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(cors_layer(allowed_origins)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Serve the API until Ctrl-C
#[inline]
pub async fn serve(state: AppState, server: &ServerConfig) -> Result<()> {
    let app = router(state, &server.allowed_origins)?;
    let addr = server.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
