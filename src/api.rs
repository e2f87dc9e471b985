use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::cache::CacheScope;
use crate::error::PipelineError;
use crate::pipeline::{CacheStatus, TilePipeline};
use crate::query::{QueryContext, SortOrder};

pub const HEADER_TILE_CACHE: &str = "x-tile-cache";
pub const HEADER_AI_USED: &str = "x-ai-used";
pub const HEADER_AI_PROVIDER: &str = "x-ai-provider";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TilePipeline>,
}

impl AppState {
    pub fn new(pipeline: TilePipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/tiles/fetch", post(fetch_tile))
        .route("/tiles/refresh", post(refresh_tile))
        .route("/tiles/analyze", post(analyze_tile))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TileRequest {
    #[serde(flatten)]
    pub query: QueryContext,
    #[serde(default)]
    pub sort: SortOrder,
}

/// Identity comes from upstream auth as plain headers; authentication itself
/// happens before this service.
fn scope_from(headers: &HeaderMap) -> CacheScope {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    CacheScope {
        user_id: read("x-user-id"),
        session_id: read("x-session-id"),
    }
}

pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(PipelineError::configuration(r.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Configuration(_) => StatusCode::BAD_REQUEST,
            PipelineError::TotalFetchFailure { .. } => StatusCode::BAD_GATEWAY,
        };
        let mut body = json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if self.0.is_retryable() {
            body["retryable"] = json!(true);
        }
        (status, Json(body)).into_response()
    }
}

fn cache_header(headers: &mut HeaderMap, status: CacheStatus) {
    headers.insert(HEADER_TILE_CACHE, HeaderValue::from_static(status.as_header()));
}

async fn fetch_tile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TileRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let out = state
        .pipeline
        .fetch(req.query, &scope_from(&headers), req.sort)
        .await?;
    let mut h = HeaderMap::new();
    cache_header(&mut h, out.cache);
    Ok((h, Json(out.data)).into_response())
}

async fn refresh_tile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TileRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let out = state
        .pipeline
        .refresh(req.query, &scope_from(&headers), req.sort)
        .await?;
    let mut h = HeaderMap::new();
    cache_header(&mut h, out.cache);
    Ok((h, Json(out.data)).into_response())
}

async fn analyze_tile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TileRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    let out = state
        .pipeline
        .analyze(req.query, &scope_from(&headers), req.sort)
        .await?;
    let mut h = HeaderMap::new();
    cache_header(&mut h, out.cache);
    h.insert(
        HEADER_AI_USED,
        HeaderValue::from_static(if out.ai_used { "1" } else { "0" }),
    );
    h.insert(HEADER_AI_PROVIDER, HeaderValue::from_static(out.provider));
    Ok((h, Json(out.data)).into_response())
}
