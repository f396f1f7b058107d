//! HTTP route handlers for the try-on API

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::covering::{CoveringRequest, Material, PatternKind};
use crate::detection::DetectorKind;
use crate::pipeline::{PipelineError, SurfaceReport, TryOnOutcome, TryOnPipeline};
use crate::storage::{StorageError, content_type_for, validate_key};

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<TryOnPipeline>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<PipelineError> for ApiErrorResponse {
    fn from(e: PipelineError) -> Self {
        let code = match &e {
            PipelineError::Input(_) => "invalid_request",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Internal(_) => "internal_error",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "invalid_request" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Response for POST /api/images
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub image_id: String,
}

/// Response for GET /api/coverings
#[derive(Debug, Serialize)]
pub struct CoveringCatalogue {
    pub textures: Vec<String>,
    pub patterns: Vec<PatternKind>,
    pub materials: Vec<Material>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    storage_backend: &'static str,
    detectors: Vec<DetectorKind>,
}

/// POST /api/images - Store raw image bytes as a new upload
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiErrorResponse> {
    if body.is_empty() {
        return Err(PipelineError::Input("empty upload".to_string()).into());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let image_id = state
        .pipeline
        .repository()
        .store_upload(body, content_type)
        .await
        .map_err(|e| {
            tracing::error!("Failed to store upload: {}", e);
            ApiErrorResponse::from(PipelineError::from(e))
        })?;

    Ok((StatusCode::CREATED, Json(UploadResponse { image_id })))
}

/// POST /api/images/:id/detect - Locate the coverable surface
pub async fn detect_surface(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<SurfaceReport>, ApiErrorResponse> {
    let report = state.pipeline.detect_surface(&image_id).await.map_err(|e| {
        tracing::warn!("Surface detection failed for {}: {}", image_id, e);
        ApiErrorResponse::from(e)
    })?;
    Ok(Json(report))
}

/// POST /api/images/:id/tryon - Composite a covering onto the image
pub async fn try_on(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Json(request): Json<CoveringRequest>,
) -> Result<Json<TryOnOutcome>, ApiErrorResponse> {
    let outcome = state.pipeline.try_on(&image_id, request).await.map_err(|e| {
        tracing::warn!("Try-on failed for {}: {}", image_id, e);
        ApiErrorResponse::from(e)
    })?;
    Ok(Json(outcome))
}

/// GET /api/coverings - Textures on disk plus the generated pattern options
pub async fn list_coverings(State(state): State<AppState>) -> Json<CoveringCatalogue> {
    Json(CoveringCatalogue {
        textures: state.pipeline.engine().textures().list().await,
        patterns: PatternKind::ALL.to_vec(),
        materials: Material::ALL.to_vec(),
    })
}

/// GET /artifacts/*key - Serve a stored artifact
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiErrorResponse> {
    let invalid = |e: StorageError| ApiErrorResponse::from(PipelineError::from(e));
    validate_key(&key).map_err(invalid)?;

    let bytes = state
        .pipeline
        .repository()
        .store()
        .get(&key)
        .await
        .map_err(invalid)?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&key)),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        storage_backend: state.pipeline.repository().store().backend(),
        detectors: state.pipeline.orchestrator().chain(),
    })
}

/// Build the application router
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/coverings", get(list_coverings))
        .route("/api/images", post(upload_image))
        .route("/api/images/:id/detect", post(detect_surface))
        .route("/api/images/:id/tryon", post(try_on))
        .route("/artifacts/*key", get(get_artifact))
        .with_state(state)
}
