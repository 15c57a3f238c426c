// src/routes.rs
//! HTTP surface of the orchestrator.

use crate::context::ServerContext;
use crate::ws;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bandmaster_core::models::{
    ChordEvent, GenerationParams, RequestId, SessionId, TrackType,
};
use bandmaster_core::Error;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/api/generate", post(submit_generation))
        .route("/api/requests/{id}", get(request_status))
        .route("/api/files", get(list_files))
        .route("/api/files/{filename}", get(download_file).delete(delete_file))
        .route("/ws/{session_id}", get(ws::session_socket))
        .with_state(ctx)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Error wrapper so handlers can use `?` with core errors.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) | Error::Parse(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::UnknownSession(_) => StatusCode::NOT_FOUND,
            Error::DuplicateFile(_) | Error::DuplicateSession(_) => StatusCode::CONFLICT,
            Error::GeneratorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::GeneratorTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChordProgressionBody {
    pub(crate) chords: Vec<ChordEvent>,
    #[serde(default = "default_tempo")]
    pub(crate) tempo: u32,
    #[serde(default = "default_key")]
    pub(crate) key: String,
    #[serde(default = "default_duration")]
    pub(crate) duration: f64,
}

fn default_tempo() -> u32 {
    120
}

fn default_key() -> String {
    "C".to_string()
}

fn default_duration() -> f64 {
    32.0
}

pub(crate) fn default_track_types() -> Vec<TrackType> {
    vec![TrackType::Bass, TrackType::Drums]
}

#[derive(Deserialize)]
struct GenerateBody {
    chord_progression: ChordProgressionBody,
    #[serde(default = "default_track_types")]
    track_types: Vec<TrackType>,
    #[serde(default)]
    plugin_id: Option<String>,
}

async fn service_info(State(ctx): State<Arc<ServerContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "AI Band Orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "connected_plugins": ctx.sessions.active_count(),
    }))
}

async fn health(State(ctx): State<Arc<ServerContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "backend_configured": ctx.backend_configured,
        "active_sessions": ctx.sessions.active_count(),
        "known_sessions": ctx.sessions.session_count(),
        "generated_files": ctx.files.len(),
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
    }))
}

async fn submit_generation(
    State(ctx): State<Arc<ServerContext>>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let params = GenerationParams {
        chords: body.chord_progression.chords,
        tempo: body.chord_progression.tempo,
        key: body.chord_progression.key,
        duration_beats: body.chord_progression.duration,
        track_types: body.track_types,
        session_id: body.plugin_id.map(SessionId),
    };
    let id = ctx.coordinator.submit(params)?;
    Ok(Json(json!({ "request_id": id, "status": "pending" })))
}

async fn request_status(
    State(ctx): State<Arc<ServerContext>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let uuid = Uuid::parse_str(&id)
        .map_err(|_| Error::InvalidRequest(format!("invalid request id '{id}'")))?;
    let request = ctx
        .coordinator
        .status(&RequestId(uuid))
        .ok_or_else(|| Error::NotFound(id))?;
    Ok(Json(serde_json::to_value(&request).map_err(Error::from)?))
}

#[derive(Deserialize)]
struct FilesQuery {
    track_type: Option<TrackType>,
    since: Option<DateTime<Utc>>,
}

async fn list_files(
    State(ctx): State<Arc<ServerContext>>,
    Query(query): Query<FilesQuery>,
) -> Json<serde_json::Value> {
    let files = ctx.files.list(query.track_type, query.since);
    Json(json!({ "count": files.len(), "files": files }))
}

async fn download_file(
    State(ctx): State<Arc<ServerContext>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    use bandmaster_core::models::FileId;

    // Only registry-known files are served; this also rejects any
    // path-traversal attempt since registered ids are bare filenames.
    let file = ctx
        .files
        .get(&FileId(filename.clone()))
        .ok_or_else(|| Error::NotFound(filename.clone()))?;

    let path = ctx.config.files_dir.join(&file.id.0);
    let bytes = tokio::fs::read(&path).await.map_err(Error::from)?;
    Ok((
        [
            (header::CONTENT_TYPE, "audio/midi".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.id),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn delete_file(
    State(ctx): State<Arc<ServerContext>>,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    use bandmaster_core::models::FileId;

    let id = FileId(filename);
    let removed = ctx.files.remove(&id).await?;

    let path = ctx.config.files_dir.join(&removed.id.0);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!("could not delete {}: {e}", path.display());
    }
    let sidecar = ctx
        .config
        .files_dir
        .join(format!("{}.meta.json", removed.id));
    let _ = tokio::fs::remove_file(&sidecar).await;

    Ok(Json(json!({ "deleted": removed.id })))
}
