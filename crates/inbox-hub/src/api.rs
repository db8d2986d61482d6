use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use inbox_core::{
    BatchOutcome, InboxItem, ItemSubmission, SeqNo, Session, SessionMetadata, StatusList,
    StatusView,
};
use inbox_engine::{InboxService, IngestError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

type AppState = Arc<InboxService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upload", post(open_session).get(list_statuses))
        .route("/upload/:session_id", get(get_status))
        .route("/upload/:session_id/items", put(submit_batch))
        .route("/upload/:session_id/complete", post(complete_session))
        .route("/upload/:session_id/items/pending", get(pending_items))
        .route(
            "/upload/:session_id/items/:seq_no/processing",
            post(mark_processing),
        )
        .route("/upload/:session_id/items/:seq_no/done", post(mark_done))
        .route("/upload/:session_id/items/:seq_no/error", post(mark_error))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    pub expected_count: i64,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Deserialize)]
pub struct ItemErrorRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError(IngestError);

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            IngestError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            IngestError::EmptyBatch => (StatusCode::BAD_REQUEST, "EMPTY_BATCH"),
            IngestError::BatchTooLarge { .. } => (StatusCode::BAD_REQUEST, "BATCH_TOO_LARGE"),
            IngestError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            IngestError::ItemNotFound { .. } => (StatusCode::NOT_FOUND, "ITEM_NOT_FOUND"),
            IngestError::Gone { .. } => (StatusCode::GONE, "UPLOAD_SESSION_EXPIRED"),
            IngestError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            IngestError::SessionNotSealed { .. } => (StatusCode::CONFLICT, "SESSION_NOT_SEALED"),
            IngestError::Config(_) | IngestError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(event = "request_failed", code, error = %self.0);
        } else {
            warn!(event = "request_rejected", code, error = %self.0);
        }
        let body = ErrorBody {
            code: code.to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn open_session(
    State(service): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = service.open_session(request.expected_count, request.metadata)?;
    let location = format!("/upload/{}", session.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(session),
    ))
}

async fn submit_batch(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    Json(items): Json<Vec<ItemSubmission>>,
) -> Result<Json<BatchOutcome>, ApiError> {
    Ok(Json(service.submit_batch(&session_id, &items)?))
}

async fn get_status(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusView>, ApiError> {
    Ok(Json(service.get_status(&session_id)?))
}

async fn list_statuses(State(service): State<AppState>) -> Result<Json<StatusList>, ApiError> {
    Ok(Json(service.list_statuses()?))
}

async fn complete_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(service.complete_session(&session_id)?))
}

async fn pending_items(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<InboxItem>>, ApiError> {
    service.session(&session_id)?;
    Ok(Json(service.transitions().pending_items(&session_id)?))
}

async fn mark_processing(
    State(service): State<AppState>,
    Path((session_id, seq_no)): Path<(String, SeqNo)>,
) -> Result<Json<InboxItem>, ApiError> {
    Ok(Json(
        service.transitions().mark_processing(&session_id, seq_no)?,
    ))
}

async fn mark_done(
    State(service): State<AppState>,
    Path((session_id, seq_no)): Path<(String, SeqNo)>,
) -> Result<Json<InboxItem>, ApiError> {
    Ok(Json(service.transitions().mark_done(&session_id, seq_no)?))
}

async fn mark_error(
    State(service): State<AppState>,
    Path((session_id, seq_no)): Path<(String, SeqNo)>,
    Json(request): Json<ItemErrorRequest>,
) -> Result<Json<InboxItem>, ApiError> {
    Ok(Json(service.transitions().mark_error(
        &session_id,
        seq_no,
        request.message,
    )?))
}
