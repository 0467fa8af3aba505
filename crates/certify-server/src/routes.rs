use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use certify_agent::AgentError;
use certify_core::types::AgentResult;
use certify_extract::{ExtractError, TextExtractor};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

/// JSON error body: `{error, details?}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

pub(crate) fn bad_request(error: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        error: error.into(),
        details: None,
    }
}

/// 400 carrying the extractor's own explanation as `details`.
fn rejected(error: &str, details: String) -> ApiError {
    ApiError {
        details: Some(details),
        ..bad_request(error)
    }
}

pub(crate) fn internal(error: impl Into<String>, details: impl std::fmt::Display) -> ApiError {
    let error = error.into();
    tracing::error!("{error}: {details}");
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        error,
        details: Some(details.to_string()),
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match &e {
            AgentError::Model(_) => internal("Failed to analyze document.", &e),
            AgentError::InvalidAnalysis { excerpt, .. } => internal(
                "The model returned an analysis in an unexpected format.",
                format!("{e}; reply began: {excerpt}"),
            ),
        }
    }
}

impl From<ExtractError> for ApiError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::Vision(_) => internal("Vision service reported an error.", e),
            ExtractError::Empty => internal("No text could be extracted from the file.", e),
            ExtractError::Pdf(_) | ExtractError::Request(_) => {
                internal("Failed to extract text from the file.", e)
            },
        }
    }
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct AnalyzeTextBody {
    pub text: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct VaultQuery {
    pub limit: Option<i64>,
}

/// An uploaded file plus the optional `user_id` form field.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
    user_id: Option<String>,
}

// ── Router ────────────────────────────────────────────────────────────────

pub(crate) fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        // Health
        .route("/", get(health))
        // Analysis
        .route("/analyze-text", post(analyze_text))
        .route("/analyze-pdf", post(analyze_pdf))
        .route("/analyze-image", post(analyze_image))
        // Vault
        .route("/vault/:user_id", get(list_vault))
        .route("/vault/:user_id/:id", get(get_vault_record))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Shared helpers ────────────────────────────────────────────────────────

fn resolve_user(state: &AppState, user_id: Option<String>) -> String {
    user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| state.default_user_id.clone())
}

async fn read_upload(multipart: Result<Multipart, MultipartRejection>) -> Result<Upload, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        rejected("Invalid request: expected a multipart/form-data upload.", e.body_text())
    })?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut user_id = None;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| rejected("Invalid request: malformed multipart body.", e.body_text()))?;
        let Some(field) = field else { break };
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    rejected("Invalid request: could not read the uploaded file.", e.body_text())
                })?;
                file = Some((file_name, bytes.to_vec()));
            },
            Some("user_id") => {
                let text = field.text().await.map_err(|e| {
                    tracing::warn!("could not read user_id form field: {e}");
                    rejected("Invalid request: could not read the 'user_id' field.", e.body_text())
                })?;
                user_id = Some(text);
            },
            _ => {},
        }
    }

    let Some((file_name, bytes)) = file else {
        return Err(bad_request("No file part in the request."));
    };
    if file_name.trim().is_empty() {
        return Err(bad_request("No file selected."));
    }
    if bytes.is_empty() {
        return Err(bad_request("The uploaded file is empty."));
    }
    Ok(Upload {
        file_name,
        bytes,
        user_id,
    })
}

fn is_pdf(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

async fn analyze_upload(
    state: &AppState,
    extractor: &dyn TextExtractor,
    upload: Upload,
) -> Result<Json<AgentResult>, ApiError> {
    tracing::info!(file = %upload.file_name, size = upload.bytes.len(), "received upload");
    let text = extractor.extract(upload.bytes).await?;
    let user_id = resolve_user(state, upload.user_id);
    let result = state.orchestrator.run(&user_id, &text).await?;
    Ok(Json(result))
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "CertifyAI backend is running.",
    }))
}

pub(crate) async fn analyze_text(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AnalyzeTextBody>, JsonRejection>,
) -> Result<Json<AgentResult>, ApiError> {
    let Json(body) = body.map_err(|e| {
        rejected("Invalid request: expected a JSON body with a 'text' field.", e.body_text())
    })?;
    let text = body
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| bad_request("Invalid request: 'text' field is missing."))?;
    let user_id = resolve_user(&state, body.user_id);
    let result = state.orchestrator.run(&user_id, &text).await?;
    Ok(Json(result))
}

pub(crate) async fn analyze_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AgentResult>, ApiError> {
    let upload = read_upload(multipart).await?;
    if !is_pdf(&upload.file_name) {
        return Err(bad_request("Invalid file type: only PDF files are accepted."));
    }
    analyze_upload(&state, state.pdf.as_ref(), upload).await
}

pub(crate) async fn analyze_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AgentResult>, ApiError> {
    let upload = read_upload(multipart).await?;
    analyze_upload(&state, state.ocr.as_ref(), upload).await
}

// Vault

pub(crate) async fn list_vault(
    State(state): State<Arc<AppState>>,
    user_id: Result<Path<String>, PathRejection>,
    query: Result<Query<VaultQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(user_id) =
        user_id.map_err(|e| rejected("Invalid request: bad vault path.", e.body_text()))?;
    let Query(q) = query.map_err(|e| {
        rejected("Invalid request: 'limit' must be a whole number.", e.body_text())
    })?;
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    let records = state
        .db
        .list_analyses(&user_id, limit)
        .map_err(|e| internal("Failed to read the vault.", format!("{e:#}")))?;
    Ok(Json(json!({ "analyses": records })))
}

pub(crate) async fn get_vault_record(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path((user_id, id)) = path.map_err(|e| {
        rejected("Invalid request: analysis id must be a whole number.", e.body_text())
    })?;
    match state
        .db
        .get_analysis(&user_id, id)
        .map_err(|e| internal("Failed to read the vault.", format!("{e:#}")))?
    {
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            error: format!("No analysis {id} for user {user_id}."),
            details: None,
        }),
        Some(record) => Ok(Json(json!(record))),
    }
}
