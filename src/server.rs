//! HTTP API for the chat frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service status (index, embedding dimensions) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/chat` | Run one conversation turn |
//! | `POST` | `/generate_title` | Short title for a new chat |
//! | `POST` | `/upload` | Ingest a document (multipart field `file`) |
//! | `GET`  | `/files` | Placeholder; listing is owned by the frontend database |
//! | `DELETE` | `/files/{filename}` | Remove a document's vectors |
//! | `GET`  | `/settings/system-prompt` | Current system instructions |
//! | `PUT`  | `/settings/system-prompt` | Replace system instructions |
//! | `POST` | `/settings/system-prompt/sync` | Force a refresh from the remote store |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_unavailable` (503),
//! `upstream_error` (502), `internal` (500).
//!
//! `/chat` never fails once the request is valid: pipeline failures end in
//! the apology text and are logged, not returned.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser frontend.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use docchat_core::{ConversationTurn, PipelineError, Role};

use crate::app::{ServiceStatus, Services};
use crate::config::Config;
use crate::ingest::{IngestError, IngestReport};

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Build services from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Arc::new(Services::from_config(config)?);
    run_server_with_services(config, services).await
}

/// Serve prebuilt services on `[server].bind`.
///
/// Spawns the startup instruction sync in the background so the listener
/// comes up immediately even when the remote store is slow.
pub async fn run_server_with_services(
    config: &Config,
    services: Arc<Services>,
) -> anyhow::Result<()> {
    let cache = services.instructions().clone();
    tokio::spawn(async move {
        cache.warm_up().await;
    });

    let app = router(services, config.server.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "docchat server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// The application router with CORS, request tracing and the upload size limit.
pub fn router(services: Arc<Services>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_status))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/generate_title", post(handle_title))
        .route("/upload", post(handle_upload))
        .route("/files", get(handle_list_files))
        .route("/files/{filename}", delete(handle_delete_file))
        .route(
            "/settings/system-prompt",
            get(handle_get_prompt).put(handle_set_prompt),
        )
        .route("/settings/system-prompt/sync", post(handle_sync_prompt))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Malformed or incomplete JSON bodies use the same error contract.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => bad_request(msg),
            e @ PipelineError::Transient { .. } => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream_error",
                message: e.to_string(),
            },
            e @ PipelineError::TotalSynthesisFailure(_) => internal(e.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            e @ IngestError::IndexDisabled => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "index_unavailable",
                message: e.to_string(),
            },
            IngestError::Pipeline(inner) => inner.into(),
            e if e.is_client_error() => bad_request(e.to_string()),
            e => internal(e.to_string()),
        }
    }
}

// ============ GET / and /health ============

async fn handle_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.services.status())
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    history: Vec<HistoryMessage>,
}

/// A history entry as the frontend sends it. Unknown roles count as the user.
#[derive(Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

impl From<HistoryMessage> for ConversationTurn {
    fn from(m: HistoryMessage) -> Self {
        ConversationTurn::new(Role::parse_lenient(&m.role), m.content)
    }
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    used_context: bool,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let history: Vec<ConversationTurn> = req.history.into_iter().map(Into::into).collect();

    let span = info_span!(
        "turn",
        turn_id = %Uuid::new_v4(),
        chat_id = req.chat_id.as_deref().unwrap_or("-"),
        user_id = req.user_id.as_deref().unwrap_or("-")
    );
    let orchestrator = state.services.orchestrator();
    let result = async {
        let result = orchestrator.run_turn(&req.message, &history).await;
        if let Some(errors) = &result.errors {
            warn!(count = errors.len(), "turn completed with degraded stages");
        }
        info!(used_context = result.used_context, "turn finished");
        result
    }
    .instrument(span)
    .await;

    Ok(Json(ChatResponse {
        response: result.answer_text,
        used_context: result.used_context,
    }))
}

// ============ POST /generate_title ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleRequest {
    message: String,
    #[serde(default)]
    chat_id: Option<String>,
}

#[derive(Serialize)]
struct TitleResponse {
    title: String,
}

async fn handle_title(
    State(state): State<AppState>,
    payload: Result<Json<TitleRequest>, JsonRejection>,
) -> Result<Json<TitleResponse>, AppError> {
    let Json(req) = payload?;
    let title = state
        .services
        .synthesizer()
        .generate_title(&req.message)
        .await
        .map_err(|e| {
            warn!(chat_id = req.chat_id.as_deref().unwrap_or("-"), error = %e, "title generation failed");
            match e {
                PipelineError::Validation(msg) => bad_request(msg),
                other => internal(other.to_string()),
            }
        })?;
    Ok(Json(TitleResponse { title }))
}

// ============ POST /upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let report = state
            .services
            .ingestor()
            .ingest(&filename, bytes.to_vec(), content_type.as_deref())
            .await
            .inspect_err(|e| warn!(file = %filename, error = %e, "upload failed"))?;
        return Ok(Json(report));
    }
    Err(bad_request("multipart field 'file' is required"))
}

// ============ /files ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

async fn handle_list_files() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "File listing handled by frontend database".to_string(),
        status: None,
    })
}

async fn handle_delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.services.ingestor().delete_document(&filename).await?;
    Ok(Json(MessageResponse {
        message: format!("Successfully deleted vectors for '{}'", filename),
        status: Some("deleted".to_string()),
    }))
}

// ============ /settings/system-prompt ============

#[derive(Deserialize, Serialize)]
struct PromptBody {
    system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

#[derive(Serialize)]
struct PromptUpdated {
    message: String,
    system_prompt: String,
    persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

async fn handle_get_prompt(State(state): State<AppState>) -> Json<PromptBody> {
    Json(PromptBody {
        system_prompt: state.services.instructions().get(false).await,
        source: None,
    })
}

async fn handle_set_prompt(
    State(state): State<AppState>,
    payload: Result<Json<PromptBody>, JsonRejection>,
) -> Result<Json<PromptUpdated>, AppError> {
    let Json(body) = payload?;
    let receipt = state.services.instructions().set(&body.system_prompt).await?;
    Ok(Json(PromptUpdated {
        message: "System prompt updated".to_string(),
        system_prompt: body.system_prompt,
        persisted: receipt.persisted,
        warning: receipt.warning,
    }))
}

async fn handle_sync_prompt(State(state): State<AppState>) -> Json<PromptBody> {
    let resolved = state.services.instructions().resolve(true).await;
    if let Some(e) = &resolved.remote_error {
        warn!(error = %e, "forced instruction sync could not reach the remote store");
    }
    Json(PromptBody {
        system_prompt: resolved.value.to_string(),
        source: Some(resolved.tier.as_str().to_string()),
    })
}
