use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, head, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::protocol::API_PREFIX;
use shared::types::{
    BootstrapRequest, BootstrapResponse, ManifestSnapshot, ManifestSubmission, RegistrarInfo,
    ServiceView, ServiceWithSessions, SessionView,
};
use uuid::Uuid;
use crate::api::validation::{validate_bootstrap, validate_manifest};
use crate::error::RegistryError;
use crate::registrar::BootstrapOutcome;
use crate::registrar_handle::RegistrarHandle;
use crate::services::ServiceQuery;

#[derive(Clone)]
pub struct AppState {
    pub registrar: RegistrarHandle,
    pub info: Arc<RegistrarInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    NotFound,
    BadRequest,
    Conflict,
    InternalError,
    Unavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
}

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, msg: impl Into<String>) -> Self {
        ApiError(
            status,
            Json(ErrorResponse {
                error: msg.into(),
                code,
            }),
        )
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, msg)
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::EntityNotFound { .. } => ApiError::not_found(e.to_string()),
            RegistryError::Unavailable => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::Unavailable,
                e.to_string(),
            ),
            RegistryError::RepositoryOperationFailed { message, record } => {
                tracing::error!(?record, "Registrar write failed: {}", message);
                ApiError::internal_error(message)
            }
            RegistryError::Store(_) => {
                tracing::error!("Registrar operation failed: {}", e);
                ApiError::internal_error(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListParams {
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub last_ping_lower_threshold: Option<DateTime<Utc>>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/config", get(get_config))
        .route("/registrar", post(bootstrap))
        .route("/registrar/:session_id", head(ping))
        .route("/registrar/:session_id/manifest", post(submit_manifest))
        .route("/services", get(list_services))
        .route("/services/:service_id", get(get_service).delete(delete_service))
        .route("/services/:service_id/sessions", get(list_service_sessions))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/snapshots", get(list_snapshots))
        .route("/overview", get(overview));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

/// Malformed ids are reported the same way as unknown ones.
fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::warn!("Received a request with an invalid session id {:?}", raw);
        ApiError::not_found(format!("Session not found: {}", raw))
    })
}

async fn get_config(State(state): State<AppState>) -> Json<RegistrarInfo> {
    Json(state.info.as_ref().clone())
}

async fn bootstrap(
    State(state): State<AppState>,
    body: Result<Json<BootstrapRequest>, JsonRejection>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    let Json(request) = body?;
    if let Err(errors) = validate_bootstrap(&request) {
        tracing::warn!("Received an invalid bootstrap request: {}", errors.join("; "));
        return Err(ApiError::bad_request(errors.join("; ")));
    }

    let protocols = request.supported_protocols.unwrap_or_default();
    match state.registrar.bootstrap(request.identity, protocols).await? {
        BootstrapOutcome::Accepted(response) => Ok(Json(response)),
        BootstrapOutcome::NoCommonProtocol => {
            Err(ApiError::conflict("No mutually supported protocol"))
        }
    }
}

async fn submit_manifest(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<ManifestSubmission>, JsonRejection>,
) -> Result<Json<ManifestSnapshot>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let Json(submission) = body?;

    if let Err(errors) = validate_manifest(&submission) {
        return Err(ApiError::bad_request(errors.join("; ")));
    }

    let snapshot = state
        .registrar
        .add_manifest(session_id, submission.manifest)
        .await?;
    Ok(Json(snapshot))
}

async fn ping(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    state.registrar.ping(session_id).await?;
    Ok(StatusCode::OK)
}

async fn list_services(
    State(state): State<AppState>,
    Query(params): Query<ServiceListParams>,
) -> Result<Json<Vec<ServiceView>>, ApiError> {
    let query = ServiceQuery {
        hostname: params.hostname,
        app_name: params.app_name,
        app_version: params.app_version,
        min_last_ping: params.last_ping_lower_threshold,
    };
    Ok(Json(state.registrar.list_services(query).await?))
}

async fn get_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<ServiceView>, ApiError> {
    state
        .registrar
        .get_service(service_id.clone())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Service not found: {}", service_id)))
}

async fn delete_service(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registrar.delete_service(service_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_service_sessions(
    State(state): State<AppState>,
    Path(service_id): Path<String>,
) -> Result<Json<Vec<SessionView>>, ApiError> {
    Ok(Json(state.registrar.list_sessions(service_id).await?))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = parse_session_id(&session_id)?;
    state
        .registrar
        .get_session(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Session not found: {}", id)))
}

async fn list_snapshots(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<ManifestSnapshot>>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.registrar.list_snapshots(session_id).await?))
}

async fn overview(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceWithSessions>>, ApiError> {
    Ok(Json(state.registrar.list_services_with_sessions().await?))
}
