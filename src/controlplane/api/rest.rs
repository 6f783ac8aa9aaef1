//! REST API Handlers
//!
//! Exposes every registered volume driver over JSON. The host posts the
//! job objects and claims it already holds and gets the updated per-volume
//! records back; nothing is persisted here.

use crate::controlplane::registry::DriverRegistry;
use crate::crd::{ApplicationBackup, ApplicationRestore, BackupVolumeInfo, RestoreVolumeInfo};
use crate::driver::VolumeDriverRef;
use crate::error::Error;
use axum::{
    extract::{DefaultBodyLimit, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Start a backup of the given claims
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBackupRequest {
    pub backup: ApplicationBackup,
    #[serde(default)]
    pub claims: Vec<PersistentVolumeClaim>,
}

/// Restore the given backup records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRestoreRequest {
    pub restore: ApplicationRestore,
    #[serde(default)]
    pub backups: Vec<BackupVolumeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipResponse {
    pub driver: String,
    pub owned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVolumesResponse {
    pub volumes: Vec<BackupVolumeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreVolumesResponse {
    pub volumes: Vec<RestoreVolumeInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverListResponse {
    pub drivers: Vec<String>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Driver error rendered as an HTTP response
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

/// HTTP status for a driver error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotSupported { .. } => StatusCode::NOT_IMPLEMENTED,
        Error::Lookup { .. } => StatusCode::NOT_FOUND,
        Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::RemoteService { .. } | Error::CleanupFailed { .. } => StatusCode::BAD_GATEWAY,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::DriverAlreadyRegistered { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let details = match &self.0 {
            Error::RemoteService { status, .. } => Some(format!("remote status {}", status)),
            Error::CleanupFailed { failures } => Some(failures.join("\n")),
            _ => None,
        };
        (
            status,
            Json(ApiErrorResponse {
                error: self.0.kind().to_string(),
                message: self.0.to_string(),
                details,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    registry: Arc<DriverRegistry>,
    max_body_size: usize,
}

impl RestRouter {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            max_body_size: 10 * 1024 * 1024,
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            registry: self.registry,
        };

        Router::new()
            // Driver endpoints
            .route("/v1/drivers", get(list_drivers))
            .route("/v1/drivers/:driver/owns/claim", post(owns_claim))
            .route("/v1/drivers/:driver/owns/volume", post(owns_volume))
            // Backup endpoints
            .route("/v1/drivers/:driver/backups", post(start_backup))
            .route("/v1/drivers/:driver/backups/status", post(backup_status))
            .route("/v1/drivers/:driver/backups/cancel", post(cancel_backup))
            .route("/v1/drivers/:driver/backups/delete", post(delete_backup))
            // Restore endpoints
            .route("/v1/drivers/:driver/restores", post(start_restore))
            .route("/v1/drivers/:driver/restores/status", post(restore_status))
            .route("/v1/drivers/:driver/restores/cancel", post(cancel_restore))
            // Volume endpoints
            .route("/v1/drivers/:driver/volumes/migrated", post(migrated_volume))
            // Health endpoints
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<DriverRegistry>,
}

impl AppState {
    fn driver(&self, name: &str) -> ApiResult<VolumeDriverRef> {
        Ok(self.registry.get(name)?)
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn list_drivers(State(state): State<AppState>) -> Json<DriverListResponse> {
    Json(DriverListResponse {
        drivers: state.registry.names(),
    })
}

async fn owns_claim(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(claim): Json<PersistentVolumeClaim>,
) -> ApiResult<Json<OwnershipResponse>> {
    let owned = state.driver(&driver)?.owns_claim(&claim).await;
    debug!("Driver {} owns claim {}: {}", driver, claim.name_any(), owned);
    Ok(Json(OwnershipResponse { driver, owned }))
}

async fn owns_volume(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(volume): Json<PersistentVolume>,
) -> ApiResult<Json<OwnershipResponse>> {
    let owned = state.driver(&driver)?.owns_volume(&volume);
    Ok(Json(OwnershipResponse { driver, owned }))
}

async fn start_backup(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(request): Json<StartBackupRequest>,
) -> ApiResult<Json<BackupVolumesResponse>> {
    info!(
        "Starting backup {} of {} claim(s) with driver {}",
        request.backup.name_any(),
        request.claims.len(),
        driver
    );
    let volumes = state
        .driver(&driver)?
        .start_backup(&request.backup, &request.claims)
        .await?;
    Ok(Json(BackupVolumesResponse { volumes }))
}

async fn backup_status(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(backup): Json<ApplicationBackup>,
) -> ApiResult<Json<BackupVolumesResponse>> {
    let volumes = state.driver(&driver)?.get_backup_status(&backup).await?;
    Ok(Json(BackupVolumesResponse { volumes }))
}

async fn cancel_backup(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(backup): Json<ApplicationBackup>,
) -> ApiResult<StatusCode> {
    info!("Cancelling backup {}", backup.name_any());
    state.driver(&driver)?.cancel_backup(&backup).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_backup(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(backup): Json<ApplicationBackup>,
) -> ApiResult<StatusCode> {
    info!("Deleting backup {}", backup.name_any());
    state.driver(&driver)?.delete_backup(&backup).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_restore(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(request): Json<StartRestoreRequest>,
) -> ApiResult<Json<RestoreVolumesResponse>> {
    info!(
        "Starting restore {} of {} volume(s) with driver {}",
        request.restore.name_any(),
        request.backups.len(),
        driver
    );
    let volumes = state
        .driver(&driver)?
        .start_restore(&request.restore, &request.backups)
        .await?;
    Ok(Json(RestoreVolumesResponse { volumes }))
}

async fn restore_status(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(restore): Json<ApplicationRestore>,
) -> ApiResult<Json<RestoreVolumesResponse>> {
    let volumes = state.driver(&driver)?.get_restore_status(&restore).await?;
    Ok(Json(RestoreVolumesResponse { volumes }))
}

async fn cancel_restore(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(restore): Json<ApplicationRestore>,
) -> ApiResult<StatusCode> {
    state.driver(&driver)?.cancel_restore(&restore).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn migrated_volume(
    State(state): State<AppState>,
    Path(driver): Path<String>,
    Json(volume): Json<PersistentVolume>,
) -> ApiResult<Json<PersistentVolume>> {
    let updated = state
        .driver(&driver)?
        .update_migrated_volume_spec(volume)
        .await?;
    Ok(Json(updated))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready once at least one driver is registered
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.names().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no volume drivers registered")
    } else {
        (StatusCode::OK, "ready")
    }
}
