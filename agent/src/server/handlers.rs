//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::deploy::orchestrator::check_archive_content_type;
use crate::deploy::{ArchiveSource, ControlAction, ControlOutcome, UpdateOutcome};
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::server::response::ApiResult;
use crate::server::state::ServerState;
use crate::targets::TargetKind;
use crate::telemetry::{collect_host_info, HostInfo};
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub targets: usize,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "updater-agent".to_string(),
        version: version.version,
        targets: state.registry.len(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

// ================================ UPDATES ======================================= //

pub async fn update_pool_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<UpdateOutcome>> {
    update_target(state, name, TargetKind::AppPool, multipart).await
}

pub async fn update_process_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<UpdateOutcome>> {
    update_target(state, name, TargetKind::Process, multipart).await
}

async fn update_target(
    state: Arc<ServerState>,
    name: String,
    kind: TargetKind,
    multipart: Multipart,
) -> ApiResult<Json<UpdateOutcome>> {
    let target = state.registry.resolve_kind(&name, kind)?;
    let upload = receive_archive(multipart).await?;
    info!(target = %name, upload = %upload.path().display(), "Archive received");

    // The upload outlives a dropped request until the pipeline is done with it
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move {
        let result = orchestrator
            .update(target, ArchiveSource::Path(upload.path().to_path_buf()))
            .await;

        if let Err(e) = upload.delete().await {
            warn!("Unable to remove upload {}: {}", upload.path().display(), e);
        }
        result
    })
    .await
    .map_err(AgentError::from)??;

    Ok(Json(outcome))
}

/// Spool the first file field of the form to a temp file
async fn receive_archive(mut multipart: Multipart) -> Result<File, AgentError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AgentError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        if field.file_name().is_none() {
            continue;
        }
        check_archive_content_type(field.content_type())?;

        let upload = File::temp("upload", "zip");
        if let Err(e) = spool_field(field, &upload).await {
            if let Err(cleanup) = upload.delete().await {
                warn!("Unable to remove partial upload: {}", cleanup);
            }
            return Err(e);
        }
        return Ok(upload);
    }

    Err(AgentError::ValidationError("No file uploaded".to_string()))
}

async fn spool_field(mut field: Field<'_>, upload: &File) -> Result<u64, AgentError> {
    let mut out = upload.create().await?;
    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AgentError::ValidationError(format!("Upload interrupted: {}", e)))?
    {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

// ============================== START / STOP ==================================== //

pub async fn start_pool_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ControlOutcome>> {
    control_target(state, name, TargetKind::AppPool, ControlAction::Start).await
}

pub async fn stop_pool_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ControlOutcome>> {
    control_target(state, name, TargetKind::AppPool, ControlAction::Stop).await
}

pub async fn start_process_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ControlOutcome>> {
    control_target(state, name, TargetKind::Process, ControlAction::Start).await
}

pub async fn stop_process_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ControlOutcome>> {
    control_target(state, name, TargetKind::Process, ControlAction::Stop).await
}

async fn control_target(
    state: Arc<ServerState>,
    name: String,
    kind: TargetKind,
    action: ControlAction,
) -> ApiResult<Json<ControlOutcome>> {
    let target = state.registry.resolve_kind(&name, kind)?;
    let outcome = state.orchestrator.control(target, action).await?;
    Ok(Json(outcome))
}

// =============================== HOST INFO ====================================== //

pub async fn host_info_handler() -> Json<HostInfo> {
    Json(collect_host_info().await)
}
