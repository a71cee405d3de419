//! Ingest Endpoint: batch indexing routes (§4.3, §6)

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::core::app::AppState;
use crate::domain::indexing::JobStatus;

use super::super::types::{ApiError, StatusOnly};

#[derive(Debug, Deserialize)]
pub struct BatchStartRequest {
    pub directory: String,
    pub repository: String,
}

#[derive(Debug, Serialize)]
pub struct BatchStartResponse {
    pub job_id: String,
    pub total_files: u64,
    pub total_batches: u64,
    pub status: String,
}

/// `POST /v1/indexing/batch/start` (§6): scan, shard, enqueue. 400 on
/// invalid input, 409 if a job is already in flight for the repository.
pub async fn start_batch(
    State(state): State<AppState>,
    Json(body): Json<BatchStartRequest>,
) -> Result<Json<BatchStartResponse>, ApiError> {
    if body.directory.trim().is_empty() || body.repository.trim().is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_REQUEST",
            "directory and repository are required",
        ));
    }

    let already_in_flight = state
        .status
        .has_in_flight_job(&body.repository)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if already_in_flight {
        return Err(ApiError::conflict(
            "JOB_IN_FLIGHT",
            format!("a job is already in flight for {}", body.repository),
        ));
    }

    let directory = PathBuf::from(&body.directory);
    let produced = state
        .producer
        .produce(&directory, &body.repository)
        .await
        .map_err(|e| ApiError::bad_request("SCAN_FAILED", e.to_string()))?;

    Ok(Json(BatchStartResponse {
        job_id: produced.job_id,
        total_files: produced.total_files,
        total_batches: produced.total_batches,
        status: produced.state.to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub job_id: String,
    pub repository: String,
    pub total_files: u64,
    pub total_batches: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub current_batch: u64,
    pub state: String,
    pub start_timestamp: i64,
    pub completion_timestamp: Option<i64>,
    pub error_log: Vec<String>,
    pub progress: String,
}

impl From<JobStatus> for BatchStatusResponse {
    fn from(status: JobStatus) -> Self {
        Self {
            job_id: status.job_id.clone(),
            repository: status.repository.clone(),
            total_files: status.total_files,
            total_batches: status.total_batches,
            processed_files: status.processed_files,
            failed_files: status.failed_files,
            current_batch: status.current_batch,
            state: status.state.to_string(),
            start_timestamp: status.start_timestamp,
            completion_timestamp: status.completion_timestamp,
            error_log: status.error_log.clone(),
            progress: status.progress(),
        }
    }
}

/// `GET /v1/indexing/batch/status/{repository}` (§6): always 200, either
/// the Status Record snapshot or `{"status": "not_found"}`.
pub async fn batch_status(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> Result<Response, ApiError> {
    let status = state
        .status
        .get(&repository)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(match status {
        Some(status) => Json(BatchStatusResponse::from(status)).into_response(),
        None => Json(StatusOnly { status: "not_found" }).into_response(),
    })
}
