//! Auto-Save Queue Endpoint: conversation queueing and metrics (§4.9, §6)

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::core::app::AppState;
use crate::core::constants::DEFAULT_APPROXIMATE_CAP;
use crate::data::stream::autosave_stream_key;
use crate::domain::autosave::AutoSaveMessage;

use super::super::types::ApiError;

#[derive(Debug, Deserialize)]
pub struct QueueConversationRequest {
    pub user_message: String,
    pub assistant_message: String,
    pub project: Option<String>,
    pub session: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct QueueConversationResponse {
    pub message_id: String,
    pub queued: bool,
}

/// `POST /v1/conversations/queue` (§6): append one message to the shared
/// auto-save stream. 503 when the durable stream substrate is unreachable.
pub async fn queue_conversation(
    State(state): State<AppState>,
    Json(body): Json<QueueConversationRequest>,
) -> Result<Json<QueueConversationResponse>, ApiError> {
    if body.user_message.trim().is_empty() || body.session.trim().is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_REQUEST",
            "user_message and session are required",
        ));
    }

    let message = AutoSaveMessage {
        user_message: body.user_message,
        assistant_message: body.assistant_message,
        project: body.project,
        session: body.session,
        timestamp: body.timestamp,
    };

    let message_id = state
        .stream
        .append(&autosave_stream_key(), message.into_fields(), DEFAULT_APPROXIMATE_CAP)
        .await
        .map_err(|e| ApiError::service_unavailable(e.to_string()))?;

    Ok(Json(QueueConversationResponse {
        message_id,
        queued: true,
    }))
}

#[derive(Debug, Serialize)]
pub struct ConversationMetricsResponse {
    pub queue_size: u64,
    pub pending: u64,
    pub last_save: Option<String>,
    pub saves_per_hour: u64,
    pub status: &'static str,
}

/// `GET /v1/conversations/metrics` (§6): point-in-time auto-save queue health.
pub async fn conversation_metrics(State(state): State<AppState>) -> Json<ConversationMetricsResponse> {
    let metrics = state.metrics.conversation_metrics().await;
    Json(ConversationMetricsResponse {
        queue_size: metrics.queue_size,
        pending: metrics.pending,
        last_save: metrics.last_save.map(|ts| ts.to_rfc3339()),
        saves_per_hour: metrics.saves_per_hour,
        status: metrics.status,
    })
}
