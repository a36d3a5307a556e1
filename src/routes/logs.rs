/**
 * Logs Route Handler
 * Receives log batches from the page layer, e.g. swallowed save/delete failures
 */
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

use crate::logging::config::{ClientLogBatch, ClientLogEntry, LogLevel, LogResponse};

/// Upper bound on entries accepted per batch
const MAX_BATCH: usize = 100;

/// POST /api/logs
#[tracing::instrument(skip(batch), fields(batch_size = batch.logs.len()))]
pub async fn receive_client_logs(
    request_id: Option<Extension<RequestId>>,
    Json(batch): Json<ClientLogBatch>,
) -> impl IntoResponse {
    let req_id = request_id
        .as_ref()
        .and_then(|ext| ext.0.header_value().to_str().ok())
        .unwrap_or("unknown");

    let received = batch.logs.len();
    if received > MAX_BATCH {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(LogResponse {
                success: false,
                received,
                processed: 0,
                error: Some(format!("At most {} entries per batch", MAX_BATCH)),
            }),
        );
    }

    for entry in &batch.logs {
        emit(entry, req_id);
    }

    (
        StatusCode::ACCEPTED,
        Json(LogResponse {
            success: true,
            received,
            processed: received,
            error: None,
        }),
    )
}

/// Re-emit a client entry through tracing at its own level.
fn emit(entry: &ClientLogEntry, request_id: &str) {
    let span = tracing::info_span!(
        "client_log",
        request_id = %request_id,
        timestamp = %entry.timestamp,
        source = "client",
    );
    let _enter = span.enter();

    match entry.level {
        LogLevel::Trace => tracing::trace!(client_message = %entry.message, context = ?entry.context, metadata = ?entry.metadata, "client log"),
        LogLevel::Debug => tracing::debug!(client_message = %entry.message, context = ?entry.context, metadata = ?entry.metadata, "client log"),
        LogLevel::Info => tracing::info!(client_message = %entry.message, context = ?entry.context, metadata = ?entry.metadata, "client log"),
        LogLevel::Warn => tracing::warn!(client_message = %entry.message, context = ?entry.context, metadata = ?entry.metadata, "client log"),
        LogLevel::Error => tracing::error!(client_message = %entry.message, context = ?entry.context, metadata = ?entry.metadata, "client log"),
    }
}
