//! Move-table handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::{MoveTableOptionsResponse, MoveTableRequest, MoveTableResponse};
use crate::services::record_table_move_operation;
use crate::startup::AppState;

/// GET /boh/table-bookings/:booking_id/move-table
///
/// Tables eligible to host the booking right now. The list is advisory:
/// the POST below recomputes it before writing.
pub async fn move_table_options(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<MoveTableOptionsResponse>, AppError> {
    tracing::info!(booking_id = %booking_id, "Listing move-table options");

    let options = state
        .table_resolver()
        .available_tables(booking_id)
        .await
        .map_err(|e| {
            record_table_move_operation("options", "error");
            AppError::from(e)
        })?;

    record_table_move_operation("options", "ok");
    Ok(Json(options.into()))
}

/// POST /boh/table-bookings/:booking_id/move-table
pub async fn move_table(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<MoveTableRequest>,
) -> Result<Json<MoveTableResponse>, AppError> {
    tracing::info!(
        booking_id = %booking_id,
        table_id = %payload.table_id,
        "Moving booking to table"
    );

    let outcome = state
        .table_resolver()
        .move_table(booking_id, payload.table_id)
        .await
        .map_err(|e| {
            record_table_move_operation("move", "error");
            AppError::from(e)
        })?;

    record_table_move_operation("move", "ok");
    Ok(Json(outcome.into()))
}
