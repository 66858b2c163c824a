//! Payroll page handlers.

use axum::{
    extract::{Path, State},
    Json,
};

use service_core::error::AppError;

use crate::dtos::{DeleteRowRequest, UpdatePeriodRequest, UpdateRowTimesRequest};
use crate::models::{PayrollMonthApproval, PayrollMonthData, PayrollPeriod, PayrollTotals};
use crate::services::payroll::{PayrollError, RowDeleteOutcome, RowUpdateOutcome};
use crate::services::record_payroll_operation;
use crate::startup::AppState;

/// GET /boh/payroll/:year/:month
///
/// A month with no hourly shifts or sessions renders as an empty state
/// rather than an error.
pub async fn payroll_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<PayrollMonthData>, AppError> {
    tracing::info!(year = year, month = month, "Computing payroll month");

    match state.payroll_reconciler().month_data(year, month).await {
        Ok(data) => {
            record_payroll_operation("month_data", "ok");
            Ok(Json(data))
        }
        Err(PayrollError::NoDataForPeriod { .. }) => {
            record_payroll_operation("month_data", "empty");
            Ok(Json(PayrollMonthData {
                year,
                month,
                rows: Vec::new(),
                employees: Vec::new(),
                totals: PayrollTotals::default(),
                approval: None,
                period: None,
            }))
        }
        Err(e) => {
            record_payroll_operation("month_data", "error");
            Err(AppError::from(e))
        }
    }
}

/// POST /boh/payroll/:year/:month/approve
pub async fn approve_month(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<PayrollMonthApproval>, AppError> {
    tracing::info!(year = year, month = month, "Approving payroll month");

    let approval = state
        .payroll_reconciler()
        .approve_month(year, month)
        .await
        .map_err(|e| {
            record_payroll_operation("approve", "error");
            AppError::from(e)
        })?;

    record_payroll_operation("approve", "ok");
    Ok(Json(approval))
}

/// PUT /boh/payroll/:year/:month/rows
pub async fn update_row_times(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
    Json(payload): Json<UpdateRowTimesRequest>,
) -> Result<Json<RowUpdateOutcome>, AppError> {
    tracing::info!(
        year = year,
        month = month,
        employee_id = %payload.employee_id,
        date = %payload.date,
        "Updating payroll row times"
    );

    let outcome = state
        .payroll_reconciler()
        .update_row_times(
            payload.session_id,
            payload.employee_id,
            &payload.date,
            &payload.start_time,
            payload.end_time.as_deref(),
            year,
            month,
        )
        .await
        .map_err(|e| {
            record_payroll_operation("update_row", "error");
            AppError::from(e)
        })?;

    if outcome.requires_reapproval {
        tracing::warn!(
            year = year,
            month = month,
            "Row edited after approval; month requires re-approval"
        );
    }
    record_payroll_operation("update_row", "ok");
    Ok(Json(outcome))
}

/// DELETE /boh/payroll/:year/:month/rows
pub async fn delete_row(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
    Json(payload): Json<DeleteRowRequest>,
) -> Result<Json<RowDeleteOutcome>, AppError> {
    tracing::info!(year = year, month = month, "Deleting payroll row");

    let outcome = state
        .payroll_reconciler()
        .delete_row(payload.session_id, payload.shift_id, year, month)
        .await
        .map_err(|e| {
            record_payroll_operation("delete_row", "error");
            AppError::from(e)
        })?;

    record_payroll_operation("delete_row", "ok");
    Ok(Json(outcome))
}

/// PUT /boh/payroll/:year/:month/period
pub async fn update_period(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
    Json(payload): Json<UpdatePeriodRequest>,
) -> Result<Json<PayrollPeriod>, AppError> {
    tracing::info!(year = year, month = month, "Updating payroll period");

    let period = state
        .payroll_reconciler()
        .update_period(year, month, &payload.period_start, &payload.period_end)
        .await
        .map_err(|e| {
            record_payroll_operation("update_period", "error");
            AppError::from(e)
        })?;

    record_payroll_operation("update_period", "ok");
    Ok(Json(period))
}

/// POST /boh/payroll/:year/:month/email
///
/// Validates the approval gate and stamps `email_sent_at`; actual delivery
/// is the notification pipeline's job.
pub async fn send_email(
    State(state): State<AppState>,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<Json<PayrollMonthApproval>, AppError> {
    tracing::info!(year = year, month = month, "Recording payroll email send");

    let approval = state
        .payroll_reconciler()
        .send_email(year, month)
        .await
        .map_err(|e| {
            record_payroll_operation("send_email", "error");
            AppError::from(e)
        })?;

    record_payroll_operation("send_email", "ok");
    Ok(Json(approval))
}
