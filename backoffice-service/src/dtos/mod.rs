//! Request/response DTOs for the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::availability::{MoveOutcome, MoveTableOptions};

#[derive(Debug, Serialize)]
pub struct AvailableTableDto {
    pub id: Uuid,
    pub table_number: String,
    pub name: String,
    pub capacity: i32,
}

#[derive(Debug, Serialize)]
pub struct MoveTableOptionsResponse {
    pub booking_id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub assigned_table_ids: Vec<Uuid>,
    pub tables: Vec<AvailableTableDto>,
}

impl From<MoveTableOptions> for MoveTableOptionsResponse {
    fn from(options: MoveTableOptions) -> Self {
        Self {
            booking_id: options.booking_id,
            start_datetime: options.window.start,
            end_datetime: options.window.end,
            assigned_table_ids: options.assigned_table_ids,
            tables: options
                .tables
                .into_iter()
                .map(|t| AvailableTableDto {
                    id: t.table_id,
                    table_number: t.table_number,
                    name: t.name,
                    capacity: t.capacity,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveTableRequest {
    pub table_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MoveTableResponse {
    pub booking_id: Uuid,
    pub table_id: Uuid,
    pub table_name: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
}

impl From<MoveOutcome> for MoveTableResponse {
    fn from(outcome: MoveOutcome) -> Self {
        Self {
            booking_id: outcome.booking_id,
            table_id: outcome.table.table_id,
            table_name: outcome.table.name,
            start_datetime: outcome.window.start,
            end_datetime: outcome.window.end,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRowTimesRequest {
    pub session_id: Option<Uuid>,
    pub employee_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRowRequest {
    pub session_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePeriodRequest {
    pub period_start: String,
    pub period_end: String,
}
