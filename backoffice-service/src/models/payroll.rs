//! Payroll domain models.
//!
//! `ShiftPlan` and `TimeSession` are owned by the rota and timeclock
//! features; the reconciler only reads them. `PayrollRow` is derived on
//! every read and never persisted - the only durable payroll artifacts are
//! the month approval and the accounting period.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Employee {
    pub employee_id: Uuid,
    pub display_name: String,
    pub hourly_rate: Decimal,
    pub is_salaried: bool,
}

/// A planned work block, entered on the rota in venue-local clock time.
/// A planned end at or before the planned start means the shift runs past
/// midnight into the next civil day.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShiftPlan {
    pub shift_id: Uuid,
    pub employee_id: Uuid,
    pub work_date: NaiveDate,
    pub planned_start: NaiveTime,
    pub planned_end: NaiveTime,
    pub department: Option<String>,
    pub note: Option<String>,
    pub is_sick: bool,
}

/// An actual clock-in/out record. `ended_at` is null while the employee is
/// still clocked in; `auto_closed` marks sessions ended by the overnight
/// sweep rather than an explicit clock-out.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TimeSession {
    pub session_id: Uuid,
    pub employee_id: Uuid,
    pub work_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub is_sick: bool,
    pub auto_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollFlag {
    Sick,
    Variance,
    AutoClose,
    Unscheduled,
    Open,
}

impl PayrollFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sick => "sick",
            Self::Variance => "variance",
            Self::AutoClose => "auto_close",
            Self::Unscheduled => "unscheduled",
            Self::Open => "open",
        }
    }
}

/// One reconciled (employee, date) pairing of a planned shift with an
/// actual session. Either side may be absent: a no-show leaves the actual
/// fields null, an unscheduled session leaves the planned fields null.
#[derive(Debug, Clone, Serialize)]
pub struct PayrollRow {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub work_date: NaiveDate,
    pub shift_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub planned_hours: Option<f64>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub actual_hours: Option<f64>,
    /// `actual_hours - planned_hours`; only meaningful when both sides of
    /// the pairing exist.
    pub variance: Option<f64>,
    pub flags: Vec<PayrollFlag>,
    pub shift_note: Option<String>,
    pub session_note: Option<String>,
}

impl PayrollRow {
    pub fn has_flag(&self, flag: PayrollFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollEmployeeSummary {
    pub employee_id: Uuid,
    pub employee_name: String,
    pub planned_hours: f64,
    pub actual_hours: f64,
    pub variance: f64,
    pub hourly_rate: Decimal,
    pub pay: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PayrollTotals {
    pub planned_hours: f64,
    pub actual_hours: f64,
    pub pay: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollMonthData {
    pub year: i32,
    pub month: u32,
    pub rows: Vec<PayrollRow>,
    pub employees: Vec<PayrollEmployeeSummary>,
    pub totals: PayrollTotals,
    pub approval: Option<PayrollMonthApproval>,
    pub period: Option<PayrollPeriod>,
}

/// The durable approval snapshot, unique per (year, month).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayrollMonthApproval {
    pub approval_id: Uuid,
    pub year: i32,
    pub month: i32,
    pub approved_at: DateTime<Utc>,
    pub email_sent_at: Option<DateTime<Utc>>,
}

/// Accounting date range for a (year, month); editable only while the
/// month is unapproved.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PayrollPeriod {
    pub year: i32,
    pub month: i32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}
