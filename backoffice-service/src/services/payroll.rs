//! Payroll reconciliation: join the month's planned shifts with actual
//! timeclock sessions and derive the approvable payroll view.
//!
//! The reconciler is read-mostly; rows are computed fresh on every call and
//! never persisted. The durable artifacts are the month approval (unique per
//! (year, month) at the store layer) and the accounting period.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    Employee, PayrollEmployeeSummary, PayrollFlag, PayrollMonthApproval, PayrollMonthData,
    PayrollPeriod, PayrollRow, PayrollTotals, ShiftPlan, TimeSession,
};
use crate::services::timewindow::{self, TimeWindowError};

/// Planned and actual hours closer than this are treated as equal.
pub const VARIANCE_TOLERANCE_HOURS: f64 = 0.05;

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("no hourly shifts or sessions recorded for {year}-{month:02}")]
    NoDataForPeriod { year: i32, month: u32 },

    #[error("payroll for {year}-{month:02} is already approved")]
    AlreadyApproved { year: i32, month: u32 },

    #[error("payroll for {year}-{month:02} has not been approved")]
    NotApproved { year: i32, month: u32 },

    #[error("accounting period for {year}-{month:02} is frozen by an approval")]
    PeriodFrozen { year: i32, month: u32 },

    #[error("{0} is not a calendar month")]
    InvalidMonth(u32),

    #[error("payroll row not found")]
    RowNotFound,

    #[error(transparent)]
    InvalidTimeFormat(#[from] TimeWindowError),

    #[error(transparent)]
    Store(AppError),
}

impl From<AppError> for PayrollError {
    fn from(err: AppError) -> Self {
        PayrollError::Store(err)
    }
}

impl From<PayrollError> for AppError {
    fn from(err: PayrollError) -> Self {
        match err {
            PayrollError::NoDataForPeriod { .. } | PayrollError::RowNotFound => {
                AppError::NotFound(anyhow::anyhow!("{err}"))
            }
            PayrollError::AlreadyApproved { .. }
            | PayrollError::NotApproved { .. }
            | PayrollError::PeriodFrozen { .. } => AppError::Conflict(anyhow::anyhow!("{err}")),
            PayrollError::InvalidMonth(_) | PayrollError::InvalidTimeFormat(_) => {
                AppError::BadRequest(anyhow::anyhow!("{err}"))
            }
            PayrollError::Store(inner) => inner,
        }
    }
}

/// Read access to planned shifts, scoped to hourly employees.
#[async_trait]
pub trait ShiftStore: Send + Sync {
    async fn shifts_for_month(&self, year: i32, month: u32) -> Result<Vec<ShiftPlan>, AppError>;
    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), AppError>;
}

/// Read/write access to timeclock sessions, scoped to hourly employees.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn sessions_for_month(&self, year: i32, month: u32)
        -> Result<Vec<TimeSession>, AppError>;
    async fn session(&self, session_id: Uuid) -> Result<Option<TimeSession>, AppError>;
    /// Overwrite a session's clocked window. A manual correction also
    /// clears the auto-close marker.
    async fn update_session_times(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;
    async fn insert_session(&self, session: TimeSession) -> Result<(), AppError>;
    async fn delete_session(&self, session_id: Uuid) -> Result<(), AppError>;
}

/// Durable payroll artifacts: approvals, periods, and the employee roster.
#[async_trait]
pub trait PayrollStore: Send + Sync {
    async fn hourly_employees(&self) -> Result<Vec<Employee>, AppError>;
    async fn approval_for(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Option<PayrollMonthApproval>, AppError>;
    /// Insert the approval snapshot. The store enforces uniqueness on
    /// (year, month); a duplicate insert surfaces as `AppError::Conflict`.
    async fn insert_approval(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError>;
    async fn period_for(&self, year: i32, month: u32) -> Result<Option<PayrollPeriod>, AppError>;
    async fn upsert_period(
        &self,
        year: i32,
        month: u32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<PayrollPeriod, AppError>;
    async fn mark_email_sent(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError>;
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RowUpdateOutcome {
    pub session_id: Uuid,
    /// Set when the month already carries an approval: the edit succeeded
    /// but the approved snapshot is now stale and needs re-approval.
    pub requires_reapproval: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RowDeleteOutcome {
    pub requires_reapproval: bool,
}

/// First and one-past-last civil dates of a (year, month).
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

pub struct PayrollReconciler {
    shifts: Arc<dyn ShiftStore>,
    sessions: Arc<dyn SessionStore>,
    payroll: Arc<dyn PayrollStore>,
    tz: Tz,
}

impl PayrollReconciler {
    pub fn new(
        shifts: Arc<dyn ShiftStore>,
        sessions: Arc<dyn SessionStore>,
        payroll: Arc<dyn PayrollStore>,
        tz: Tz,
    ) -> Self {
        Self {
            shifts,
            sessions,
            payroll,
            tz,
        }
    }

    /// Compute the full reconciled view for a month.
    #[instrument(skip(self))]
    pub async fn month_data(&self, year: i32, month: u32) -> Result<PayrollMonthData, PayrollError> {
        if month_bounds(year, month).is_none() {
            return Err(PayrollError::InvalidMonth(month));
        }

        let employees = self.payroll.hourly_employees().await?;
        let shifts = self.shifts.shifts_for_month(year, month).await?;
        let sessions = self.sessions.sessions_for_month(year, month).await?;

        if shifts.is_empty() && sessions.is_empty() {
            return Err(PayrollError::NoDataForPeriod { year, month });
        }

        let rows = build_rows(&employees, &shifts, &sessions, Utc::now(), self.tz);
        let (summaries, totals) = summarize(&rows, &employees);

        let approval = self.payroll.approval_for(year, month).await?;
        let period = self.payroll.period_for(year, month).await?;

        Ok(PayrollMonthData {
            year,
            month,
            rows,
            employees: summaries,
            totals,
            approval,
            period,
        })
    }

    /// Record the month approval. Exactly one snapshot may exist per
    /// (year, month); a concurrent or repeated call loses with a conflict.
    #[instrument(skip(self))]
    pub async fn approve_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, PayrollError> {
        if month_bounds(year, month).is_none() {
            return Err(PayrollError::InvalidMonth(month));
        }
        match self.payroll.insert_approval(year, month).await {
            Ok(approval) => Ok(approval),
            Err(AppError::Conflict(_)) => Err(PayrollError::AlreadyApproved { year, month }),
            Err(e) => Err(e.into()),
        }
    }

    /// Correct a row's actual times. Creates the session when the row had
    /// only a plan. Succeeds after approval too, but the caller is told the
    /// snapshot now requires re-approval.
    #[instrument(skip(self))]
    pub async fn update_row_times(
        &self,
        session_id: Option<Uuid>,
        employee_id: Uuid,
        date: &str,
        start_time: &str,
        end_time: Option<&str>,
        year: i32,
        month: u32,
    ) -> Result<RowUpdateOutcome, PayrollError> {
        let work_date = timewindow::parse_civil_date(date)?;
        let start = timewindow::parse_clock_time(start_time)?;
        let started_at = timewindow::local_to_utc(work_date, start, self.tz);
        let ended_at = match end_time {
            Some(raw) => {
                let end = timewindow::parse_clock_time(raw)?;
                Some(timewindow::local_window_to_utc(work_date, start, end, self.tz).end)
            }
            None => None,
        };

        let session_id = match session_id {
            Some(id) => {
                if self.sessions.session(id).await?.is_none() {
                    return Err(PayrollError::RowNotFound);
                }
                self.sessions
                    .update_session_times(id, started_at, ended_at)
                    .await?;
                id
            }
            None => {
                let session = TimeSession {
                    session_id: Uuid::new_v4(),
                    employee_id,
                    work_date,
                    started_at,
                    ended_at,
                    note: None,
                    is_sick: false,
                    auto_closed: false,
                };
                let id = session.session_id;
                self.sessions.insert_session(session).await?;
                id
            }
        };

        let requires_reapproval = self.payroll.approval_for(year, month).await?.is_some();
        Ok(RowUpdateOutcome {
            session_id,
            requires_reapproval,
        })
    }

    /// Remove a row's underlying records (session and/or plan).
    #[instrument(skip(self))]
    pub async fn delete_row(
        &self,
        session_id: Option<Uuid>,
        shift_id: Option<Uuid>,
        year: i32,
        month: u32,
    ) -> Result<RowDeleteOutcome, PayrollError> {
        if session_id.is_none() && shift_id.is_none() {
            return Err(PayrollError::RowNotFound);
        }
        if let Some(id) = session_id {
            self.sessions.delete_session(id).await?;
        }
        if let Some(id) = shift_id {
            self.shifts.delete_shift(id).await?;
        }
        let requires_reapproval = self.payroll.approval_for(year, month).await?.is_some();
        Ok(RowDeleteOutcome {
            requires_reapproval,
        })
    }

    /// Set the accounting date range for an unapproved month.
    #[instrument(skip(self))]
    pub async fn update_period(
        &self,
        year: i32,
        month: u32,
        period_start: &str,
        period_end: &str,
    ) -> Result<PayrollPeriod, PayrollError> {
        if month_bounds(year, month).is_none() {
            return Err(PayrollError::InvalidMonth(month));
        }
        if self.payroll.approval_for(year, month).await?.is_some() {
            return Err(PayrollError::PeriodFrozen { year, month });
        }
        let start = timewindow::parse_civil_date(period_start)?;
        let end = timewindow::parse_civil_date(period_end)?;
        if end < start {
            return Err(PayrollError::InvalidTimeFormat(
                TimeWindowError::InvalidTimeFormat(format!(
                    "period end {end} precedes start {start}"
                )),
            ));
        }
        Ok(self.payroll.upsert_period(year, month, start, end).await?)
    }

    /// Gate for the payroll email: an approval must exist. Delivery itself
    /// belongs to the caller; this only records `email_sent_at`.
    #[instrument(skip(self))]
    pub async fn send_email(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, PayrollError> {
        if self.payroll.approval_for(year, month).await?.is_none() {
            return Err(PayrollError::NotApproved { year, month });
        }
        Ok(self.payroll.mark_email_sent(year, month).await?)
    }
}

fn round_hours(hours: f64) -> f64 {
    (hours * 1000.0).round() / 1000.0
}

/// Pair the month's plans and sessions into payroll rows.
///
/// Plans and sessions are grouped by (employee, date) and paired
/// positionally in chronological start order, which keeps split shifts
/// stable: the first plan of the day matches the first clock-in, and so on.
/// Unmatched plans keep null actual fields; unmatched sessions keep null
/// planned fields and are flagged unscheduled.
pub fn build_rows(
    employees: &[Employee],
    shifts: &[ShiftPlan],
    sessions: &[TimeSession],
    now: DateTime<Utc>,
    tz: Tz,
) -> Vec<PayrollRow> {
    let roster: BTreeMap<Uuid, &Employee> = employees
        .iter()
        .filter(|e| !e.is_salaried)
        .map(|e| (e.employee_id, e))
        .collect();

    let mut days: BTreeMap<(NaiveDate, Uuid), (Vec<&ShiftPlan>, Vec<&TimeSession>)> =
        BTreeMap::new();
    for shift in shifts {
        if roster.contains_key(&shift.employee_id) {
            days.entry((shift.work_date, shift.employee_id))
                .or_default()
                .0
                .push(shift);
        }
    }
    for session in sessions {
        if roster.contains_key(&session.employee_id) {
            days.entry((session.work_date, session.employee_id))
                .or_default()
                .1
                .push(session);
        }
    }

    let mut rows = Vec::new();
    for ((work_date, employee_id), (mut plans, mut actuals)) in days {
        plans.sort_by_key(|p| p.planned_start);
        actuals.sort_by_key(|s| s.started_at);

        let employee = roster[&employee_id];
        for i in 0..plans.len().max(actuals.len()) {
            rows.push(build_row(
                employee,
                work_date,
                plans.get(i).copied(),
                actuals.get(i).copied(),
                now,
                tz,
            ));
        }
    }

    rows.sort_by(|a, b| {
        (a.work_date, &a.employee_name, a.planned_start.or(a.actual_start))
            .cmp(&(b.work_date, &b.employee_name, b.planned_start.or(b.actual_start)))
    });
    rows
}

fn build_row(
    employee: &Employee,
    work_date: NaiveDate,
    plan: Option<&ShiftPlan>,
    session: Option<&TimeSession>,
    now: DateTime<Utc>,
    tz: Tz,
) -> PayrollRow {
    let planned_window = plan
        .map(|p| timewindow::local_window_to_utc(work_date, p.planned_start, p.planned_end, tz));
    let planned_hours = planned_window
        .map(|w| round_hours((w.end - w.start).num_seconds() as f64 / 3600.0));

    let (actual_start, actual_end, session_open) = match session {
        Some(s) => (Some(s.started_at), Some(s.ended_at.unwrap_or(now)), s.ended_at.is_none()),
        None => (None, None, false),
    };
    let actual_hours = actual_start.zip(actual_end).map(|(start, end)| {
        round_hours((end - start).num_seconds().max(0) as f64 / 3600.0)
    });

    let variance = planned_hours
        .zip(actual_hours)
        .map(|(planned, actual)| round_hours(actual - planned));

    let mut flags = Vec::new();
    if plan.is_some_and(|p| p.is_sick) || session.is_some_and(|s| s.is_sick) {
        flags.push(PayrollFlag::Sick);
    }
    if variance.is_some_and(|v| v.abs() >= VARIANCE_TOLERANCE_HOURS) {
        flags.push(PayrollFlag::Variance);
    }
    if session.is_some_and(|s| s.auto_closed) {
        flags.push(PayrollFlag::AutoClose);
    }
    if plan.is_none() && session.is_some() {
        flags.push(PayrollFlag::Unscheduled);
    }
    if session_open {
        flags.push(PayrollFlag::Open);
    }

    PayrollRow {
        employee_id: employee.employee_id,
        employee_name: employee.display_name.clone(),
        work_date,
        shift_id: plan.map(|p| p.shift_id),
        session_id: session.map(|s| s.session_id),
        planned_start: planned_window.map(|w| w.start),
        planned_end: planned_window.map(|w| w.end),
        planned_hours,
        actual_start,
        actual_end,
        actual_hours,
        variance,
        flags,
        shift_note: plan.and_then(|p| p.note.clone()),
        session_note: session.and_then(|s| s.note.clone()),
    }
}

/// Per-employee and grand totals. Pay is actual hours at the employee's
/// hourly rate; employees with no rows that month simply don't appear.
pub fn summarize(
    rows: &[PayrollRow],
    employees: &[Employee],
) -> (Vec<PayrollEmployeeSummary>, PayrollTotals) {
    let mut by_employee: BTreeMap<Uuid, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let entry = by_employee.entry(row.employee_id).or_default();
        entry.0 += row.planned_hours.unwrap_or(0.0);
        entry.1 += row.actual_hours.unwrap_or(0.0);
    }

    let mut summaries: Vec<PayrollEmployeeSummary> = employees
        .iter()
        .filter_map(|e| {
            let (planned, actual) = by_employee.get(&e.employee_id)?;
            let pay = (Decimal::try_from(*actual).unwrap_or_default() * e.hourly_rate).round_dp(2);
            Some(PayrollEmployeeSummary {
                employee_id: e.employee_id,
                employee_name: e.display_name.clone(),
                planned_hours: round_hours(*planned),
                actual_hours: round_hours(*actual),
                variance: round_hours(actual - planned),
                hourly_rate: e.hourly_rate,
                pay,
            })
        })
        .collect();
    summaries.sort_by(|a, b| a.employee_name.cmp(&b.employee_name));

    let totals = PayrollTotals {
        planned_hours: round_hours(summaries.iter().map(|s| s.planned_hours).sum()),
        actual_hours: round_hours(summaries.iter().map(|s| s.actual_hours).sum()),
        pay: summaries.iter().map(|s| s.pay).sum(),
    };

    (summaries, totals)
}
