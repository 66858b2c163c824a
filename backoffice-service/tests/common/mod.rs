//! Common test utilities: in-memory fakes for the store traits.
//!
//! The fakes honour the same conflict semantics the Postgres schema
//! enforces (unique (year, month) approvals, the active-window exclusion
//! on table assignments), so the properties exercised here hold against
//! either backing.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Europe::London;
use rust_decimal::Decimal;
use uuid::Uuid;

use backoffice_service::config::VenueConfig;
use backoffice_service::models::{
    BookingStatus, Employee, PayrollMonthApproval, PayrollPeriod, RestaurantTable, ShiftPlan,
    TableAssignment, TableBooking, TimeSession,
};
use backoffice_service::services::availability::{
    AssignmentStore, BookingStore, MoveTableError, PrivateEventStore, TableResolver, TableStore,
};
use backoffice_service::services::payroll::{
    month_bounds, PayrollReconciler, PayrollStore, SessionStore, ShiftStore,
};
use backoffice_service::services::timewindow::{local_to_utc, BookingWindow};
use service_core::error::AppError;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,backoffice_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Default)]
pub struct FakeData {
    pub employees: Vec<Employee>,
    pub shifts: Vec<ShiftPlan>,
    pub sessions: Vec<TimeSession>,
    pub approvals: Vec<PayrollMonthApproval>,
    pub periods: Vec<PayrollPeriod>,
    pub tables: Vec<RestaurantTable>,
    pub bookings: Vec<TableBooking>,
    pub assignments: Vec<TableAssignment>,
    /// (area_id, window) pairs blocked by private bookings.
    pub private_blocks: Vec<(Uuid, BookingWindow)>,
    /// Simulate a failing private-block lookup.
    pub fail_private_blocks: bool,
}

#[derive(Default)]
pub struct FakeStore {
    pub data: Mutex<FakeData>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeData) -> R) -> R {
        f(&mut self.data.lock().unwrap())
    }

    fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
        match month_bounds(year, month) {
            Some((start, end)) => date >= start && date < end,
            None => false,
        }
    }

    fn is_salaried(data: &FakeData, employee_id: Uuid) -> bool {
        data.employees
            .iter()
            .any(|e| e.employee_id == employee_id && e.is_salaried)
    }
}

#[async_trait]
impl ShiftStore for FakeStore {
    async fn shifts_for_month(&self, year: i32, month: u32) -> Result<Vec<ShiftPlan>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .shifts
            .iter()
            .filter(|s| {
                Self::in_month(s.work_date, year, month)
                    && !Self::is_salaried(&data, s.employee_id)
            })
            .cloned()
            .collect())
    }

    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), AppError> {
        let mut data = self.data.lock().unwrap();
        let before = data.shifts.len();
        data.shifts.retain(|s| s.shift_id != shift_id);
        if data.shifts.len() == before {
            return Err(AppError::NotFound(anyhow::anyhow!("shift not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FakeStore {
    async fn sessions_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<TimeSession>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .sessions
            .iter()
            .filter(|s| {
                Self::in_month(s.work_date, year, month)
                    && !Self::is_salaried(&data, s.employee_id)
            })
            .cloned()
            .collect())
    }

    async fn session(&self, session_id: Uuid) -> Result<Option<TimeSession>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned())
    }

    async fn update_session_times(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut data = self.data.lock().unwrap();
        let session = data
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("session not found")))?;
        session.started_at = started_at;
        session.ended_at = ended_at;
        session.auto_closed = false;
        Ok(())
    }

    async fn insert_session(&self, session: TimeSession) -> Result<(), AppError> {
        self.data.lock().unwrap().sessions.push(session);
        Ok(())
    }

    async fn delete_session(&self, session_id: Uuid) -> Result<(), AppError> {
        let mut data = self.data.lock().unwrap();
        let before = data.sessions.len();
        data.sessions.retain(|s| s.session_id != session_id);
        if data.sessions.len() == before {
            return Err(AppError::NotFound(anyhow::anyhow!("session not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl PayrollStore for FakeStore {
    async fn hourly_employees(&self) -> Result<Vec<Employee>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .employees
            .iter()
            .filter(|e| !e.is_salaried)
            .cloned()
            .collect())
    }

    async fn approval_for(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Option<PayrollMonthApproval>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .approvals
            .iter()
            .find(|a| a.year == year && a.month == month as i32)
            .cloned())
    }

    async fn insert_approval(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError> {
        let mut data = self.data.lock().unwrap();
        // Mirrors the unique (year, month) key on payroll_month_approvals.
        if data
            .approvals
            .iter()
            .any(|a| a.year == year && a.month == month as i32)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "approval already exists"
            )));
        }
        let approval = PayrollMonthApproval {
            approval_id: Uuid::new_v4(),
            year,
            month: month as i32,
            approved_at: Utc::now(),
            email_sent_at: None,
        };
        data.approvals.push(approval.clone());
        Ok(approval)
    }

    async fn period_for(&self, year: i32, month: u32) -> Result<Option<PayrollPeriod>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .periods
            .iter()
            .find(|p| p.year == year && p.month == month as i32)
            .cloned())
    }

    async fn upsert_period(
        &self,
        year: i32,
        month: u32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<PayrollPeriod, AppError> {
        let mut data = self.data.lock().unwrap();
        data.periods
            .retain(|p| !(p.year == year && p.month == month as i32));
        let period = PayrollPeriod {
            year,
            month: month as i32,
            period_start,
            period_end,
        };
        data.periods.push(period.clone());
        Ok(period)
    }

    async fn mark_email_sent(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError> {
        let mut data = self.data.lock().unwrap();
        let approval = data
            .approvals
            .iter_mut()
            .find(|a| a.year == year && a.month == month as i32)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("no approval")))?;
        approval.email_sent_at = Some(Utc::now());
        Ok(approval.clone())
    }
}

#[async_trait]
impl BookingStore for FakeStore {
    async fn booking(&self, booking_id: Uuid) -> Result<Option<TableBooking>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .bookings
            .iter()
            .find(|b| b.booking_id == booking_id)
            .cloned())
    }
}

#[async_trait]
impl TableStore for FakeStore {
    async fn bookable_tables(&self) -> Result<Vec<RestaurantTable>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data.tables.iter().filter(|t| t.bookable).cloned().collect())
    }

    async fn table(&self, table_id: Uuid) -> Result<Option<RestaurantTable>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data.tables.iter().find(|t| t.table_id == table_id).cloned())
    }
}

#[async_trait]
impl AssignmentStore for FakeStore {
    async fn assignments_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TableAssignment>, AppError> {
        let data = self.data.lock().unwrap();
        let mut assignments: Vec<TableAssignment> = data
            .assignments
            .iter()
            .filter(|a| a.booking_id == booking_id)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.assignment_id);
        Ok(assignments)
    }

    async fn overlapping_assignments(
        &self,
        table_ids: &[Uuid],
        window: &BookingWindow,
    ) -> Result<Vec<(TableAssignment, BookingStatus)>, AppError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .assignments
            .iter()
            .filter(|a| {
                table_ids.contains(&a.table_id)
                    && a.starts_at < window.end
                    && a.ends_at > window.start
            })
            .map(|a| {
                let status = data
                    .bookings
                    .iter()
                    .find(|b| b.booking_id == a.booking_id)
                    .map(|b| b.status())
                    .unwrap_or(BookingStatus::Confirmed);
                (a.clone(), status)
            })
            .collect())
    }

    async fn reassign(
        &self,
        booking_id: Uuid,
        table_id: Uuid,
        window: &BookingWindow,
        expected_assignment_ids: &[Uuid],
    ) -> Result<TableAssignment, MoveTableError> {
        let mut data = self.data.lock().unwrap();

        let mut current_ids: Vec<Uuid> = data
            .assignments
            .iter()
            .filter(|a| a.booking_id == booking_id)
            .map(|a| a.assignment_id)
            .collect();
        current_ids.sort();
        if current_ids != expected_assignment_ids {
            return Err(MoveTableError::StaleAssignmentState);
        }

        // Mirrors the exclusion constraint: no other active booking may
        // hold this table for an overlapping window.
        let conflicted = data.assignments.iter().any(|a| {
            a.booking_id != booking_id
                && a.table_id == table_id
                && a.starts_at < window.end
                && a.ends_at > window.start
                && data
                    .bookings
                    .iter()
                    .find(|b| b.booking_id == a.booking_id)
                    .map(|b| b.status().blocks_tables())
                    .unwrap_or(true)
        });
        if conflicted {
            return Err(MoveTableError::TableNoLongerAvailable);
        }

        let assignment = match data
            .assignments
            .iter_mut()
            .find(|a| a.booking_id == booking_id && a.table_id == table_id)
        {
            Some(existing) => {
                existing.starts_at = window.start;
                existing.ends_at = window.end;
                existing.clone()
            }
            None => {
                let assignment = TableAssignment {
                    assignment_id: Uuid::new_v4(),
                    booking_id,
                    table_id,
                    starts_at: window.start,
                    ends_at: window.end,
                };
                data.assignments.push(assignment.clone());
                assignment
            }
        };

        data.assignments
            .retain(|a| a.booking_id != booking_id || a.assignment_id == assignment.assignment_id);

        Ok(assignment)
    }
}

#[async_trait]
impl PrivateEventStore for FakeStore {
    async fn blocked_area_ids(&self, window: &BookingWindow) -> Result<Vec<Uuid>, AppError> {
        let data = self.data.lock().unwrap();
        if data.fail_private_blocks {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "private booking lookup failed"
            )));
        }
        Ok(data
            .private_blocks
            .iter()
            .filter(|(_, blocked)| blocked.overlaps(window))
            .map(|(area_id, _)| *area_id)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn venue_config() -> VenueConfig {
    VenueConfig {
        timezone: London,
        default_booking_minutes: 90,
        fixed_menu_booking_minutes: 120,
        minimum_booking_minutes: 30,
    }
}

pub fn reconciler(store: &Arc<FakeStore>) -> PayrollReconciler {
    PayrollReconciler::new(store.clone(), store.clone(), store.clone(), London)
}

pub fn resolver(store: &Arc<FakeStore>) -> TableResolver {
    TableResolver::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        venue_config(),
    )
}

pub fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn t(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// A venue-local window on one civil date, resolved to UTC.
pub fn window(date: NaiveDate, start: (u32, u32), end: (u32, u32)) -> BookingWindow {
    BookingWindow::new(
        local_to_utc(date, t(start.0, start.1), London),
        local_to_utc(date, t(end.0, end.1), London),
    )
}

pub fn hourly_employee(name: &str, rate: i64) -> Employee {
    Employee {
        employee_id: Uuid::new_v4(),
        display_name: name.to_string(),
        hourly_rate: Decimal::new(rate, 0),
        is_salaried: false,
    }
}

pub fn salaried_employee(name: &str) -> Employee {
    Employee {
        employee_id: Uuid::new_v4(),
        display_name: name.to_string(),
        hourly_rate: Decimal::ZERO,
        is_salaried: true,
    }
}

pub fn shift_on(
    employee_id: Uuid,
    date: NaiveDate,
    start: (u32, u32),
    end: (u32, u32),
) -> ShiftPlan {
    ShiftPlan {
        shift_id: Uuid::new_v4(),
        employee_id,
        work_date: date,
        planned_start: t(start.0, start.1),
        planned_end: t(end.0, end.1),
        department: None,
        note: None,
        is_sick: false,
    }
}

pub fn session_on(
    employee_id: Uuid,
    date: NaiveDate,
    start: (u32, u32),
    end: Option<(u32, u32)>,
) -> TimeSession {
    TimeSession {
        session_id: Uuid::new_v4(),
        employee_id,
        work_date: date,
        started_at: local_to_utc(date, t(start.0, start.1), London),
        ended_at: end.map(|(h, m)| local_to_utc(date, t(h, m), London)),
        note: None,
        is_sick: false,
        auto_closed: false,
    }
}

pub fn area() -> Uuid {
    Uuid::new_v4()
}

pub fn table_in(number: &str, capacity: i32, area_id: Uuid) -> RestaurantTable {
    RestaurantTable {
        table_id: Uuid::new_v4(),
        table_number: number.to_string(),
        name: format!("Table {number}"),
        capacity,
        area_id,
        bookable: true,
    }
}

pub fn booking_at(
    date: NaiveDate,
    time: (u32, u32),
    party_size: i32,
    status: BookingStatus,
) -> TableBooking {
    TableBooking {
        booking_id: Uuid::new_v4(),
        booking_date: date,
        booking_time: t(time.0, time.1),
        party_size,
        status: status.as_str().to_string(),
        category: "regular".to_string(),
        starts_at: None,
        ends_at: None,
        duration_minutes: None,
    }
}

pub fn assignment_of(booking_id: Uuid, table_id: Uuid, window: BookingWindow) -> TableAssignment {
    TableAssignment {
        assignment_id: Uuid::new_v4(),
        booking_id,
        table_id,
        starts_at: window.start,
        ends_at: window.end,
    }
}
