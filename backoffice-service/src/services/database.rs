//! Database service for backoffice-service.
//!
//! One `Database` wraps the pool and implements every store trait the
//! payroll reconciler and table resolver depend on. Conflict protection for
//! table assignments lives here, in the exclusion constraint declared by
//! the migrations: any 23505/23P01 raised during a write is converted into
//! the domain's conflict signal instead of a generic failure.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{
    BookingStatus, Employee, PayrollMonthApproval, PayrollPeriod, RestaurantTable, ShiftPlan,
    TableAssignment, TableBooking, TimeSession,
};
use crate::services::availability::{
    AssignmentStore, BookingStore, MoveTableError, PrivateEventStore, TableStore,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::payroll::{month_bounds, PayrollStore, SessionStore, ShiftStore};
use crate::services::timewindow::BookingWindow;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Postgres signals a unique violation as 23505 and an exclusion-constraint
/// violation as 23P01; both mean a concurrent writer won the slot.
fn is_constraint_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("23505") | Some("23P01"))
    )
}

fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), AppError> {
    month_bounds(year, month)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("{year}-{month} is not a month")))
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "backoffice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// =========================================================================
// Payroll stores
// =========================================================================

#[async_trait]
impl ShiftStore for Database {
    #[instrument(skip(self))]
    async fn shifts_for_month(&self, year: i32, month: u32) -> Result<Vec<ShiftPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["shifts_for_month"])
            .start_timer();
        let (start, end) = month_range(year, month)?;

        let shifts = sqlx::query_as::<_, ShiftPlan>(
            r#"
            SELECT s.shift_id, s.employee_id, s.work_date, s.planned_start, s.planned_end, s.department, s.note, s.is_sick
            FROM shift_plans s
            JOIN employees e ON e.employee_id = s.employee_id
            WHERE s.work_date >= $1 AND s.work_date < $2 AND NOT e.is_salaried
            ORDER BY s.work_date, s.planned_start
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load shifts: {}", e)))?;

        timer.observe_duration();
        Ok(shifts)
    }

    #[instrument(skip(self))]
    async fn delete_shift(&self, shift_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_shift"])
            .start_timer();

        let result = sqlx::query("DELETE FROM shift_plans WHERE shift_id = $1")
            .bind(shift_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete shift: {}", e))
            })?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Shift {} not found",
                shift_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Database {
    #[instrument(skip(self))]
    async fn sessions_for_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<TimeSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sessions_for_month"])
            .start_timer();
        let (start, end) = month_range(year, month)?;

        let sessions = sqlx::query_as::<_, TimeSession>(
            r#"
            SELECT t.session_id, t.employee_id, t.work_date, t.started_at, t.ended_at, t.note, t.is_sick, t.auto_closed
            FROM time_sessions t
            JOIN employees e ON e.employee_id = t.employee_id
            WHERE t.work_date >= $1 AND t.work_date < $2 AND NOT e.is_salaried
            ORDER BY t.work_date, t.started_at
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load sessions: {}", e)))?;

        timer.observe_duration();
        Ok(sessions)
    }

    #[instrument(skip(self))]
    async fn session(&self, session_id: Uuid) -> Result<Option<TimeSession>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["session"])
            .start_timer();

        let session = sqlx::query_as::<_, TimeSession>(
            r#"
            SELECT session_id, employee_id, work_date, started_at, ended_at, note, is_sick, auto_closed
            FROM time_sessions
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load session: {}", e)))?;

        timer.observe_duration();
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn update_session_times(
        &self,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_session_times"])
            .start_timer();

        // A manual correction supersedes the overnight sweep's auto-close.
        let result = sqlx::query(
            r#"
            UPDATE time_sessions
            SET started_at = $2, ended_at = $3, auto_closed = FALSE
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(started_at)
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update session: {}", e)))?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Session {} not found",
                session_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn insert_session(&self, session: TimeSession) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_session"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO time_sessions (session_id, employee_id, work_date, started_at, ended_at, note, is_sick, auto_closed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.session_id)
        .bind(session.employee_id)
        .bind(session.work_date)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.note)
        .bind(session.is_sick)
        .bind(session.auto_closed)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert session: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_session"])
            .start_timer();

        let result = sqlx::query("DELETE FROM time_sessions WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete session: {}", e))
            })?;

        timer.observe_duration();
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Session {} not found",
                session_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PayrollStore for Database {
    #[instrument(skip(self))]
    async fn hourly_employees(&self) -> Result<Vec<Employee>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["hourly_employees"])
            .start_timer();

        let employees = sqlx::query_as::<_, Employee>(
            r#"
            SELECT employee_id, display_name, hourly_rate, is_salaried
            FROM employees
            WHERE NOT is_salaried
            ORDER BY display_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load employees: {}", e)))?;

        timer.observe_duration();
        Ok(employees)
    }

    #[instrument(skip(self))]
    async fn approval_for(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Option<PayrollMonthApproval>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["approval_for"])
            .start_timer();

        let approval = sqlx::query_as::<_, PayrollMonthApproval>(
            r#"
            SELECT approval_id, year, month, approved_at, email_sent_at
            FROM payroll_month_approvals
            WHERE year = $1 AND month = $2
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load approval: {}", e)))?;

        timer.observe_duration();
        Ok(approval)
    }

    #[instrument(skip(self))]
    async fn insert_approval(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_approval"])
            .start_timer();

        let approval = sqlx::query_as::<_, PayrollMonthApproval>(
            r#"
            INSERT INTO payroll_month_approvals (approval_id, year, month)
            VALUES ($1, $2, $3)
            RETURNING approval_id, year, month, approved_at, email_sent_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(year)
        .bind(month as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Payroll {}-{:02} is already approved",
                    year,
                    month
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert approval: {}", e))
            }
        })?;

        timer.observe_duration();
        info!(year = year, month = month, "Payroll month approved");
        Ok(approval)
    }

    #[instrument(skip(self))]
    async fn period_for(&self, year: i32, month: u32) -> Result<Option<PayrollPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["period_for"])
            .start_timer();

        let period = sqlx::query_as::<_, PayrollPeriod>(
            r#"
            SELECT year, month, period_start, period_end
            FROM payroll_periods
            WHERE year = $1 AND month = $2
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load period: {}", e)))?;

        timer.observe_duration();
        Ok(period)
    }

    #[instrument(skip(self))]
    async fn upsert_period(
        &self,
        year: i32,
        month: u32,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<PayrollPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_period"])
            .start_timer();

        let period = sqlx::query_as::<_, PayrollPeriod>(
            r#"
            INSERT INTO payroll_periods (year, month, period_start, period_end)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (year, month)
            DO UPDATE SET period_start = EXCLUDED.period_start, period_end = EXCLUDED.period_end
            RETURNING year, month, period_start, period_end
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert period: {}", e)))?;

        timer.observe_duration();
        Ok(period)
    }

    #[instrument(skip(self))]
    async fn mark_email_sent(
        &self,
        year: i32,
        month: u32,
    ) -> Result<PayrollMonthApproval, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_email_sent"])
            .start_timer();

        let approval = sqlx::query_as::<_, PayrollMonthApproval>(
            r#"
            UPDATE payroll_month_approvals
            SET email_sent_at = NOW()
            WHERE year = $1 AND month = $2
            RETURNING approval_id, year, month, approved_at, email_sent_at
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark email: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No approval for {}-{:02}", year, month))
        })?;

        timer.observe_duration();
        Ok(approval)
    }
}

// =========================================================================
// Booking stores
// =========================================================================

#[async_trait]
impl BookingStore for Database {
    #[instrument(skip(self))]
    async fn booking(&self, booking_id: Uuid) -> Result<Option<TableBooking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["booking"])
            .start_timer();

        let booking = sqlx::query_as::<_, TableBooking>(
            r#"
            SELECT booking_id, booking_date, booking_time, party_size, status, category, starts_at, ends_at, duration_minutes
            FROM table_bookings
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load booking: {}", e)))?;

        timer.observe_duration();
        Ok(booking)
    }
}

#[async_trait]
impl TableStore for Database {
    #[instrument(skip(self))]
    async fn bookable_tables(&self) -> Result<Vec<RestaurantTable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bookable_tables"])
            .start_timer();

        let tables = sqlx::query_as::<_, RestaurantTable>(
            r#"
            SELECT table_id, table_number, name, capacity, area_id, bookable
            FROM restaurant_tables
            WHERE bookable
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load tables: {}", e)))?;

        timer.observe_duration();
        Ok(tables)
    }

    #[instrument(skip(self))]
    async fn table(&self, table_id: Uuid) -> Result<Option<RestaurantTable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["table"])
            .start_timer();

        let table = sqlx::query_as::<_, RestaurantTable>(
            r#"
            SELECT table_id, table_number, name, capacity, area_id, bookable
            FROM restaurant_tables
            WHERE table_id = $1
            "#,
        )
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load table: {}", e)))?;

        timer.observe_duration();
        Ok(table)
    }
}

#[derive(Debug, FromRow)]
struct OverlapRow {
    assignment_id: Uuid,
    booking_id: Uuid,
    table_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    status: String,
}

#[async_trait]
impl AssignmentStore for Database {
    #[instrument(skip(self))]
    async fn assignments_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TableAssignment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["assignments_for_booking"])
            .start_timer();

        let assignments = sqlx::query_as::<_, TableAssignment>(
            r#"
            SELECT assignment_id, booking_id, table_id, starts_at, ends_at
            FROM booking_table_assignments
            WHERE booking_id = $1
            ORDER BY assignment_id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load assignments: {}", e))
        })?;

        timer.observe_duration();
        Ok(assignments)
    }

    #[instrument(skip(self, table_ids))]
    async fn overlapping_assignments(
        &self,
        table_ids: &[Uuid],
        window: &BookingWindow,
    ) -> Result<Vec<(TableAssignment, BookingStatus)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["overlapping_assignments"])
            .start_timer();

        let rows = sqlx::query_as::<_, OverlapRow>(
            r#"
            SELECT a.assignment_id, a.booking_id, a.table_id, a.starts_at, a.ends_at, b.status
            FROM booking_table_assignments a
            JOIN table_bookings b ON b.booking_id = a.booking_id
            WHERE a.table_id = ANY($1) AND a.starts_at < $2 AND a.ends_at > $3
            "#,
        )
        .bind(table_ids)
        .bind(window.end)
        .bind(window.start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load overlaps: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    TableAssignment {
                        assignment_id: r.assignment_id,
                        booking_id: r.booking_id,
                        table_id: r.table_id,
                        starts_at: r.starts_at,
                        ends_at: r.ends_at,
                    },
                    BookingStatus::from_str(&r.status),
                )
            })
            .collect())
    }

    #[instrument(skip(self, expected_assignment_ids))]
    async fn reassign(
        &self,
        booking_id: Uuid,
        table_id: Uuid,
        window: &BookingWindow,
        expected_assignment_ids: &[Uuid],
    ) -> Result<TableAssignment, MoveTableError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reassign"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            MoveTableError::Store(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let current = sqlx::query_as::<_, TableAssignment>(
            r#"
            SELECT assignment_id, booking_id, table_id, starts_at, ends_at
            FROM booking_table_assignments
            WHERE booking_id = $1
            ORDER BY assignment_id
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            MoveTableError::Store(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to lock assignments: {}",
                e
            )))
        })?;

        let current_ids: Vec<Uuid> = current.iter().map(|a| a.assignment_id).collect();
        if current_ids != expected_assignment_ids {
            return Err(MoveTableError::StaleAssignmentState);
        }

        // Update-or-insert the target row first, delete the rest after:
        // if the write trips the exclusion constraint the transaction rolls
        // back with the prior assignments untouched.
        let existing = current.iter().find(|a| a.table_id == table_id);
        let assignment = match existing {
            Some(a) => sqlx::query_as::<_, TableAssignment>(
                r#"
                UPDATE booking_table_assignments
                SET starts_at = $2, ends_at = $3
                WHERE assignment_id = $1
                RETURNING assignment_id, booking_id, table_id, starts_at, ends_at
                "#,
            )
            .bind(a.assignment_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_one(&mut *tx)
            .await,
            None => sqlx::query_as::<_, TableAssignment>(
                r#"
                INSERT INTO booking_table_assignments (assignment_id, booking_id, table_id, starts_at, ends_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING assignment_id, booking_id, table_id, starts_at, ends_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(booking_id)
            .bind(table_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_one(&mut *tx)
            .await,
        }
        .map_err(|e| {
            if is_constraint_violation(&e) {
                MoveTableError::TableNoLongerAvailable
            } else {
                MoveTableError::Store(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to write assignment: {}",
                    e
                )))
            }
        })?;

        sqlx::query(
            r#"
            DELETE FROM booking_table_assignments
            WHERE booking_id = $1 AND assignment_id <> $2
            "#,
        )
        .bind(booking_id)
        .bind(assignment.assignment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            MoveTableError::Store(AppError::DatabaseError(anyhow::anyhow!(
                "Failed to drop prior assignments: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            if is_constraint_violation(&e) {
                MoveTableError::TableNoLongerAvailable
            } else {
                MoveTableError::Store(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to commit reassignment: {}",
                    e
                )))
            }
        })?;

        timer.observe_duration();
        Ok(assignment)
    }
}

#[async_trait]
impl PrivateEventStore for Database {
    #[instrument(skip(self))]
    async fn blocked_area_ids(&self, window: &BookingWindow) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["blocked_area_ids"])
            .start_timer();

        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT m.area_id
            FROM venue_space_areas m
            JOIN private_bookings p ON p.venue_space_id = m.venue_space_id
            WHERE p.status <> 'cancelled' AND p.starts_at < $1 AND p.ends_at > $2
            "#,
        )
        .bind(window.end)
        .bind(window.start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to load private blocks: {}", e))
        })?;

        timer.observe_duration();
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
