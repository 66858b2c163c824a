//! Table availability and the move-table operation.
//!
//! Availability is a pure read over the booking's time window; the move
//! itself recomputes availability in the same request before writing, and
//! leans on the store's exclusion constraint as the authoritative conflict
//! signal for concurrent writers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use service_core::error::AppError;

use crate::config::VenueConfig;
use crate::models::{
    BookingCategory, BookingStatus, RestaurantTable, TableAssignment, TableBooking,
};
use crate::services::timewindow::{self, BookingWindow, TimeWindowError};

#[derive(Debug, Error)]
pub enum MoveTableError {
    #[error("booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("booking {booking_id} cannot be moved while {status}")]
    BookingNotMovable {
        booking_id: Uuid,
        status: &'static str,
    },

    #[error("table {0} not found")]
    TableNotFound(Uuid),

    #[error("this table is no longer available for the requested window")]
    TableNoLongerAvailable,

    #[error("booking assignments changed during the move; retry from the table list")]
    StaleAssignmentState,

    #[error(transparent)]
    InvalidTimeFormat(#[from] TimeWindowError),

    #[error(transparent)]
    Store(AppError),
}

impl From<AppError> for MoveTableError {
    fn from(err: AppError) -> Self {
        MoveTableError::Store(err)
    }
}

impl From<MoveTableError> for AppError {
    fn from(err: MoveTableError) -> Self {
        match err {
            MoveTableError::BookingNotFound(_) | MoveTableError::TableNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!("{err}"))
            }
            MoveTableError::BookingNotMovable { .. }
            | MoveTableError::TableNoLongerAvailable
            | MoveTableError::StaleAssignmentState => AppError::Conflict(anyhow::anyhow!("{err}")),
            MoveTableError::InvalidTimeFormat(_) => AppError::BadRequest(anyhow::anyhow!("{err}")),
            MoveTableError::Store(inner) => inner,
        }
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn booking(&self, booking_id: Uuid) -> Result<Option<TableBooking>, AppError>;
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn bookable_tables(&self) -> Result<Vec<RestaurantTable>, AppError>;
    async fn table(&self, table_id: Uuid) -> Result<Option<RestaurantTable>, AppError>;
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn assignments_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Vec<TableAssignment>, AppError>;

    /// Assignments on any of `table_ids` whose `[starts_at, ends_at)`
    /// overlaps `window`, joined with the owning booking's status.
    async fn overlapping_assignments(
        &self,
        table_ids: &[Uuid],
        window: &BookingWindow,
    ) -> Result<Vec<(TableAssignment, BookingStatus)>, AppError>;

    /// Atomically make `table_id` the booking's only assignment for
    /// `window`: update the target row if one exists, insert it otherwise,
    /// then drop all other assignment rows of the booking. The store
    /// compares the booking's current assignment ids against
    /// `expected_assignment_ids` inside the transaction and fails with
    /// `StaleAssignmentState` on mismatch; an exclusion/uniqueness
    /// violation from a concurrent writer fails with
    /// `TableNoLongerAvailable`. Either failure leaves the prior
    /// assignments fully intact.
    async fn reassign(
        &self,
        booking_id: Uuid,
        table_id: Uuid,
        window: &BookingWindow,
        expected_assignment_ids: &[Uuid],
    ) -> Result<TableAssignment, MoveTableError>;
}

#[async_trait]
pub trait PrivateEventStore: Send + Sync {
    /// Areas blocked for `window` by an active private booking in a mapped
    /// venue space.
    async fn blocked_area_ids(&self, window: &BookingWindow) -> Result<Vec<Uuid>, AppError>;
}

/// The "available right now" view for one booking.
#[derive(Debug, Clone)]
pub struct MoveTableOptions {
    pub booking_id: Uuid,
    pub window: BookingWindow,
    pub assigned_table_ids: Vec<Uuid>,
    pub tables: Vec<RestaurantTable>,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub booking_id: Uuid,
    pub table: RestaurantTable,
    pub window: BookingWindow,
}

pub struct TableResolver {
    bookings: Arc<dyn BookingStore>,
    tables: Arc<dyn TableStore>,
    assignments: Arc<dyn AssignmentStore>,
    private_events: Arc<dyn PrivateEventStore>,
    venue: VenueConfig,
}

impl TableResolver {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        tables: Arc<dyn TableStore>,
        assignments: Arc<dyn AssignmentStore>,
        private_events: Arc<dyn PrivateEventStore>,
        venue: VenueConfig,
    ) -> Self {
        Self {
            bookings,
            tables,
            assignments,
            private_events,
            venue,
        }
    }

    /// The booking's absolute window: stored instants when present,
    /// otherwise derived from date/time and the category's default
    /// duration.
    fn booking_window(&self, booking: &TableBooking) -> Result<BookingWindow, MoveTableError> {
        let start = booking.starts_at.unwrap_or_else(|| {
            timewindow::local_to_utc(booking.booking_date, booking.booking_time, self.venue.timezone)
        });
        let default_minutes = match booking.category() {
            BookingCategory::FixedMenu => self.venue.fixed_menu_booking_minutes,
            BookingCategory::Regular => self.venue.default_booking_minutes,
        };
        let duration = booking
            .duration_minutes
            .map(i64::from)
            .or(Some(default_minutes));
        Ok(timewindow::derive_window(
            start,
            booking.ends_at,
            duration,
            self.venue.minimum_booking_minutes,
        )?)
    }

    /// Tables eligible to host the booking right now, excluding its own
    /// current tables (those are reported separately).
    #[instrument(skip(self))]
    pub async fn available_tables(
        &self,
        booking_id: Uuid,
    ) -> Result<MoveTableOptions, MoveTableError> {
        let booking = self
            .bookings
            .booking(booking_id)
            .await?
            .ok_or(MoveTableError::BookingNotFound(booking_id))?;

        let window = self.booking_window(&booking)?;

        // A cancelled or no-show booking has no available-table concept.
        if !booking.status().is_movable() {
            return Ok(MoveTableOptions {
                booking_id,
                window,
                assigned_table_ids: Vec::new(),
                tables: Vec::new(),
            });
        }

        let (all_tables, current, blocked_areas) = futures::try_join!(
            self.tables.bookable_tables(),
            self.assignments.assignments_for_booking(booking_id),
            self.private_events.blocked_area_ids(&window),
        )?;

        let candidates: Vec<RestaurantTable> = all_tables
            .into_iter()
            .filter(|t| t.capacity >= booking.party_size)
            .collect();
        let candidate_ids: Vec<Uuid> = candidates.iter().map(|t| t.table_id).collect();

        let overlaps = self
            .assignments
            .overlapping_assignments(&candidate_ids, &window)
            .await?;
        let occupied: HashSet<Uuid> = overlaps
            .iter()
            .filter(|(a, status)| a.booking_id != booking_id && status.blocks_tables())
            .map(|(a, _)| a.table_id)
            .collect();

        let assigned_table_ids: Vec<Uuid> = current.iter().map(|a| a.table_id).collect();
        let assigned: HashSet<Uuid> = assigned_table_ids.iter().copied().collect();
        let blocked_areas: HashSet<Uuid> = blocked_areas.into_iter().collect();

        let mut tables: Vec<RestaurantTable> = candidates
            .into_iter()
            .filter(|t| {
                !occupied.contains(&t.table_id)
                    && !blocked_areas.contains(&t.area_id)
                    && !assigned.contains(&t.table_id)
            })
            .collect();
        tables.sort_by(|a, b| {
            natural_cmp(&a.table_number, &b.table_number).then_with(|| a.name.cmp(&b.name))
        });

        Ok(MoveTableOptions {
            booking_id,
            window,
            assigned_table_ids,
            tables,
        })
    }

    /// Atomically reassign the booking to exactly one target table, or
    /// refresh the window on a table it already holds. Availability is
    /// recomputed here, never taken from the caller: the list the user
    /// clicked on may already be stale.
    #[instrument(skip(self))]
    pub async fn move_table(
        &self,
        booking_id: Uuid,
        target_table_id: Uuid,
    ) -> Result<MoveOutcome, MoveTableError> {
        let booking = self
            .bookings
            .booking(booking_id)
            .await?
            .ok_or(MoveTableError::BookingNotFound(booking_id))?;
        let status = booking.status();
        if !status.is_movable() {
            return Err(MoveTableError::BookingNotMovable {
                booking_id,
                status: status.as_str(),
            });
        }

        let options = self.available_tables(booking_id).await?;

        let is_current = options.assigned_table_ids.contains(&target_table_id);
        let is_available = options.tables.iter().any(|t| t.table_id == target_table_id);
        if !is_current && !is_available {
            return Err(MoveTableError::TableNoLongerAvailable);
        }

        let table = self
            .tables
            .table(target_table_id)
            .await?
            .ok_or(MoveTableError::TableNotFound(target_table_id))?;

        let current_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = self
                .assignments
                .assignments_for_booking(booking_id)
                .await?
                .iter()
                .map(|a| a.assignment_id)
                .collect();
            ids.sort();
            ids
        };

        self.assignments
            .reassign(booking_id, target_table_id, &options.window, &current_ids)
            .await?;

        tracing::info!(
            booking_id = %booking_id,
            table_id = %target_table_id,
            table_number = %table.table_number,
            "Booking moved"
        );

        Ok(MoveOutcome {
            booking_id,
            table,
            window: options.window,
        })
    }
}

/// Numeric-aware collation for table numbers: "2" sorts before "10", and
/// mixed labels like "T2"/"T10" compare by their digit runs.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ac = a.chars().peekable();
    let mut bc = b.chars().peekable();

    loop {
        match (ac.peek().copied(), bc.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let mut xn: u64 = 0;
                    while let Some(d) = ac.peek().and_then(|c| c.to_digit(10)) {
                        xn = xn.saturating_mul(10).saturating_add(d as u64);
                        ac.next();
                    }
                    let mut yn: u64 = 0;
                    while let Some(d) = bc.peek().and_then(|c| c.to_digit(10)) {
                        yn = yn.saturating_mul(10).saturating_add(d as u64);
                        bc.next();
                    }
                    match xn.cmp(&yn) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    match x.cmp(&y) {
                        Ordering::Equal => {
                            ac.next();
                            bc.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}
