//! Table booking domain models.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Named zone of the floor plan. An area may be mapped to venue spaces so
/// a private event in the space blocks every table in the area.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TableArea {
    pub area_id: Uuid,
    pub name: String,
}

/// A hireable private-event space (function room, terrace, ...).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VenueSpace {
    pub space_id: Uuid,
    pub name: String,
}

/// Physical seating unit.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RestaurantTable {
    pub table_id: Uuid,
    pub table_number: String,
    pub name: String,
    pub capacity: i32,
    pub area_id: Uuid,
    pub bookable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Seated,
    Left,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Seated => "seated",
            Self::Left => "left",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "seated" => Self::Seated,
            "left" => Self::Left,
            "cancelled" => Self::Cancelled,
            "no_show" => Self::NoShow,
            _ => Self::Pending,
        }
    }

    /// A cancelled booking never blocks a table; every other status keeps
    /// its assignments in force for overlap purposes.
    pub fn blocks_tables(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Whether the booking can still be (re)assigned to tables.
    pub fn is_movable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::NoShow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingCategory {
    Regular,
    FixedMenu,
}

impl BookingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::FixedMenu => "fixed_menu",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "fixed_menu" => Self::FixedMenu,
            _ => Self::Regular,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TableBooking {
    pub booking_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub party_size: i32,
    pub status: String,
    pub category: String,
    /// Stored absolute window; derived from date/time/duration when absent.
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

impl TableBooking {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::from_str(&self.status)
    }

    pub fn category(&self) -> BookingCategory {
        BookingCategory::from_str(&self.category)
    }
}

/// Join of a booking to one table for a concrete time window. A booking may
/// hold several of these (multi-table combinations for large parties).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TableAssignment {
    pub assignment_id: Uuid,
    pub booking_id: Uuid,
    pub table_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}
