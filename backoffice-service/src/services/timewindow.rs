//! Civil date/time to absolute instant conversion for the venue timezone.
//!
//! Every planned or actual time in the system is entered as a venue-local
//! clock time. Interval comparisons are only valid on UTC instants, so the
//! conversion here has to resolve the zone's offset rules - naive UTC
//! arithmetic on clock strings is wrong across DST transitions.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),
}

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BookingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Half-open overlap test: `[a, b)` and `[c, d)` overlap iff
    /// `a < d && b > c`. Back-to-back windows do not overlap.
    pub fn overlaps(&self, other: &BookingWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Parse an ISO-8601 `YYYY-MM-DD` civil date.
pub fn parse_civil_date(date: &str) -> Result<NaiveDate, TimeWindowError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| TimeWindowError::InvalidTimeFormat(format!("invalid date: {date}")))
}

/// Parse an `HH:MM` clock time.
pub fn parse_clock_time(time: &str) -> Result<NaiveTime, TimeWindowError> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| TimeWindowError::InvalidTimeFormat(format!("invalid time: {time}")))
}

/// Resolve a venue-local civil date + clock time to a UTC instant.
///
/// DST handling: an ambiguous time (clocks fell back, the local time
/// occurred twice) resolves to the earlier offset; a gap time (clocks
/// sprang forward, the local time never occurred) resolves to the first
/// instant after the transition.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, zone: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            zone.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Parse and resolve a `YYYY-MM-DD` + `HH:MM` pair to a UTC instant.
pub fn to_absolute_instant(
    date: &str,
    time: &str,
    zone: Tz,
) -> Result<DateTime<Utc>, TimeWindowError> {
    let date = parse_civil_date(date)?;
    let time = parse_clock_time(time)?;
    Ok(local_to_utc(date, time, zone))
}

/// Resolve a local start/end clock pair on one civil date to a UTC window.
/// An end at or before the start is taken to mean the block runs past
/// midnight into the following civil day.
pub fn local_window_to_utc(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    zone: Tz,
) -> BookingWindow {
    let start_utc = local_to_utc(date, start, zone);
    let end_date = if end <= start {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    };
    let end_utc = local_to_utc(end_date, end, zone);
    BookingWindow::new(start_utc, end_utc)
}

/// Derive a booking window from a start instant plus either an explicit
/// end or a duration. Without an explicit end, the window runs for
/// `max(duration_minutes, minimum_minutes)`; an explicit end at or before
/// the start is operator input error.
pub fn derive_window(
    start: DateTime<Utc>,
    explicit_end: Option<DateTime<Utc>>,
    duration_minutes: Option<i64>,
    minimum_minutes: i64,
) -> Result<BookingWindow, TimeWindowError> {
    match explicit_end {
        Some(end) if end <= start => Err(TimeWindowError::InvalidTimeFormat(format!(
            "window end {end} is not after start {start}"
        ))),
        Some(end) => Ok(BookingWindow::new(start, end)),
        None => {
            let minutes = duration_minutes.unwrap_or(minimum_minutes).max(minimum_minutes);
            Ok(BookingWindow::new(start, start + Duration::minutes(minutes)))
        }
    }
}
