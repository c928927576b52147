//! The fixed daily grid: nine 90-minute slots across four courts, all dates
//! reckoned in the club's local zone regardless of where the server runs.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::AppError;

pub const CLUB_TZ: Tz = chrono_tz::America::New_York;

pub const SLOT_COUNT: i16 = 9;
pub const COURT_COUNT: i16 = 4;
pub const TOTAL_CELLS: i64 = (SLOT_COUNT as i64) * (COURT_COUNT as i64);

// Slot 1 is 8:30 am; each slot is 90 minutes. Indices are 1-based and
// stable; only the index is ever persisted.
const SLOT_TIMES: [(&str, &str); SLOT_COUNT as usize] = [
    ("8:30 AM", "10:00 AM"),
    ("10:00 AM", "11:30 AM"),
    ("11:30 AM", "1:00 PM"),
    ("1:00 PM", "2:30 PM"),
    ("2:30 PM", "4:00 PM"),
    ("4:00 PM", "5:30 PM"),
    ("5:30 PM", "7:00 PM"),
    ("7:00 PM", "8:30 PM"),
    ("8:30 PM", "10:00 PM"),
];

/// All slots in order as (index, start label, end label).
pub fn slot_grid() -> impl Iterator<Item = (i16, &'static str, &'static str)> {
    SLOT_TIMES
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| ((i + 1) as i16, start, end))
}

pub fn is_valid_slot(slot: i16) -> bool {
    (1..=SLOT_COUNT).contains(&slot)
}

pub fn is_valid_court(court: i16) -> bool {
    (1..=COURT_COUNT).contains(&court)
}

/// The wall clock at the club, for an instant measured anywhere.
pub fn club_now(now: DateTime<Utc>) -> DateTime<Tz> {
    now.with_timezone(&CLUB_TZ)
}

/// The club-local calendar date. This is what "today" means everywhere in
/// the scheduler; a late-night UTC instant can land on the previous ET day.
pub fn club_today(now: DateTime<Utc>) -> NaiveDate {
    club_now(now).date_naive()
}

/// Strict `YYYY-MM-DD` parse for date parameters.
pub fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {s}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn slot_grid_covers_club_day() {
        let grid: Vec<_> = slot_grid().collect();
        assert_eq!(grid.len(), SLOT_COUNT as usize);
        assert_eq!(grid[0], (1, "8:30 AM", "10:00 AM"));
        assert_eq!(grid[4], (5, "2:30 PM", "4:00 PM"));
        assert_eq!(grid[8], (9, "8:30 PM", "10:00 PM"));
        assert_eq!(TOTAL_CELLS, 36);
    }

    #[test]
    fn club_today_uses_eastern_time_not_utc() {
        // 03:59 UTC on Jul 11 is 23:59 EDT on Jul 10.
        let now = Utc.with_ymd_and_hms(2025, 7, 11, 3, 59, 0).unwrap();
        assert_eq!(club_today(now), NaiveDate::from_ymd_opt(2025, 7, 10).unwrap());

        // Same check in winter (EST is UTC-5).
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 4, 30, 0).unwrap();
        assert_eq!(club_today(now), NaiveDate::from_ymd_opt(2025, 1, 14).unwrap());
    }

    #[test]
    fn parse_date_is_strict() {
        assert_eq!(
            parse_date("2025-07-10").unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 10).unwrap()
        );
        assert!(parse_date("07/10/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("").is_err());
    }
}
