//! Booking-window policy. Non-privileged bookings may reach six days ahead,
//! extending to seven once the club clock passes 22:00 (the window for a
//! date "opens" at 10 PM ET seven days prior). League and club event
//! bookings skip the upper bound but never the lower one.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::error::{ReasonCode, Rejection};
use crate::services::schedule;

const BASE_WINDOW_DAYS: i64 = 6;
const EXTENDED_WINDOW_DAYS: i64 = 7;
const EXTENSION_HOUR: u32 = 22;

/// The furthest date a non-privileged member can book right now (inclusive).
pub fn booking_horizon(now: DateTime<Utc>) -> NaiveDate {
    let local = schedule::club_now(now);
    let days = if local.hour() >= EXTENSION_HOUR {
        EXTENDED_WINDOW_DAYS
    } else {
        BASE_WINDOW_DAYS
    };
    local.date_naive() + Duration::days(days)
}

/// Gate a requested date against the window. `skip_upper` lifts the horizon
/// (granted to LEAGUE/CLUB bookings by eligible roles) but past dates stay
/// rejected for everyone.
pub fn check_window(
    date: NaiveDate,
    now: DateTime<Utc>,
    skip_upper: bool,
) -> Result<(), Rejection> {
    if date < schedule::club_today(now) {
        return Err(Rejection::with_message(
            ReasonCode::OutOfWindow,
            "Cannot book a date in the past.",
        ));
    }
    if !skip_upper {
        let horizon = booking_horizon(now);
        if date > horizon {
            let opens = date - Duration::days(EXTENDED_WINDOW_DAYS);
            return Err(Rejection::with_message(
                ReasonCode::OutOfWindow,
                format!(
                    "Booking window not yet open — opens {} at 10:00 PM ET.",
                    opens.format("%b %-d")
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn horizon_is_six_days_before_ten_pm() {
        // 12:00 UTC = 08:00 EDT on Jul 10.
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        assert_eq!(booking_horizon(now), date(2025, 7, 16));
    }

    #[test]
    fn horizon_extends_at_ten_pm_eastern() {
        // 02:30 UTC Jul 11 = 22:30 EDT Jul 10: the next day opens.
        let now = Utc.with_ymd_and_hms(2025, 7, 11, 2, 30, 0).unwrap();
        assert_eq!(booking_horizon(now), date(2025, 7, 17));
    }

    #[test]
    fn horizon_respects_winter_offset() {
        // 03:30 UTC Jan 15 = 22:30 EST Jan 14.
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 3, 30, 0).unwrap();
        assert_eq!(booking_horizon(now), date(2025, 1, 21));
    }

    #[test]
    fn past_dates_rejected_for_everyone() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        for skip in [false, true] {
            let err = check_window(date(2025, 7, 9), now, skip).unwrap_err();
            assert_eq!(err.code, ReasonCode::OutOfWindow);
            assert_eq!(err.message, "Cannot book a date in the past.");
        }
    }

    #[test]
    fn today_and_horizon_are_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        assert!(check_window(date(2025, 7, 10), now, false).is_ok());
        assert!(check_window(date(2025, 7, 16), now, false).is_ok());
    }

    #[test]
    fn day_past_horizon_rejected_unless_skipped() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let err = check_window(date(2025, 7, 17), now, false).unwrap_err();
        assert_eq!(err.code, ReasonCode::OutOfWindow);
    }

    #[test]
    fn skip_lifts_upper_bound_only() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        assert!(check_window(date(2025, 7, 30), now, true).is_ok());
        assert!(check_window(date(2025, 7, 30), now, false).is_err());
    }

    #[test]
    fn rejection_names_the_opening_date() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();
        let err = check_window(date(2025, 7, 20), now, false).unwrap_err();
        // Window for Jul 20 opens Jul 13 at 10 PM ET.
        assert!(err.message.contains("Jul 13"), "{}", err.message);
    }
}
