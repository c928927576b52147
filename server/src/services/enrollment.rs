//! League enrollment decisions. The state machine per (member, season) is
//! NONE -> ACTIVE or NONE -> WAITLISTED -> ACTIVE (promotion), with
//! WITHDRAWN reachable from either live state. Ordering within each status
//! bucket is by enrollment timestamp ascending, which is also the waitlist
//! position.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::EnrollmentStatus;

/// Where a new enrollee lands: on the roster while there is room, otherwise
/// at the tail of the waitlist. `max_players` of `None` means unbounded.
pub fn enroll_outcome(active_count: i64, max_players: Option<i32>) -> EnrollmentStatus {
    match max_players {
        Some(cap) if active_count >= i64::from(cap) => EnrollmentStatus::Waitlisted,
        _ => EnrollmentStatus::Active,
    }
}

/// Pick the enrollment to promote when a roster spot opens: the earliest
/// waitlisted entry, exactly one per vacancy.
pub fn earliest_waitlisted(waitlist: &[(Uuid, DateTime<Utc>)]) -> Option<Uuid> {
    waitlist
        .iter()
        .min_by_key(|(_, enrolled_at)| *enrolled_at)
        .map(|(id, _)| *id)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn roster_fills_before_waitlist() {
        assert_eq!(enroll_outcome(0, Some(1)), EnrollmentStatus::Active);
        assert_eq!(enroll_outcome(1, Some(1)), EnrollmentStatus::Waitlisted);
        assert_eq!(enroll_outcome(7, Some(8)), EnrollmentStatus::Active);
        assert_eq!(enroll_outcome(8, Some(8)), EnrollmentStatus::Waitlisted);
    }

    #[test]
    fn unbounded_season_never_waitlists() {
        assert_eq!(enroll_outcome(500, None), EnrollmentStatus::Active);
    }

    #[test]
    fn promotion_is_fifo() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let t = |h| Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap();

        // b enrolled first, even though it is not first in the slice.
        let waitlist = vec![(a, t(12)), (b, t(9)), (c, t(15))];
        assert_eq!(earliest_waitlisted(&waitlist), Some(b));
        assert_eq!(earliest_waitlisted(&[]), None);
    }
}
