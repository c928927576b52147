//! Conflict and eligibility rules for booking requests, plus the shared
//! "who may act on this reservation" check. Everything here is pure: the
//! routes gather the member rows, occupancy and ownership facts (inside the
//! writing transaction) and the decision is made over that snapshot.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, ReasonCode, Rejection};
use crate::models::{CreateReservationRequest, Member, MemberRole, ReservationType};
use crate::services::availability::DayOccupancy;
use crate::services::{schedule, window};

pub const MAX_REPEAT_WEEKS: i64 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRights {
    pub window_skip: bool,
}

/// The (role, requested type) eligibility table. `None` means the role may
/// not make that kind of booking at all; `window_skip` marks the elevated
/// combinations that bypass the booking horizon.
pub fn booking_rights(role: MemberRole, kind: ReservationType) -> Option<BookingRights> {
    match (role, kind) {
        (_, ReservationType::Regular) => Some(BookingRights { window_skip: false }),
        (MemberRole::LeagueCoordinator, ReservationType::League) => {
            Some(BookingRights { window_skip: true })
        }
        (MemberRole::Admin, ReservationType::Club) => Some(BookingRights { window_skip: true }),
        _ => None,
    }
}

/// Resolve a submission's cell set. REGULAR bookings name exactly one cell;
/// LEAGUE/CLUB bookings select slot and court sets and occupy their
/// cross-product. Shape problems here are malformed input, not domain
/// rejections.
pub fn normalize_cells(req: &CreateReservationRequest) -> Result<Vec<(i16, i16)>, AppError> {
    match req.kind {
        ReservationType::Regular => {
            let slot = req
                .slot
                .ok_or_else(|| AppError::BadRequest("Slot is required".into()))?;
            let court = req
                .court
                .ok_or_else(|| AppError::BadRequest("Court is required".into()))?;
            check_cell(slot, court)?;
            Ok(vec![(slot, court)])
        }
        ReservationType::League | ReservationType::Club => {
            let mut slots = req.slots.clone().unwrap_or_default();
            let mut courts = req.courts.clone().unwrap_or_default();
            slots.sort_unstable();
            slots.dedup();
            courts.sort_unstable();
            courts.dedup();
            if slots.is_empty() || courts.is_empty() {
                return Err(AppError::BadRequest(
                    "Select at least one slot and one court".into(),
                ));
            }
            let mut cells = Vec::with_capacity(slots.len() * courts.len());
            for &slot in &slots {
                for &court in &courts {
                    check_cell(slot, court)?;
                    cells.push((slot, court));
                }
            }
            Ok(cells)
        }
    }
}

fn check_cell(slot: i16, court: i16) -> Result<(), AppError> {
    if !schedule::is_valid_slot(slot) {
        return Err(AppError::BadRequest(format!("Invalid slot: {slot}")));
    }
    if !schedule::is_valid_court(court) {
        return Err(AppError::BadRequest(format!("Invalid court: {court}")));
    }
    Ok(())
}

/// Expand a weekly recurrence into its concrete dates. Each date is later
/// validated and written independently.
pub fn expand_dates(
    start: NaiveDate,
    repeat_weekly: bool,
    repeat_weeks: Option<i64>,
) -> Result<Vec<NaiveDate>, AppError> {
    if !repeat_weekly {
        return Ok(vec![start]);
    }
    let weeks = repeat_weeks.unwrap_or(4);
    if !(1..=MAX_REPEAT_WEEKS).contains(&weeks) {
        return Err(AppError::BadRequest(format!(
            "Weekly repeat must be between 1 and {MAX_REPEAT_WEEKS} weeks"
        )));
    }
    Ok((0..weeks)
        .map(|i| start + Duration::weeks(i))
        .collect())
}

/// Everything the validator needs to judge one date of a booking request.
pub struct BookingCheck<'a> {
    pub requester: &'a Member,
    /// Resolved rows for every listed player (the owner included, for
    /// REGULAR bookings).
    pub players: &'a [Member],
    pub kind: ReservationType,
    pub date: NaiveDate,
    pub now: DateTime<Utc>,
    pub cells: &'a [(i16, i16)],
    pub occupancy: &'a DayOccupancy,
    /// Requester already owns an ACTIVE REGULAR reservation on this date.
    pub owns_regular_that_day: bool,
    /// For LEAGUE requests: the named league is coordinated by the
    /// requester.
    pub league_assigned: bool,
    /// Edits treat the reservation's own cells as free.
    pub exclude_reservation: Option<Uuid>,
}

/// Accept or reject one date of a request. All-or-nothing per date: a single
/// occupied cell fails the whole date.
pub fn validate(check: &BookingCheck<'_>) -> Result<(), Rejection> {
    // Everyone on the booking must be an active member.
    if !check.requester.is_active() {
        return Err(Rejection::with_message(
            ReasonCode::InactiveParticipant,
            "Your membership is not active.",
        ));
    }
    if let Some(inactive) = check.players.iter().find(|p| !p.is_active()) {
        return Err(Rejection::with_message(
            ReasonCode::InactiveParticipant,
            format!("{} is not an active member.", inactive.full_name()),
        ));
    }

    // Booking window, with the role/type-dependent horizon skip.
    let rights = booking_rights(check.requester.role, check.kind);
    let skip = rights.map_or(false, |r| r.window_skip);
    window::check_window(check.date, check.now, skip)?;

    // Role eligibility.
    if rights.is_none() {
        return Err(Rejection::new(ReasonCode::IneligibleRole));
    }
    if check.kind == ReservationType::League && !check.league_assigned {
        return Err(Rejection::with_message(
            ReasonCode::IneligibleRole,
            "You are not assigned to this league.",
        ));
    }

    // One self-service booking per member per day.
    if check.kind == ReservationType::Regular && check.owns_regular_that_day {
        return Err(Rejection::new(ReasonCode::DuplicateDailyBooking));
    }

    // Every requested cell must be free.
    for &(slot, court) in check.cells {
        if check
            .occupancy
            .is_occupied(slot, court, check.exclude_reservation)
        {
            return Err(Rejection::with_message(
                ReasonCode::CellOccupied,
                format!("Slot {slot}, court {court} is already booked."),
            ));
        }
    }

    Ok(())
}

/// Who may cancel or edit a reservation: the owner, a listed player (for
/// REGULAR bookings), or an admin. Callers evaluate this against fresh rows
/// on every action.
pub fn can_act(
    requester: &Member,
    owner_id: Uuid,
    kind: ReservationType,
    player_ids: &[Uuid],
) -> bool {
    requester.is_admin()
        || requester.id == owner_id
        || (kind == ReservationType::Regular && player_ids.contains(&requester.id))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::MemberStatus;
    use crate::services::availability::Occupant;

    fn member(role: MemberRole, status: MemberStatus) -> Member {
        Member {
            id: Uuid::new_v4(),
            first_name: "Pat".to_string(),
            last_name: "Doe".to_string(),
            email: "pat@example.com".to_string(),
            role,
            status,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        // 08:00 EDT on Jul 10, 2025; horizon is Jul 16.
        Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn check<'a>(
        requester: &'a Member,
        kind: ReservationType,
        on: NaiveDate,
        cells: &'a [(i16, i16)],
        occupancy: &'a DayOccupancy,
    ) -> BookingCheck<'a> {
        BookingCheck {
            requester,
            players: &[],
            kind,
            date: on,
            now: now(),
            cells,
            occupancy,
            owns_regular_that_day: false,
            league_assigned: true,
            exclude_reservation: None,
        }
    }

    #[test]
    fn eligibility_table_is_exhaustive() {
        use MemberRole::*;
        use ReservationType::*;

        // Everyone may book a regular court time inside the window.
        for role in [Member, LeagueCoordinator, Admin] {
            let rights = booking_rights(role, Regular).unwrap();
            assert!(!rights.window_skip);
        }
        // Only coordinators book league events, only admins club events,
        // each with the horizon lifted.
        assert!(booking_rights(LeagueCoordinator, League).unwrap().window_skip);
        assert!(booking_rights(Admin, Club).unwrap().window_skip);
        assert!(booking_rights(Member, League).is_none());
        assert!(booking_rights(Member, Club).is_none());
        assert!(booking_rights(LeagueCoordinator, Club).is_none());
        assert!(booking_rights(Admin, League).is_none());
    }

    #[test]
    fn inactive_requester_rejected() {
        let m = member(MemberRole::Member, MemberStatus::Pending);
        let occ = DayOccupancy::new();
        let cells = [(1, 1)];
        let err = validate(&check(&m, ReservationType::Regular, date(2025, 7, 12), &cells, &occ))
            .unwrap_err();
        assert_eq!(err.code, ReasonCode::InactiveParticipant);
    }

    #[test]
    fn inactive_listed_player_rejected() {
        let m = member(MemberRole::Member, MemberStatus::Active);
        let inactive = member(MemberRole::Member, MemberStatus::Inactive);
        let occ = DayOccupancy::new();
        let cells = [(1, 1)];
        let mut c = check(&m, ReservationType::Regular, date(2025, 7, 12), &cells, &occ);
        let players = [m.clone(), inactive];
        c.players = &players;
        let err = validate(&c).unwrap_err();
        assert_eq!(err.code, ReasonCode::InactiveParticipant);
    }

    #[test]
    fn member_cannot_book_league_or_club() {
        let m = member(MemberRole::Member, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(1, 1)];
        for kind in [ReservationType::League, ReservationType::Club] {
            let err = validate(&check(&m, kind, date(2025, 7, 12), &cells, &occ)).unwrap_err();
            assert_eq!(err.code, ReasonCode::IneligibleRole);
        }
    }

    #[test]
    fn window_rejection_comes_before_role_rejection() {
        // A plain member asking for a LEAGUE booking far out fails the
        // window first; the skip is never granted to them.
        let m = member(MemberRole::Member, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(1, 1)];
        let err =
            validate(&check(&m, ReservationType::League, date(2025, 7, 30), &cells, &occ))
                .unwrap_err();
        assert_eq!(err.code, ReasonCode::OutOfWindow);
    }

    #[test]
    fn coordinator_books_league_beyond_horizon() {
        let m = member(MemberRole::LeagueCoordinator, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(1, 3), (1, 4), (2, 3), (2, 4)];
        assert!(
            validate(&check(&m, ReservationType::League, date(2025, 7, 30), &cells, &occ)).is_ok()
        );
    }

    #[test]
    fn coordinator_without_league_assignment_rejected() {
        let m = member(MemberRole::LeagueCoordinator, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(1, 1)];
        let mut c = check(&m, ReservationType::League, date(2025, 7, 12), &cells, &occ);
        c.league_assigned = false;
        let err = validate(&c).unwrap_err();
        assert_eq!(err.code, ReasonCode::IneligibleRole);
    }

    #[test]
    fn admin_books_club_beyond_horizon() {
        let m = member(MemberRole::Admin, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(1, 3), (1, 4), (2, 3), (2, 4)];
        assert!(
            validate(&check(&m, ReservationType::Club, date(2025, 7, 30), &cells, &occ)).is_ok()
        );
    }

    #[test]
    fn second_regular_booking_same_day_rejected() {
        let m = member(MemberRole::Member, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(4, 2)];
        let mut c = check(&m, ReservationType::Regular, date(2025, 7, 10), &cells, &occ);
        c.owns_regular_that_day = true;
        let err = validate(&c).unwrap_err();
        assert_eq!(err.code, ReasonCode::DuplicateDailyBooking);
    }

    #[test]
    fn league_bookings_exempt_from_daily_limit() {
        let m = member(MemberRole::LeagueCoordinator, MemberStatus::Active);
        let occ = DayOccupancy::new();
        let cells = [(4, 2)];
        let mut c = check(&m, ReservationType::League, date(2025, 7, 12), &cells, &occ);
        c.owns_regular_that_day = true;
        assert!(validate(&c).is_ok());
    }

    fn occupy(occ: &mut DayOccupancy, slot: i16, court: i16) -> Uuid {
        let id = Uuid::new_v4();
        occ.insert(
            slot,
            court,
            Occupant {
                reservation_id: id,
                member_id: Uuid::new_v4(),
                name: "Taken".to_string(),
                kind: ReservationType::Regular,
            },
        );
        id
    }

    #[test]
    fn occupied_cell_rejects_whole_request() {
        let m = member(MemberRole::Admin, MemberStatus::Active);
        let mut occ = DayOccupancy::new();
        occupy(&mut occ, 2, 4);
        // One clash out of four cells fails the date entirely.
        let cells = [(1, 3), (1, 4), (2, 3), (2, 4)];
        let err =
            validate(&check(&m, ReservationType::Club, date(2025, 7, 12), &cells, &occ))
                .unwrap_err();
        assert_eq!(err.code, ReasonCode::CellOccupied);
    }

    #[test]
    fn same_cell_edit_does_not_conflict_with_itself() {
        let m = member(MemberRole::Member, MemberStatus::Active);
        let mut occ = DayOccupancy::new();
        let mine = occupy(&mut occ, 5, 1);
        let cells = [(5, 1)];
        let mut c = check(&m, ReservationType::Regular, date(2025, 7, 12), &cells, &occ);
        c.exclude_reservation = Some(mine);
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn cross_product_cells_from_slot_and_court_sets() {
        let req = CreateReservationRequest {
            kind: ReservationType::Club,
            date: "2025-07-30".to_string(),
            slot: None,
            court: None,
            slots: Some(vec![2, 1, 2]),
            courts: Some(vec![4, 3]),
            players: vec![],
            name: Some("Club social".to_string()),
            league_id: None,
            repeat_weekly: false,
            repeat_weeks: None,
        };
        let cells = normalize_cells(&req).unwrap();
        assert_eq!(cells, vec![(1, 3), (1, 4), (2, 3), (2, 4)]);
    }

    #[test]
    fn regular_requires_exactly_one_cell() {
        let req = CreateReservationRequest {
            kind: ReservationType::Regular,
            date: "2025-07-12".to_string(),
            slot: Some(3),
            court: None,
            slots: None,
            courts: None,
            players: vec![],
            name: None,
            league_id: None,
            repeat_weekly: false,
            repeat_weeks: None,
        };
        assert!(normalize_cells(&req).is_err());
    }

    #[test]
    fn out_of_grid_cells_are_malformed() {
        let req = CreateReservationRequest {
            kind: ReservationType::Regular,
            date: "2025-07-12".to_string(),
            slot: Some(10),
            court: Some(1),
            slots: None,
            courts: None,
            players: vec![],
            name: None,
            league_id: None,
            repeat_weekly: false,
            repeat_weeks: None,
        };
        assert!(normalize_cells(&req).is_err());
    }

    #[test]
    fn weekly_expansion_steps_by_seven_days() {
        let dates = expand_dates(date(2025, 7, 10), true, Some(4)).unwrap();
        assert_eq!(
            dates,
            vec![
                date(2025, 7, 10),
                date(2025, 7, 17),
                date(2025, 7, 24),
                date(2025, 7, 31),
            ]
        );
    }

    #[test]
    fn no_repeat_yields_single_date() {
        assert_eq!(
            expand_dates(date(2025, 7, 10), false, Some(8)).unwrap(),
            vec![date(2025, 7, 10)]
        );
    }

    #[test]
    fn repeat_weeks_bounded() {
        assert!(expand_dates(date(2025, 7, 10), true, Some(0)).is_err());
        assert!(expand_dates(date(2025, 7, 10), true, Some(27)).is_err());
        assert_eq!(
            expand_dates(date(2025, 7, 10), true, Some(26)).unwrap().len(),
            26
        );
    }

    #[test]
    fn authority_covers_owner_player_and_admin() {
        let owner = member(MemberRole::Member, MemberStatus::Active);
        let player = member(MemberRole::Member, MemberStatus::Active);
        let admin = member(MemberRole::Admin, MemberStatus::Active);
        let stranger = member(MemberRole::Member, MemberStatus::Active);
        let players = [owner.id, player.id];

        for kind in [ReservationType::Regular, ReservationType::Club] {
            assert!(can_act(&owner, owner.id, kind, &players));
            assert!(can_act(&admin, owner.id, kind, &players));
            assert!(!can_act(&stranger, owner.id, kind, &players));
        }
        // A listed player may manage a regular booking but not a league or
        // club event they happen to be listed on.
        assert!(can_act(&player, owner.id, ReservationType::Regular, &players));
        assert!(!can_act(&player, owner.id, ReservationType::League, &players));
    }
}
