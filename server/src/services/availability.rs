//! Occupancy of the slot/court grid for a date. Loaded fresh from the store
//! at validation time (inside the writing transaction) so the validator and
//! the calendar views always agree; this is the definitive truth, not a
//! cache.

use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::ReservationType;

#[derive(Debug, Clone)]
pub struct Occupant {
    pub reservation_id: Uuid,
    pub member_id: Uuid,
    pub name: String,
    pub kind: ReservationType,
}

#[derive(Debug, Clone, Default)]
pub struct DayOccupancy {
    cells: HashMap<(i16, i16), Occupant>,
}

impl DayOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: i16, court: i16, occupant: Occupant) {
        self.cells.insert((slot, court), occupant);
    }

    /// The occupant of a cell, ignoring `exclude` (used by edits so a
    /// reservation's own cell does not conflict with itself).
    pub fn occupant(&self, slot: i16, court: i16, exclude: Option<Uuid>) -> Option<&Occupant> {
        self.cells
            .get(&(slot, court))
            .filter(|o| Some(o.reservation_id) != exclude)
    }

    pub fn is_occupied(&self, slot: i16, court: i16, exclude: Option<Uuid>) -> bool {
        self.occupant(slot, court, exclude).is_some()
    }

    /// Courts with no active booking in the given slot.
    pub fn free_courts(&self, slot: i16) -> i16 {
        (1..=crate::services::schedule::COURT_COUNT)
            .filter(|&court| !self.is_occupied(slot, court, None))
            .count() as i16
    }
}

/// Every active cell for a date, with enough of the owning reservation to
/// render and to validate against.
pub async fn load_day(
    exec: impl sqlx::PgExecutor<'_>,
    date: NaiveDate,
) -> Result<DayOccupancy, sqlx::Error> {
    let rows: Vec<(i16, i16, Uuid, Uuid, String, ReservationType)> = sqlx::query_as(
        r#"SELECT c.slot, c.court, r.id, r.member_id, r.name, r.type
        FROM reservation_cells c
        JOIN reservations r ON r.id = c.reservation_id
        WHERE c.date = $1 AND c.active"#,
    )
    .bind(date)
    .fetch_all(exec)
    .await?;

    let mut occupancy = DayOccupancy::new();
    for (slot, court, id, member_id, name, kind) in rows {
        occupancy.insert(
            slot,
            court,
            Occupant {
                reservation_id: id,
                member_id,
                name,
                kind,
            },
        );
    }
    Ok(occupancy)
}

/// Occupied-cell counts per day over an inclusive range. Days with no
/// bookings are absent from the map.
pub async fn load_range_counts(
    exec: impl sqlx::PgExecutor<'_>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<HashMap<NaiveDate, i64>, sqlx::Error> {
    let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
        r#"SELECT date, COUNT(*)::bigint
        FROM reservation_cells
        WHERE active AND date BETWEEN $1 AND $2
        GROUP BY date"#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(exec)
    .await?;

    Ok(rows.into_iter().collect())
}
