use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::services::{availability, schedule};
use crate::AppState;

const MAX_RANGE_DAYS: i64 = 92;

#[derive(Debug, Deserialize)]
pub struct DayParams {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: String,
    pub end: String,
}

/// Occupancy of the full 9x4 grid for one day, enough to render the booking
/// grid and identical to what the validator sees.
pub async fn get_day(
    State(state): State<AppState>,
    Query(params): Query<DayParams>,
) -> AppResult<Json<Value>> {
    let date = schedule::parse_date(&params.date)?;
    let occupancy = availability::load_day(&state.db, date).await?;

    let slots: Vec<Value> = schedule::slot_grid()
        .map(|(slot, start_time, end_time)| {
            let mut by_court = serde_json::Map::new();
            for court in 1..=schedule::COURT_COUNT {
                if let Some(o) = occupancy.occupant(slot, court, None) {
                    by_court.insert(
                        court.to_string(),
                        json!({
                            "id": o.reservation_id,
                            "member_id": o.member_id,
                            "name": o.name,
                            "type": o.kind,
                            "slot": slot,
                            "court": court,
                        }),
                    );
                }
            }
            let available = occupancy.free_courts(slot);
            json!({
                "slotIndex": slot,
                "startTime": start_time,
                "endTime": end_time,
                "reservationsByCourt": by_court,
                "availableCourts": available,
                "isFull": available == 0,
            })
        })
        .collect();

    Ok(Json(json!({ "date": date, "slots": slots })))
}

/// Per-day occupied-cell counts over an inclusive range, for calendar
/// summaries. A pure aggregation over the same cell data as `get_day`.
pub async fn get_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> AppResult<Json<Value>> {
    let start = schedule::parse_date(&params.start)?;
    let end = schedule::parse_date(&params.end)?;
    if end < start {
        return Err(AppError::BadRequest("End date is before start date".into()));
    }
    let span = (end - start).num_days() + 1;
    if span > MAX_RANGE_DAYS {
        return Err(AppError::BadRequest(format!(
            "Range too large (max {MAX_RANGE_DAYS} days)"
        )));
    }

    let counts = availability::load_range_counts(&state.db, start, end).await?;

    let data: Vec<Value> = (0..span)
        .map(|i| {
            let date = start + Duration::days(i);
            json!({
                "date": date,
                "bookedSlots": counts.get(&date).copied().unwrap_or(0),
                "totalSlots": schedule::TOTAL_CELLS,
            })
        })
        .collect();

    Ok(Json(json!(data)))
}
