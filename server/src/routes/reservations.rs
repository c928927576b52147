use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{is_unique_violation, AppError, AppResult, ReasonCode, Rejection};
use crate::middleware::auth::AuthMember;
use crate::models::{
    CreateReservationRequest, EditReservationRequest, Member, Reservation, ReservationStatus,
    ReservationType,
};
use crate::services::validator::{self, BookingCheck};
use crate::services::{availability, schedule};
use crate::AppState;

/// Resolve the listed player ids to member rows. Ids that do not resolve are
/// reported with the same reason as inactive ones; the caller cannot book
/// with a player the club does not recognize.
async fn load_players(
    db: &sqlx::PgPool,
    player_ids: &[Uuid],
) -> AppResult<Result<Vec<Member>, Rejection>> {
    if player_ids.is_empty() {
        return Ok(Ok(Vec::new()));
    }
    let rows: Vec<Member> = sqlx::query_as("SELECT * FROM members WHERE id = ANY($1)")
        .bind(player_ids)
        .fetch_all(db)
        .await?;
    if rows.len() != player_ids.len() {
        return Ok(Err(Rejection::new(ReasonCode::InactiveParticipant)));
    }
    // Preserve the submitted ordering.
    let by_id: HashMap<Uuid, Member> = rows.into_iter().map(|m| (m.id, m)).collect();
    Ok(Ok(player_ids
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect()))
}

/// One submission's fixed shape, shared by every date in the batch.
struct BookingBatch<'a> {
    owner: &'a Member,
    players: &'a [Member],
    kind: ReservationType,
    cells: &'a [(i16, i16)],
    name: &'a str,
    league_id: Option<Uuid>,
    league_assigned: bool,
    group_id: Option<Uuid>,
    now: DateTime<Utc>,
}

/// Validate and write one date of a batch inside its own transaction.
/// Occupancy and the daily-booking flag are read inside the transaction so
/// the decision and the write see the same state; the partial unique index
/// on active cells catches whatever slips between concurrent transactions.
async fn write_date(
    state: &AppState,
    batch: &BookingBatch<'_>,
    date: NaiveDate,
) -> AppResult<Result<Uuid, Rejection>> {
    let mut tx = state.db.begin().await?;

    let occupancy = availability::load_day(&mut *tx, date).await?;
    let owns_regular_that_day = if batch.kind == ReservationType::Regular {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE member_id = $1 AND date = $2 AND type = 'REGULAR' AND status = 'ACTIVE'
            )"#,
        )
        .bind(batch.owner.id)
        .bind(date)
        .fetch_one(&mut *tx)
        .await?
    } else {
        false
    };

    let check = BookingCheck {
        requester: batch.owner,
        players: batch.players,
        kind: batch.kind,
        date,
        now: batch.now,
        cells: batch.cells,
        occupancy: &occupancy,
        owns_regular_that_day,
        league_assigned: batch.league_assigned,
        exclude_reservation: None,
    };
    if let Err(rej) = validator::validate(&check) {
        return Ok(Err(rej));
    }

    let reservation_id: Uuid = sqlx::query_scalar(
        r#"INSERT INTO reservations (member_id, date, name, type, status, league_id, group_id)
        VALUES ($1, $2, $3, $4, 'ACTIVE', $5, $6)
        RETURNING id"#,
    )
    .bind(batch.owner.id)
    .bind(date)
    .bind(batch.name)
    .bind(batch.kind)
    .bind(batch.league_id)
    .bind(batch.group_id)
    .fetch_one(&mut *tx)
    .await?;

    for &(slot, court) in batch.cells {
        let inserted = sqlx::query(
            "INSERT INTO reservation_cells (reservation_id, date, slot, court, active) VALUES ($1, $2, $3, $4, TRUE)",
        )
        .bind(reservation_id)
        .bind(date)
        .bind(slot)
        .bind(court)
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                // Lost the race for this cell; same rejection as an
                // early-discovered conflict.
                return Ok(Err(Rejection::with_message(
                    ReasonCode::CellOccupied,
                    format!("Slot {slot}, court {court} is already booked."),
                )));
            }
            return Err(e.into());
        }
    }

    for (position, player) in batch.players.iter().enumerate() {
        sqlx::query(
            "INSERT INTO reservation_players (reservation_id, member_id, position) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(reservation_id)
        .bind(player.id)
        .bind(position as i16)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Ok(reservation_id))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
    Json(body): Json<CreateReservationRequest>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;
    let now = Utc::now();

    let start_date = schedule::parse_date(&body.date)?;
    let cells = validator::normalize_cells(&body)?;
    let dates = validator::expand_dates(start_date, body.repeat_weekly, body.repeat_weeks)?;

    // Event bookings carry an event name; regular bookings are labelled
    // with the owner's name.
    let name = match body.kind {
        ReservationType::Regular => me.full_name(),
        ReservationType::League | ReservationType::Club => {
            let n = body.name.as_deref().unwrap_or("").trim().to_string();
            if n.is_empty() {
                return Err(AppError::BadRequest("Event name required".into()));
            }
            n
        }
    };

    let league_id = match body.kind {
        ReservationType::League => Some(
            body.league_id
                .ok_or_else(|| AppError::BadRequest("League is required".into()))?,
        ),
        _ => None,
    };
    let league_assigned = match league_id {
        Some(id) => sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM leagues WHERE id = $1 AND coordinator_id = $2)",
        )
        .bind(id)
        .bind(me.id)
        .fetch_one(&state.db)
        .await?,
        None => true,
    };

    // Regular bookings always include the owner as a player.
    let mut player_ids = body.players.clone();
    if body.kind == ReservationType::Regular && !player_ids.contains(&me.id) {
        player_ids.insert(0, me.id);
    }
    player_ids = dedup_preserving_order(player_ids);
    let players = match load_players(&state.db, &player_ids).await? {
        Ok(players) => players,
        Err(rej) => {
            let mut resp = rej.into_body();
            resp["count"] = json!(0);
            return Ok(Json(resp));
        }
    };

    // One group id links everything written for this submission.
    let group_id = if cells.len() > 1 || dates.len() > 1 {
        Some(Uuid::new_v4())
    } else {
        None
    };

    let batch = BookingBatch {
        owner: me,
        players: &players,
        kind: body.kind,
        cells: &cells,
        name: &name,
        league_id,
        league_assigned,
        group_id,
        now,
    };

    let mut created_ids: Vec<Uuid> = Vec::with_capacity(dates.len());
    let mut first_failure: Option<Rejection> = None;

    // Dates are written sequentially and independently: a conflict on one
    // date skips that date only, with no rollback of earlier dates.
    for &date in &dates {
        match write_date(&state, &batch, date).await? {
            Ok(reservation_id) => created_ids.push(reservation_id),
            Err(rej) => {
                if first_failure.is_none() {
                    first_failure = Some(rej);
                }
            }
        }
    }
    let created = created_ids.len();

    if created == 0 {
        let rej = first_failure
            .unwrap_or_else(|| Rejection::with_message(ReasonCode::CellOccupied, "No dates could be booked."));
        let mut resp = rej.into_body();
        resp["count"] = json!(0);
        return Ok(Json(resp));
    }

    tracing::info!(
        member = %me.id,
        kind = ?body.kind,
        dates = dates.len(),
        created,
        "reservation batch written"
    );

    let message = if created == dates.len() {
        if created > 1 {
            format!("{created} reservations created")
        } else {
            "Reservation created".to_string()
        }
    } else {
        format!("{created} of {} reservations created", dates.len())
    };

    let mut resp = json!({
        "success": true,
        "count": created,
        "reservationIds": created_ids,
        "message": message,
    });
    if let Some(group) = group_id {
        resp["groupId"] = json!(group);
    }
    if let Some(rej) = first_failure {
        resp["reasonCode"] = json!(rej.code);
    }
    Ok(Json(resp))
}

async fn load_player_ids(
    exec: impl sqlx::PgExecutor<'_>,
    reservation_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT member_id FROM reservation_players WHERE reservation_id = $1 ORDER BY position",
    )
    .bind(reservation_id)
    .fetch_all(exec)
    .await
}

pub async fn edit_reservation(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
    Path(id): Path<Uuid>,
    Json(body): Json<EditReservationRequest>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;
    let now = Utc::now();

    let date = schedule::parse_date(&body.date)?;
    if !schedule::is_valid_slot(body.slot) {
        return Err(AppError::BadRequest(format!("Invalid slot: {}", body.slot)));
    }
    if !schedule::is_valid_court(body.court) {
        return Err(AppError::BadRequest(format!(
            "Invalid court: {}",
            body.court
        )));
    }

    let reservation: Reservation = sqlx::query_as("SELECT * FROM reservations WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation not found".into()))?;

    if reservation.status != ReservationStatus::Active {
        return Err(AppError::NotFound("Reservation is no longer active".into()));
    }

    let current_players = load_player_ids(&state.db, id).await?;
    if !validator::can_act(me, reservation.member_id, reservation.kind, &current_players) {
        return Ok(Json(Rejection::new(ReasonCode::UnauthorizedAction).into_body()));
    }
    if reservation.kind != ReservationType::Regular {
        return Ok(Json(
            Rejection::with_message(
                ReasonCode::UnauthorizedAction,
                "Only regular reservations can be edited.",
            )
            .into_body(),
        ));
    }

    // The edit is judged under the owner's constraints (window, one booking
    // per day), even when an admin performs it.
    let owner: Member = if me.id == reservation.member_id {
        me.clone()
    } else {
        sqlx::query_as("SELECT * FROM members WHERE id = $1")
            .bind(reservation.member_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".into()))?
    };

    let mut player_ids = body.players.clone();
    if !player_ids.contains(&owner.id) {
        player_ids.insert(0, owner.id);
    }
    player_ids = dedup_preserving_order(player_ids);
    let players = match load_players(&state.db, &player_ids).await? {
        Ok(players) => players,
        Err(rej) => return Ok(Json(rej.into_body())),
    };

    let cells = [(body.slot, body.court)];

    let mut tx = state.db.begin().await?;

    let occupancy = availability::load_day(&mut *tx, date).await?;
    let owns_regular_that_day = sqlx::query_scalar::<_, bool>(
        r#"SELECT EXISTS(
            SELECT 1 FROM reservations
            WHERE member_id = $1 AND date = $2 AND type = 'REGULAR'
              AND status = 'ACTIVE' AND id <> $3
        )"#,
    )
    .bind(owner.id)
    .bind(date)
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let check = BookingCheck {
        requester: &owner,
        players: &players,
        kind: ReservationType::Regular,
        date,
        now,
        cells: &cells,
        occupancy: &occupancy,
        owns_regular_that_day,
        league_assigned: true,
        exclude_reservation: Some(id),
    };
    if let Err(rej) = validator::validate(&check) {
        return Ok(Json(rej.into_body()));
    }

    sqlx::query("UPDATE reservations SET date = $1 WHERE id = $2")
        .bind(date)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM reservation_cells WHERE reservation_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let inserted = sqlx::query(
        "INSERT INTO reservation_cells (reservation_id, date, slot, court, active) VALUES ($1, $2, $3, $4, TRUE)",
    )
    .bind(id)
    .bind(date)
    .bind(body.slot)
    .bind(body.court)
    .execute(&mut *tx)
    .await;
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Ok(Json(Rejection::new(ReasonCode::CellOccupied).into_body()));
        }
        return Err(e.into());
    }

    sqlx::query("DELETE FROM reservation_players WHERE reservation_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    for (position, player) in players.iter().enumerate() {
        sqlx::query(
            "INSERT INTO reservation_players (reservation_id, member_id, position) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(player.id)
        .bind(position as i16)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;

    let reservation: Reservation = sqlx::query_as("SELECT * FROM reservations WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation not found".into()))?;

    let player_ids = load_player_ids(&state.db, id).await?;
    if !validator::can_act(me, reservation.member_id, reservation.kind, &player_ids) {
        return Ok(Json(Rejection::new(ReasonCode::UnauthorizedAction).into_body()));
    }

    // Cancelling twice is a no-op, not an error.
    if reservation.status == ReservationStatus::Cancelled {
        return Ok(Json(json!({ "success": true })));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE reservations SET status = 'CANCELLED' WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE reservation_cells SET active = FALSE WHERE reservation_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(member = %me.id, reservation = %id, "reservation cancelled");

    Ok(Json(json!({ "success": true })))
}

/// The caller's future ACTIVE reservations, as owner or listed player.
pub async fn upcoming_reservations(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;
    let today = schedule::club_today(Utc::now());

    let rows: Vec<Reservation> = sqlx::query_as(
        r#"SELECT r.* FROM reservations r
        WHERE r.status = 'ACTIVE' AND r.date >= $1
          AND (r.member_id = $2 OR EXISTS (
              SELECT 1 FROM reservation_players rp
              WHERE rp.reservation_id = r.id AND rp.member_id = $2
          ))
        ORDER BY r.date, r.created_at"#,
    )
    .bind(today)
    .bind(me.id)
    .fetch_all(&state.db)
    .await?;

    if rows.is_empty() {
        return Ok(Json(json!({ "data": [] })));
    }

    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let cell_rows: Vec<(Uuid, i16, i16)> = sqlx::query_as(
        r#"SELECT reservation_id, slot, court FROM reservation_cells
        WHERE reservation_id = ANY($1) AND active
        ORDER BY slot, court"#,
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let player_rows: Vec<(Uuid, Uuid, String, String)> = sqlx::query_as(
        r#"SELECT rp.reservation_id, m.id, m.first_name, m.last_name
        FROM reservation_players rp
        JOIN members m ON m.id = rp.member_id
        WHERE rp.reservation_id = ANY($1)
        ORDER BY rp.position"#,
    )
    .bind(&ids)
    .fetch_all(&state.db)
    .await?;

    let mut cells_by_res: HashMap<Uuid, Vec<(i16, i16)>> = HashMap::new();
    for (rid, slot, court) in cell_rows {
        cells_by_res.entry(rid).or_default().push((slot, court));
    }
    let mut players_by_res: HashMap<Uuid, Vec<(Uuid, String)>> = HashMap::new();
    for (rid, pid, first, last) in player_rows {
        players_by_res
            .entry(rid)
            .or_default()
            .push((pid, format!("{first} {last}")));
    }

    let data: Vec<Value> = rows
        .iter()
        .map(|r| {
            let cells = cells_by_res.get(&r.id).cloned().unwrap_or_default();
            let mut slots: Vec<i16> = cells.iter().map(|&(s, _)| s).collect();
            slots.sort_unstable();
            slots.dedup();
            let mut courts: Vec<i16> = cells.iter().map(|&(_, c)| c).collect();
            courts.sort_unstable();
            courts.dedup();
            let players = players_by_res.get(&r.id).cloned().unwrap_or_default();
            let player_ids: Vec<Uuid> = players.iter().map(|(id, _)| *id).collect();
            let player_names: Vec<&String> = players.iter().map(|(_, name)| name).collect();

            json!({
                "id": r.id,
                "member_id": r.member_id,
                "date": r.date,
                "name": r.name,
                "type": r.kind,
                "status": r.status,
                "slot": slots.first().copied().unwrap_or(0),
                "court": courts.first().copied().unwrap_or(0),
                "slots": slots,
                "courts": courts,
                "players": player_names,
                "player_ids": player_ids,
                "league_id": r.league_id,
                "group_id": r.group_id,
                "created_at": r.created_at,
                "can_manage": validator::can_act(me, r.member_id, r.kind, &player_ids),
            })
        })
        .collect();

    Ok(Json(json!({ "data": data })))
}

fn dedup_preserving_order(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
