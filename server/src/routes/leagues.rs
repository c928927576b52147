use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{is_unique_violation, AppError, AppResult, ReasonCode, Rejection};
use crate::middleware::auth::AuthMember;
use crate::models::{EnrollmentStatus, League, LeagueSeason, SeasonStatus};
use crate::services::enrollment;
use crate::AppState;

async fn get_league(db: &sqlx::PgPool, league_id: Uuid) -> AppResult<League> {
    sqlx::query_as("SELECT * FROM leagues WHERE id = $1")
        .bind(league_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("League not found".into()))
}

/// A league's current season is its most recently created one. The plain
/// read is used by the views; the locking variant serializes enroll and
/// withdraw decisions against each other.
async fn current_season(
    exec: impl sqlx::PgExecutor<'_>,
    league_id: Uuid,
) -> Result<Option<LeagueSeason>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM league_seasons WHERE league_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(league_id)
    .fetch_optional(exec)
    .await
}

async fn current_season_locked(
    exec: impl sqlx::PgExecutor<'_>,
    league_id: Uuid,
) -> Result<Option<LeagueSeason>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM league_seasons WHERE league_id = $1 ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(league_id)
    .fetch_optional(exec)
    .await
}

fn league_row(
    id: Uuid,
    name: String,
    coordinator_id: Option<Uuid>,
    first: Option<String>,
    last: Option<String>,
) -> Value {
    let coordinator = match (first, last) {
        (Some(first_name), Some(last_name)) => json!({
            "first_name": first_name,
            "last_name": last_name,
        }),
        _ => Value::Null,
    };
    json!({
        "id": id,
        "name": name,
        "coordinator_id": coordinator_id,
        "coordinator": coordinator,
    })
}

pub async fn list_leagues(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let rows: Vec<(Uuid, String, Option<Uuid>, Option<String>, Option<String>)> = sqlx::query_as(
        r#"SELECT l.id, l.name, l.coordinator_id, m.first_name, m.last_name
        FROM leagues l
        LEFT JOIN members m ON m.id = l.coordinator_id
        ORDER BY l.name"#,
    )
    .fetch_all(&state.db)
    .await?;

    let data: Vec<Value> = rows
        .into_iter()
        .map(|(id, name, cid, first, last)| league_row(id, name, cid, first, last))
        .collect();

    Ok(Json(json!({ "success": true, "data": data })))
}

/// Leagues the caller coordinates; the reserve form uses this to pick the
/// league identity for LEAGUE bookings.
pub async fn my_leagues(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;

    let rows: Vec<(Uuid, String, Option<Uuid>, Option<String>, Option<String>)> = sqlx::query_as(
        r#"SELECT l.id, l.name, l.coordinator_id, m.first_name, m.last_name
        FROM leagues l
        LEFT JOIN members m ON m.id = l.coordinator_id
        WHERE l.coordinator_id = $1
        ORDER BY l.name"#,
    )
    .bind(me.id)
    .fetch_all(&state.db)
    .await?;

    let data: Vec<Value> = rows
        .into_iter()
        .map(|(id, name, cid, first, last)| league_row(id, name, cid, first, last))
        .collect();

    Ok(Json(json!({ "success": true, "data": data })))
}

async fn enrollment_view(
    state: &AppState,
    league_id: Uuid,
    status: EnrollmentStatus,
) -> AppResult<Json<Value>> {
    let league = get_league(&state.db, league_id).await?;

    let Some(season) = current_season(&state.db, league.id).await? else {
        return Ok(Json(json!({ "success": true, "season": null, "data": [] })));
    };

    let rows: Vec<(Uuid, Uuid, Uuid, DateTime<Utc>, String, String, String)> = sqlx::query_as(
        r#"SELECT e.id, e.season_id, e.member_id, e.enrolled_at,
               m.first_name, m.last_name, m.email
        FROM league_enrollments e
        JOIN members m ON m.id = e.member_id
        WHERE e.season_id = $1 AND e.status = $2
        ORDER BY e.enrolled_at"#,
    )
    .bind(season.id)
    .bind(status)
    .fetch_all(&state.db)
    .await?;

    let data: Vec<Value> = rows
        .into_iter()
        .map(|(id, season_id, member_id, enrolled_at, first, last, email)| {
            json!({
                "id": id,
                "season_id": season_id,
                "member_id": member_id,
                "status": status,
                "enrolled_at": enrolled_at,
                "members": {
                    "id": member_id,
                    "first_name": first,
                    "last_name": last,
                    "email": email,
                },
            })
        })
        .collect();

    Ok(Json(json!({ "success": true, "season": season, "data": data })))
}

pub async fn get_roster(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    enrollment_view(&state, league_id, EnrollmentStatus::Active).await
}

pub async fn get_waitlist(
    State(state): State<AppState>,
    Path(league_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    enrollment_view(&state, league_id, EnrollmentStatus::Waitlisted).await
}

pub async fn enroll(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
    Path(league_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;
    let league = get_league(&state.db, league_id).await?;

    // The season row is locked for the whole decision so concurrent
    // enrollments cannot both take the last roster spot.
    let mut tx = state.db.begin().await?;

    let Some(season) = current_season_locked(&mut *tx, league.id).await? else {
        return Ok(Json(Rejection::new(ReasonCode::SeasonNotOpen).into_body()));
    };
    if season.status != SeasonStatus::EnrollmentOpen {
        return Ok(Json(Rejection::new(ReasonCode::SeasonNotOpen).into_body()));
    }

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM league_enrollments WHERE season_id = $1 AND member_id = $2 AND status <> 'WITHDRAWN'",
    )
    .bind(season.id)
    .bind(me.id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Ok(Json(Rejection::new(ReasonCode::AlreadyEnrolled).into_body()));
    }

    let active_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::bigint FROM league_enrollments WHERE season_id = $1 AND status = 'ACTIVE'",
    )
    .bind(season.id)
    .fetch_one(&mut *tx)
    .await?;

    let outcome = enrollment::enroll_outcome(active_count, season.max_players);

    let inserted = sqlx::query(
        "INSERT INTO league_enrollments (season_id, member_id, status) VALUES ($1, $2, $3)",
    )
    .bind(season.id)
    .bind(me.id)
    .bind(outcome)
    .execute(&mut *tx)
    .await;
    if let Err(e) = inserted {
        if is_unique_violation(&e) {
            return Ok(Json(Rejection::new(ReasonCode::AlreadyEnrolled).into_body()));
        }
        return Err(e.into());
    }

    let message = if outcome == EnrollmentStatus::Active {
        "Enrolled".to_string()
    } else {
        let position: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM league_enrollments WHERE season_id = $1 AND status = 'WAITLISTED'",
        )
        .bind(season.id)
        .fetch_one(&mut *tx)
        .await?;
        format!("Added to waitlist (position {position})")
    };

    tx.commit().await?;

    tracing::info!(member = %me.id, league = %league.name, season = %season.id, ?outcome, "league enrollment");

    Ok(Json(json!({ "success": true, "message": message })))
}

pub async fn withdraw(
    State(state): State<AppState>,
    member: axum::Extension<AuthMember>,
    Path(league_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let me = &member.0 .0;
    let league = get_league(&state.db, league_id).await?;

    let mut tx = state.db.begin().await?;

    let Some(season) = current_season_locked(&mut *tx, league.id).await? else {
        return Ok(Json(Rejection::new(ReasonCode::NotEnrolled).into_body()));
    };

    let enrollment_row: Option<(Uuid, EnrollmentStatus)> = sqlx::query_as(
        "SELECT id, status FROM league_enrollments WHERE season_id = $1 AND member_id = $2 AND status <> 'WITHDRAWN'",
    )
    .bind(season.id)
    .bind(me.id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some((enrollment_id, status)) = enrollment_row else {
        return Ok(Json(Rejection::new(ReasonCode::NotEnrolled).into_body()));
    };

    sqlx::query("UPDATE league_enrollments SET status = 'WITHDRAWN' WHERE id = $1")
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await?;

    // A roster vacancy promotes the earliest waitlisted member, atomically
    // with the withdrawal.
    if status == EnrollmentStatus::Active {
        let waitlist: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, enrolled_at FROM league_enrollments WHERE season_id = $1 AND status = 'WAITLISTED'",
        )
        .bind(season.id)
        .fetch_all(&mut *tx)
        .await?;
        if let Some(promoted) = enrollment::earliest_waitlisted(&waitlist) {
            sqlx::query("UPDATE league_enrollments SET status = 'ACTIVE' WHERE id = $1")
                .bind(promoted)
                .execute(&mut *tx)
                .await?;
            tracing::info!(season = %season.id, enrollment = %promoted, "waitlist promotion");
        }
    }

    tx.commit().await?;

    Ok(Json(json!({ "success": true, "message": "Withdrawn" })))
}
