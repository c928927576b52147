use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationType {
    Regular,
    League,
    Club,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: ReservationType,
    pub status: ReservationStatus,
    pub league_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// POST /reservations body. REGULAR submissions carry `slot`/`court`;
/// LEAGUE/CLUB submissions carry `slots`/`courts` (cells are their
/// cross-product) plus an event `name`.
#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    #[serde(rename = "type")]
    pub kind: ReservationType,
    pub date: String,
    pub slot: Option<i16>,
    pub court: Option<i16>,
    pub slots: Option<Vec<i16>>,
    pub courts: Option<Vec<i16>>,
    #[serde(default)]
    pub players: Vec<Uuid>,
    pub name: Option<String>,
    pub league_id: Option<Uuid>,
    #[serde(rename = "repeatWeekly", default)]
    pub repeat_weekly: bool,
    #[serde(rename = "repeatWeeks")]
    pub repeat_weeks: Option<i64>,
}

/// PATCH /reservations/:id body. Edits are REGULAR-only, so the cell is
/// always a single slot/court pair.
#[derive(Debug, Deserialize)]
pub struct EditReservationRequest {
    pub date: String,
    pub slot: i16,
    pub court: i16,
    #[serde(default)]
    pub players: Vec<Uuid>,
}
