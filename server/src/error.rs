use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests".to_string(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// True when a write bounced off a unique index (Postgres 23505), i.e. a
/// conflicting booking or enrollment committed between our read and write.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

/// Machine-readable rejection taxonomy. Rejections are returned to the
/// caller as structured results with `success: false`, never as HTTP errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    OutOfWindow,
    CellOccupied,
    DuplicateDailyBooking,
    IneligibleRole,
    InactiveParticipant,
    SeasonNotOpen,
    AlreadyEnrolled,
    NotEnrolled,
    UnauthorizedAction,
}

impl ReasonCode {
    pub fn message(self) -> &'static str {
        match self {
            ReasonCode::OutOfWindow => "That date is outside your booking window.",
            ReasonCode::CellOccupied => "That court and time slot is already booked.",
            ReasonCode::DuplicateDailyBooking => {
                "You already have a court reservation on that day."
            }
            ReasonCode::IneligibleRole => "Your role cannot make this kind of booking.",
            ReasonCode::InactiveParticipant => "All listed players must be active members.",
            ReasonCode::SeasonNotOpen => "This season is not open for enrollment.",
            ReasonCode::AlreadyEnrolled => "You are already enrolled in this season.",
            ReasonCode::NotEnrolled => "You are not enrolled in this season.",
            ReasonCode::UnauthorizedAction => "You cannot modify this reservation.",
        }
    }
}

/// A domain rejection: reason code plus the sentence shown to the caller.
/// Some checks (the booking window) substitute a more specific sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: ReasonCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: ReasonCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
        }
    }

    pub fn with_message(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ReasonCode> for Rejection {
    fn from(code: ReasonCode) -> Self {
        Rejection::new(code)
    }
}

impl Rejection {
    /// Body for a structured `success: false` response.
    pub fn into_body(self) -> serde_json::Value {
        json!({
            "success": false,
            "reasonCode": self.code,
            "message": self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_serialize_screaming_snake() {
        let cases = [
            (ReasonCode::OutOfWindow, "\"OUT_OF_WINDOW\""),
            (ReasonCode::CellOccupied, "\"CELL_OCCUPIED\""),
            (
                ReasonCode::DuplicateDailyBooking,
                "\"DUPLICATE_DAILY_BOOKING\"",
            ),
            (ReasonCode::IneligibleRole, "\"INELIGIBLE_ROLE\""),
            (ReasonCode::InactiveParticipant, "\"INACTIVE_PARTICIPANT\""),
            (ReasonCode::SeasonNotOpen, "\"SEASON_NOT_OPEN\""),
            (ReasonCode::AlreadyEnrolled, "\"ALREADY_ENROLLED\""),
            (ReasonCode::NotEnrolled, "\"NOT_ENROLLED\""),
            (ReasonCode::UnauthorizedAction, "\"UNAUTHORIZED_ACTION\""),
        ];
        for (code, expected) in cases {
            assert_eq!(serde_json::to_string(&code).unwrap(), expected);
        }
    }

    #[test]
    fn rejection_defaults_to_canonical_message() {
        let rej = Rejection::new(ReasonCode::CellOccupied);
        assert_eq!(rej.message, ReasonCode::CellOccupied.message());

        let custom = Rejection::with_message(ReasonCode::OutOfWindow, "opens later");
        assert_eq!(custom.message, "opens later");
        assert_eq!(custom.code, ReasonCode::OutOfWindow);
    }
}
