use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Member;
use crate::AppState;

/// Token payload issued by the identity provider. Only the member id is
/// trusted; role and status are re-read from the store on every request so
/// revocations and status changes take effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // member_id
    pub exp: i64,
    pub iat: i64,
}

/// The authenticated member's fresh row, set in request extensions.
#[derive(Debug, Clone)]
pub struct AuthMember(pub Member);

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

/// Middleware: requires a valid JWT for a known member. Sets AuthMember in
/// extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token =
        extract_bearer(&req).ok_or_else(|| AppError::Unauthorized("No token provided".into()))?;

    let claims = verify_token(&token, &state.config.jwt.secret)?;

    let member_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token subject".into()))?;

    let member: Option<Member> = sqlx::query_as("SELECT * FROM members WHERE id = $1")
        .bind(member_id)
        .fetch_optional(&state.db)
        .await?;

    let member = member.ok_or_else(|| AppError::Unauthorized("Unknown member".into()))?;

    req.extensions_mut().insert(AuthMember(member));

    Ok(next.run(req).await)
}
