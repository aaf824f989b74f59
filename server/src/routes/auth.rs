use axum::{extract::State, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_tokens, verify_token};
use crate::models::event_signup::valid_email;
use crate::models::organiser::*;
use crate::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    let mut messages = Vec::new();
    if !valid_email(&body.email) {
        messages.push(format!("The email '{}' is invalid", body.email));
    }
    if body.name.trim().is_empty() {
        messages.push("Name can't be blank".to_string());
    }
    if body.password.len() < 6 {
        messages.push("Password must be at least 6 characters".to_string());
    }
    if !messages.is_empty() {
        return Err(AppError::Validation(messages));
    }

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM organisers WHERE email = $1)")
            .bind(&body.email)
            .fetch_one(&state.db)
            .await?;
    if exists {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash =
        bcrypt::hash(&body.password, 12).map_err(|e| AppError::Internal(e.to_string()))?;

    let organiser: Organiser = sqlx::query_as(
        "INSERT INTO organisers (id, email, password_hash, name) VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&body.email)
    .bind(&password_hash)
    .bind(body.name.trim())
    .fetch_one(&state.db)
    .await?;

    let (token, refresh_token) = generate_tokens(
        organiser.id,
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": token,
        "refreshToken": refresh_token,
        "organiser": OrganiserPublic::from(&organiser),
    })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let organiser: Organiser = sqlx::query_as("SELECT * FROM organisers WHERE email = $1")
        .bind(&body.email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    let valid = bcrypt::verify(&body.password, &organiser.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !valid {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    sqlx::query("UPDATE organisers SET last_login_at = NOW() WHERE id = $1")
        .bind(organiser.id)
        .execute(&state.db)
        .await?;

    let (token, refresh_token) = generate_tokens(
        organiser.id,
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": token,
        "refreshToken": refresh_token,
        "organiser": OrganiserPublic::from(&organiser),
    })))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let token = body["refreshToken"]
        .as_str()
        .ok_or_else(|| AppError::BadRequest("refreshToken required".into()))?;

    let claims = verify_token(token, &state.config.jwt.secret)?;
    if claims.token_type.as_deref() != Some("refresh") {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    let organiser_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    let (new_token, new_refresh) = generate_tokens(
        organiser_id,
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(Json(json!({
        "token": new_token,
        "refreshToken": new_refresh,
    })))
}
