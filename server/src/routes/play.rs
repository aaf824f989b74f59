use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{extract_embed_src, Event};
use crate::models::event_signup::EventSignup;
use crate::services::cast_list::{self, CastListVariant};
use crate::AppState;

pub(crate) async fn fetch_signup_by_uuid(
    db: &sqlx::PgPool,
    uuid: Uuid,
) -> AppResult<EventSignup> {
    let signup: Option<EventSignup> =
        sqlx::query_as("SELECT * FROM event_signups WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(db)
            .await?;
    signup.ok_or_else(|| AppError::NotFound("Player not found".into()))
}

/// Unauthenticated player page, addressed by signup uuid: event details,
/// the player's team and role, the organiser contact and the player-variant
/// cast list.
pub async fn show(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let signup = fetch_signup_by_uuid(&state.db, uuid).await?;

    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(signup.event_id)
        .fetch_one(&state.db)
        .await?;

    let team_name: Option<String> = match signup.team_id {
        Some(team_id) => {
            sqlx::query_scalar("SELECT name FROM teams WHERE id = $1")
                .bind(team_id)
                .fetch_optional(&state.db)
                .await?
        }
        None => None,
    };
    let role_name: Option<String> = match signup.role_id {
        Some(role_id) => {
            sqlx::query_scalar("SELECT name FROM roles WHERE id = $1")
                .bind(role_id)
                .fetch_optional(&state.db)
                .await?
        }
        None => None,
    };

    let organiser_email: String =
        sqlx::query_scalar("SELECT email FROM organisers WHERE id = $1")
            .bind(event.organiser_id)
            .fetch_one(&state.db)
            .await?;

    let cast = cast_list::load(&state.db, &event).await?;
    let days_until = (event.date.date_naive() - Utc::now().date_naive()).num_days();

    Ok(Json(json!({
        "player": {
            "name": signup.name,
            "teamName": team_name,
            "roleName": role_name,
        },
        "event": {
            "name": event.name,
            "description": event.description,
            "additionalInfo": event.additional_info,
            "date": event.date,
            "location": event.location,
            "mapsUrl": event.maps_embed.as_deref().and_then(extract_embed_src),
            "daysUntil": days_until,
        },
        "organiserEmail": organiser_email,
        "castList": cast,
    })))
}

/// Player-variant cast list PDF, addressed by signup uuid.
pub async fn cast_list_pdf(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let signup = fetch_signup_by_uuid(&state.db, uuid).await?;

    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(signup.event_id)
        .fetch_one(&state.db)
        .await?;

    let cast = cast_list::load(&state.db, &event).await?;
    let html = cast_list::render_html(&cast, CastListVariant::Player);
    let pdf = state.renderer.render_html(&html).await?;

    let disposition = format!(
        "attachment; filename=\"{} Cast List.pdf\"",
        event.formatted_name()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
