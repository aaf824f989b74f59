use axum::{
    extract::{Path, State},
    Extension, Json,
};
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOrganiser;
use crate::models::event_signup::valid_email;
use crate::models::membership::{AddMembershipRequest, Membership, UpdateMembershipRequest};
use crate::models::organiser::Organiser;
use crate::routes::events::fetch_event;
use crate::services::ability::{self, Action, Resource};
use crate::services::mailer;
use crate::AppState;

async fn fetch_membership(
    db: &sqlx::PgPool,
    event_id: Uuid,
    id: Uuid,
) -> AppResult<Membership> {
    let membership: Option<Membership> =
        sqlx::query_as("SELECT * FROM organiser_to_events WHERE id = $1 AND event_id = $2")
            .bind(id)
            .bind(event_id)
            .fetch_optional(db)
            .await?;
    membership.ok_or_else(|| AppError::NotFound("Membership not found".into()))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let level =
        ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Membership)
            .await?;
    let event = fetch_event(&state.db, event_id).await?;

    let rows: Vec<(Uuid, Uuid, bool, Option<String>, String, String)> = sqlx::query_as(
        "SELECT m.id, m.organiser_id, m.read_only, m.description, o.name, o.email
         FROM organiser_to_events m
         JOIN organisers o ON o.id = m.organiser_id
         WHERE m.event_id = $1
         ORDER BY m.created_at",
    )
    .bind(event_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "organisers": rows
            .iter()
            .map(|(id, organiser_id, read_only, description, name, email)| json!({
                "id": id,
                "organiserId": organiser_id,
                "readOnly": read_only,
                "description": description,
                "name": name,
                "email": email,
                "owner": *organiser_id == event.organiser_id,
            }))
            .collect::<Vec<_>>(),
        "controlTeam": level == ability::AccessLevel::ControlTeam,
    })))
}

fn random_password() -> String {
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect()
}

/// Adds an organiser to the event by email. An unknown email gets a fresh
/// account with a random password, emailed to them.
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<AddMembershipRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::Membership)
        .await?;
    let event = fetch_event(&state.db, event_id).await?;

    if body.email.is_empty() {
        return Err(AppError::BadRequest("Email cannot be blank".into()));
    }
    if !valid_email(&body.email) {
        return Err(AppError::Validation(vec![format!(
            "The email '{}' is invalid",
            body.email
        )]));
    }

    let existing: Option<Organiser> = sqlx::query_as("SELECT * FROM organisers WHERE email = $1")
        .bind(&body.email)
        .fetch_optional(&state.db)
        .await?;

    let organiser = match existing {
        Some(organiser) => organiser,
        None => {
            let password = random_password();
            let password_hash =
                bcrypt::hash(&password, 12).map_err(|e| AppError::Internal(e.to_string()))?;
            let organiser: Organiser = sqlx::query_as(
                "INSERT INTO organisers (id, email, password_hash, name)
                 VALUES ($1, $2, $3, 'Organiser')
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(&body.email)
            .bind(&password_hash)
            .fetch_one(&state.db)
            .await?;

            if let Some(mailer) = &state.mailer {
                let (subject, mail_body) = mailer::account_email(
                    &organiser.email,
                    &password,
                    &event.formatted_name(),
                    &state.config.base_url,
                );
                if let Err(e) = mailer.send(&organiser.email, &subject, &mail_body).await {
                    tracing::error!("account email to {} failed: {e}", organiser.email);
                }
            } else {
                tracing::warn!(
                    "mail transport not configured; {} was not sent credentials",
                    organiser.email
                );
            }
            organiser
        }
    };

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM organiser_to_events WHERE event_id = $1 AND organiser_id = $2)",
    )
    .bind(event_id)
    .bind(organiser.id)
    .fetch_one(&state.db)
    .await?;
    if already {
        return Err(AppError::Conflict("Organiser already assigned".into()));
    }

    let membership: Membership = sqlx::query_as(
        "INSERT INTO organiser_to_events (id, event_id, organiser_id, read_only, description)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(organiser.id)
    .bind(body.read_only.unwrap_or(false))
    .bind(&body.description)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "membership": membership,
        "notice": "Organiser added to event",
    })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateMembershipRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Membership)
        .await?;
    let event = fetch_event(&state.db, event_id).await?;
    let membership = fetch_membership(&state.db, event_id, id).await?;

    if membership.organiser_id == event.organiser_id {
        return Err(AppError::BadRequest(
            "Cannot update the event author's membership".into(),
        ));
    }
    if membership.organiser_id == actor.id {
        return Err(AppError::BadRequest(
            "Cannot update your own membership".into(),
        ));
    }

    let membership: Membership = sqlx::query_as(
        "UPDATE organiser_to_events SET read_only = $1, description = $2 WHERE id = $3
         RETURNING *",
    )
    .bind(body.read_only)
    .bind(&body.description)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "membership": membership,
        "notice": "Successfully updated",
    })))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Destroy, Resource::Membership)
        .await?;
    let event = fetch_event(&state.db, event_id).await?;
    let membership = fetch_membership(&state.db, event_id, id).await?;

    // The event author's membership can never be removed, and nobody may
    // remove themselves.
    if membership.organiser_id == event.organiser_id {
        return Err(AppError::BadRequest(
            "Cannot remove event author from event".into(),
        ));
    }
    if membership.organiser_id == actor.id {
        return Err(AppError::BadRequest(
            "Cannot remove yourself from event".into(),
        ));
    }

    sqlx::query("DELETE FROM organiser_to_events WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "notice": "Organiser successfully removed from event" })))
}
