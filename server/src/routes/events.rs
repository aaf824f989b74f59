use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOrganiser;
use crate::models::attachment::AttachmentKind;
use crate::models::event::*;
use crate::routes::read_multipart;
use crate::services::ability::{self, Action, Resource};
use crate::services::{attachments, convert, mailer};
use crate::AppState;

pub(crate) async fn fetch_event(db: &sqlx::PgPool, id: Uuid) -> AppResult<Event> {
    let event: Option<Event> = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    event.ok_or_else(|| AppError::NotFound("Event not found".into()))
}

fn event_json(event: &Event) -> Value {
    json!({
        "id": event.id,
        "name": event.name,
        "description": event.description,
        "additionalInfo": event.additional_info,
        "date": event.date,
        "location": event.location,
        "mapsEmbed": event.maps_embed,
        "mapsUrl": event.maps_embed.as_deref().and_then(extract_embed_src),
        "draft": event.draft,
    })
}

/// Events the organiser owns, organises, or monitors as control team, split
/// into upcoming and previous by date.
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
) -> AppResult<Json<Value>> {
    let owned: Vec<Event> = sqlx::query_as(
        "SELECT * FROM events WHERE organiser_id = $1 ORDER BY date",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;

    let organising: Vec<Event> = sqlx::query_as(
        "SELECT e.* FROM events e
         JOIN organiser_to_events m ON m.event_id = e.id
         WHERE m.organiser_id = $1 AND m.read_only = false AND e.organiser_id <> $1
         ORDER BY e.date",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;

    let control: Vec<Event> = sqlx::query_as(
        "SELECT e.* FROM events e
         JOIN organiser_to_events m ON m.event_id = e.id
         WHERE m.organiser_id = $1 AND m.read_only = true
         ORDER BY e.date",
    )
    .bind(actor.id)
    .fetch_all(&state.db)
    .await?;

    let now = Utc::now();
    let mut seen: Vec<Uuid> = Vec::new();
    let mut all: Vec<&Event> = Vec::new();
    for event in owned.iter().chain(&organising).chain(&control) {
        if !seen.contains(&event.id) {
            seen.push(event.id);
            all.push(event);
        }
    }
    all.sort_by_key(|e| e.date);

    let upcoming: Vec<Value> = all
        .iter()
        .filter(|e| e.date >= now)
        .map(|e| event_json(e))
        .collect();
    let mut previous: Vec<Value> = all
        .iter()
        .filter(|e| e.date < now)
        .map(|e| event_json(e))
        .collect();
    previous.reverse();

    Ok(Json(json!({
        "myEvents": owned.iter().map(event_json).collect::<Vec<_>>(),
        "organiserEvents": organising.iter().map(event_json).collect::<Vec<_>>(),
        "controlTeamEvents": control.iter().map(event_json).collect::<Vec<_>>(),
        "upcoming": upcoming,
        "previous": previous,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Json(body): Json<CreateEventRequest>,
) -> AppResult<Json<Value>> {
    let messages = validate_event_fields(&body.name, &body.location);
    if !messages.is_empty() {
        return Err(AppError::Validation(messages));
    }

    let maps_embed = match &body.maps_embed {
        Some(embed) if !embed.is_empty() => {
            match sanitize_embed(embed, &state.config.maps.allowed_embed_prefixes) {
                Some(clean) => Some(clean.to_string()),
                None => {
                    return Err(AppError::Validation(vec![
                        "Invalid input for the embedded map iframe".to_string(),
                    ]))
                }
            }
        }
        _ => None,
    };

    let event_id = Uuid::new_v4();
    let mut tx = state.db.begin().await?;

    let event: Event = sqlx::query_as(
        "INSERT INTO events (id, organiser_id, name, description, additional_info, date, location, maps_embed, draft)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING *",
    )
    .bind(event_id)
    .bind(actor.id)
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(&body.additional_info)
    .bind(body.date)
    .bind(body.location.trim())
    .bind(&maps_embed)
    .bind(body.draft.unwrap_or(false))
    .fetch_one(&mut *tx)
    .await?;

    // The owner's membership row; never removable.
    sqlx::query(
        "INSERT INTO organiser_to_events (id, event_id, organiser_id, read_only) VALUES ($1, $2, $3, false)",
    )
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(actor.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(json!({
        "event": event_json(&event),
        "notice": if event.draft { "Event was successfully saved as draft." } else { "Event was successfully created." },
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let level = ability::require(&state.db, actor.id, id, Action::Read, Resource::Event).await?;
    let event = fetch_event(&state.db, id).await?;

    let rulebook = attachments::find(&state.db, AttachmentKind::EventRulebook, id).await?;
    let documents = attachments::list(&state.db, AttachmentKind::EventDocument, id).await?;

    Ok(Json(json!({
        "event": event_json(&event),
        "controlTeam": level == ability::AccessLevel::ControlTeam,
        "rulebook": rulebook,
        "additionalDocuments": documents,
    })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEventRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;
    let event = fetch_event(&state.db, id).await?;

    let name = body.name.unwrap_or_else(|| event.name.clone());
    let location = body.location.unwrap_or_else(|| event.location.clone());
    let messages = validate_event_fields(&name, &location);
    if !messages.is_empty() {
        return Err(AppError::Validation(messages));
    }

    let maps_embed = match body.maps_embed {
        Some(embed) if embed.is_empty() => None,
        Some(embed) => {
            if sanitize_embed(&embed, &state.config.maps.allowed_embed_prefixes).is_none() {
                return Err(AppError::Validation(vec![
                    "Invalid input for the embedded map iframe".to_string(),
                ]));
            }
            Some(embed)
        }
        None => event.maps_embed.clone(),
    };

    let updated: Event = sqlx::query_as(
        "UPDATE events
         SET name = $1, description = $2, additional_info = $3, date = $4, location = $5,
             maps_embed = $6, updated_at = NOW()
         WHERE id = $7
         RETURNING *",
    )
    .bind(name.trim())
    .bind(body.description.or(event.description))
    .bind(body.additional_info.or(event.additional_info))
    .bind(body.date.unwrap_or(event.date))
    .bind(location.trim())
    .bind(&maps_embed)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "event": event_json(&updated),
        "notice": "Event was successfully updated.",
    })))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Destroy, Resource::Event).await?;

    // Attachment rows are keyed by owner id, so collect every owner in the
    // event's tree before the cascade delete removes them.
    let team_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM teams WHERE event_id = $1")
        .bind(id)
        .fetch_all(&state.db)
        .await?;
    let role_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE event_id = $1")
        .bind(id)
        .fetch_all(&state.db)
        .await?;

    for owner in std::iter::once(id).chain(team_ids).chain(role_ids) {
        attachments::remove_all_for_owner(&state.db, &state.storage, owner).await?;
    }

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "notice": "Event was successfully deleted." })))
}

pub async fn publish(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;

    let event: Event = sqlx::query_as(
        "UPDATE events SET draft = false, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "event": event_json(&event),
        "notice": "Event was successfully published.",
    })))
}

/// Converts the rulebook and every additional document from Word to PDF.
pub async fn convert_documents(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;
    fetch_event(&state.db, id).await?;

    let mut converted = 0usize;
    if let Some(rulebook) = attachments::find(&state.db, AttachmentKind::EventRulebook, id).await? {
        if convert::convert_attachment(&state.db, &state.storage, &state.converter, &rulebook)
            .await?
        {
            converted += 1;
        }
    }
    for doc in attachments::list(&state.db, AttachmentKind::EventDocument, id).await? {
        if convert::convert_attachment(&state.db, &state.storage, &state.converter, &doc).await? {
            converted += 1;
        }
    }

    Ok(Json(json!({
        "converted": converted,
        "notice": "The .docx files have been successfully converted to .pdf.",
    })))
}

#[derive(Debug, serde::Deserialize)]
pub struct EmailRequest {
    #[serde(rename = "emailNote")]
    pub email_note: Option<String>,
}

pub async fn email(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Create, Resource::EmailDispatch).await?;
    let event = fetch_event(&state.db, id).await?;

    mailer::dispatch_event_emails(
        &state.db,
        state.mailer.as_ref(),
        &state.config.mail,
        &state.config.base_url,
        &event,
        body.email_note,
    )
    .await?;

    Ok(Json(json!({ "notice": "Emails sent" })))
}

pub async fn upload_rulebook(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;
    fetch_event(&state.db, id).await?;

    let (upload, _) = read_multipart(&mut multipart).await?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let attachment = attachments::store(
        &state.db,
        &state.storage,
        AttachmentKind::EventRulebook,
        id,
        &upload.filename,
        &upload.content_type,
        &upload.bytes,
    )
    .await?;

    Ok(Json(json!({ "rulebook": attachment })))
}

pub async fn delete_rulebook(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;

    let rulebook = attachments::find(&state.db, AttachmentKind::EventRulebook, id)
        .await?
        .ok_or_else(|| AppError::NotFound("No rulebook attached".into()))?;
    attachments::remove(&state.db, &state.storage, &rulebook).await?;

    Ok(Json(json!({ "notice": "Rulebook removed" })))
}

pub async fn upload_document(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;
    fetch_event(&state.db, id).await?;

    let (upload, _) = read_multipart(&mut multipart).await?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let attachment = attachments::store(
        &state.db,
        &state.storage,
        AttachmentKind::EventDocument,
        id,
        &upload.filename,
        &upload.content_type,
        &upload.bytes,
    )
    .await?;

    Ok(Json(json!({ "document": attachment })))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((id, document_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, id, Action::Update, Resource::Event).await?;

    let document = attachments::list(&state.db, AttachmentKind::EventDocument, id)
        .await?
        .into_iter()
        .find(|d| d.id == document_id)
        .ok_or_else(|| AppError::NotFound("Document not found".into()))?;
    attachments::remove(&state.db, &state.storage, &document).await?;

    Ok(Json(json!({ "notice": "Document removed" })))
}
