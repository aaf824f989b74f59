use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOrganiser;
use crate::models::attachment::AttachmentKind;
use crate::models::team::{Team, TeamRequest};
use crate::routes::read_multipart;
use crate::services::ability::{self, Action, Resource};
use crate::services::{attachments, convert};
use crate::AppState;

pub(crate) async fn fetch_team(db: &sqlx::PgPool, event_id: Uuid, id: Uuid) -> AppResult<Team> {
    let team: Option<Team> =
        sqlx::query_as("SELECT * FROM teams WHERE id = $1 AND event_id = $2")
            .bind(id)
            .bind(event_id)
            .fetch_optional(db)
            .await?;
    team.ok_or_else(|| AppError::NotFound("Team not found".into()))
}

async fn name_taken(
    db: &sqlx::PgPool,
    event_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM teams
         WHERE event_id = $1 AND name = $2 AND ($3::uuid IS NULL OR id <> $3))",
    )
    .bind(event_id)
    .bind(name)
    .bind(exclude)
    .fetch_one(db)
    .await?;
    Ok(taken)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Team).await?;

    let teams: Vec<Team> =
        sqlx::query_as("SELECT * FROM teams WHERE event_id = $1 ORDER BY name")
            .bind(event_id)
            .fetch_all(&state.db)
            .await?;

    let mut payload = Vec::with_capacity(teams.len());
    for team in &teams {
        let brief = attachments::find(&state.db, AttachmentKind::TeamBrief, team.id).await?;
        payload.push(json!({
            "id": team.id,
            "name": team.name,
            "hasBrief": brief.is_some(),
        }));
    }

    Ok(Json(json!({ "teams": payload })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<TeamRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::Team).await?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation(vec!["Name can't be blank".to_string()]));
    }
    if name_taken(&state.db, event_id, body.name.trim(), None).await? {
        return Err(AppError::Validation(vec![
            "Name has already been taken for this event".to_string(),
        ]));
    }

    let team: Team = sqlx::query_as(
        "INSERT INTO teams (id, event_id, name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(body.name.trim())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "team": team,
        "notice": "Team was successfully created.",
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Team).await?;
    let team = fetch_team(&state.db, event_id, id).await?;

    let roles: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT id, name FROM roles WHERE team_id = $1 ORDER BY name")
            .bind(id)
            .fetch_all(&state.db)
            .await?;
    let brief = attachments::find(&state.db, AttachmentKind::TeamBrief, id).await?;
    let image = attachments::find(&state.db, AttachmentKind::TeamImage, id).await?;

    Ok(Json(json!({
        "team": team,
        "roles": roles
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name }))
            .collect::<Vec<_>>(),
        "brief": brief,
        "image": image,
    })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<TeamRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Team).await?;
    fetch_team(&state.db, event_id, id).await?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation(vec!["Name can't be blank".to_string()]));
    }
    if name_taken(&state.db, event_id, body.name.trim(), Some(id)).await? {
        return Err(AppError::Validation(vec![
            "Name has already been taken for this event".to_string(),
        ]));
    }

    let team: Team = sqlx::query_as("UPDATE teams SET name = $1 WHERE id = $2 RETURNING *")
        .bind(body.name.trim())
        .bind(id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(json!({
        "team": team,
        "notice": "Team was successfully updated.",
    })))
}

/// Deleting a team cascades to its roles; signups keep their row but lose
/// the team/role references.
pub async fn destroy(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Destroy, Resource::Team).await?;
    fetch_team(&state.db, event_id, id).await?;

    let role_ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE team_id = $1")
        .bind(id)
        .fetch_all(&state.db)
        .await?;
    for owner in std::iter::once(id).chain(role_ids) {
        attachments::remove_all_for_owner(&state.db, &state.storage, owner).await?;
    }

    sqlx::query("DELETE FROM teams WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "notice": "Team was successfully deleted." })))
}

pub async fn upload_brief(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Team).await?;
    fetch_team(&state.db, event_id, id).await?;

    let (upload, _) = read_multipart(&mut multipart).await?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let attachment = attachments::store(
        &state.db,
        &state.storage,
        AttachmentKind::TeamBrief,
        id,
        &upload.filename,
        &upload.content_type,
        &upload.bytes,
    )
    .await?;

    Ok(Json(json!({ "brief": attachment })))
}

pub async fn upload_image(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Team).await?;
    fetch_team(&state.db, event_id, id).await?;

    let (upload, _) = read_multipart(&mut multipart).await?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let attachment = attachments::store(
        &state.db,
        &state.storage,
        AttachmentKind::TeamImage,
        id,
        &upload.filename,
        &upload.content_type,
        &upload.bytes,
    )
    .await?;

    Ok(Json(json!({ "image": attachment })))
}

/// Converts the team brief from Word to PDF if needed.
pub async fn convert_brief(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Team).await?;
    fetch_team(&state.db, event_id, id).await?;

    let converted = match attachments::find(&state.db, AttachmentKind::TeamBrief, id).await? {
        Some(brief) => {
            convert::convert_attachment(&state.db, &state.storage, &state.converter, &brief)
                .await?
        }
        None => false,
    };

    Ok(Json(json!({
        "converted": converted,
        "notice": "The .docx files have been successfully converted to .pdf.",
    })))
}
