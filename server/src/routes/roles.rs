use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOrganiser;
use crate::models::attachment::AttachmentKind;
use crate::models::team::{Role, RoleRequest};
use crate::routes::read_multipart;
use crate::routes::teams::fetch_team;
use crate::services::ability::{self, Action, Resource};
use crate::services::{attachments, convert};
use crate::AppState;

pub(crate) async fn fetch_role(db: &sqlx::PgPool, event_id: Uuid, id: Uuid) -> AppResult<Role> {
    let role: Option<Role> =
        sqlx::query_as("SELECT * FROM roles WHERE id = $1 AND event_id = $2")
            .bind(id)
            .bind(event_id)
            .fetch_optional(db)
            .await?;
    role.ok_or_else(|| AppError::NotFound("Role not found".into()))
}

async fn name_taken(
    db: &sqlx::PgPool,
    team_id: Uuid,
    name: &str,
    exclude: Option<Uuid>,
) -> AppResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM roles
         WHERE team_id = $1 AND name = $2 AND ($3::uuid IS NULL OR id <> $3))",
    )
    .bind(team_id)
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
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Role).await?;

    let roles: Vec<(Uuid, String, Uuid, String)> = sqlx::query_as(
        "SELECT r.id, r.name, t.id, t.name FROM roles r
         JOIN teams t ON t.id = r.team_id
         WHERE r.event_id = $1
         ORDER BY t.name, r.name",
    )
    .bind(event_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "roles": roles
            .iter()
            .map(|(id, name, team_id, team_name)| json!({
                "id": id, "name": name, "teamId": team_id, "teamName": team_name,
            }))
            .collect::<Vec<_>>(),
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<RoleRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::Role).await?;

    // The owning team fixes the denormalised event id.
    let team = fetch_team(&state.db, event_id, body.team_id).await?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation(vec!["Name can't be blank".to_string()]));
    }
    if name_taken(&state.db, team.id, body.name.trim(), None).await? {
        return Err(AppError::Validation(vec![
            "Name must be unique within a team.".to_string(),
        ]));
    }

    let role: Role = sqlx::query_as(
        "INSERT INTO roles (id, team_id, event_id, name) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(team.id)
    .bind(team.event_id)
    .bind(body.name.trim())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "role": role,
        "notice": "Role was successfully created.",
    })))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Role).await?;
    let role = fetch_role(&state.db, event_id, id).await?;

    let brief = attachments::find(&state.db, AttachmentKind::RoleBrief, id).await?;
    let fulfilled_by: Option<(Option<String>, String)> = sqlx::query_as(
        "SELECT name, email FROM event_signups WHERE role_id = $1 LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(json!({
        "role": role,
        "brief": brief,
        "fulfilledBy": fulfilled_by.map(|(name, email)| json!({
            "name": name, "email": email,
        })),
    })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RoleRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Role).await?;
    fetch_role(&state.db, event_id, id).await?;
    let team = fetch_team(&state.db, event_id, body.team_id).await?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation(vec!["Name can't be blank".to_string()]));
    }
    if name_taken(&state.db, team.id, body.name.trim(), Some(id)).await? {
        return Err(AppError::Validation(vec![
            "Name must be unique within a team.".to_string(),
        ]));
    }

    let role: Role = sqlx::query_as(
        "UPDATE roles SET name = $1, team_id = $2, event_id = $3 WHERE id = $4 RETURNING *",
    )
    .bind(body.name.trim())
    .bind(team.id)
    .bind(team.event_id)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "role": role,
        "notice": "Role was successfully updated.",
    })))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Destroy, Resource::Role).await?;
    fetch_role(&state.db, event_id, id).await?;

    attachments::remove_all_for_owner(&state.db, &state.storage, id).await?;
    sqlx::query("DELETE FROM roles WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "notice": "Role was successfully deleted." })))
}

pub async fn upload_brief(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Role).await?;
    fetch_role(&state.db, event_id, id).await?;

    let (upload, _) = read_multipart(&mut multipart).await?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let attachment = attachments::store(
        &state.db,
        &state.storage,
        AttachmentKind::RoleBrief,
        id,
        &upload.filename,
        &upload.content_type,
        &upload.bytes,
    )
    .await?;

    Ok(Json(json!({ "brief": attachment })))
}

/// Converts the role brief from Word to PDF if needed.
pub async fn convert_brief(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Role).await?;
    fetch_role(&state.db, event_id, id).await?;

    let converted = match attachments::find(&state.db, AttachmentKind::RoleBrief, id).await? {
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
