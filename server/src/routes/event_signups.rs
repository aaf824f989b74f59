use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOrganiser;
use crate::models::event_signup::{normalize_name, EventSignup, SignupRequest};
use crate::routes::events::fetch_event;
use crate::routes::{flag, read_multipart};
use crate::services::ability::{self, AccessLevel, Action, Resource};
use crate::services::cast_list::{self, CastListVariant};
use crate::services::csv_import::{self, ImportError, ImportOptions};
use crate::services::{mailer, signups};
use crate::AppState;

pub(crate) async fn fetch_signup(
    db: &sqlx::PgPool,
    event_id: Uuid,
    id: Uuid,
) -> AppResult<EventSignup> {
    let signup: Option<EventSignup> =
        sqlx::query_as("SELECT * FROM event_signups WHERE id = $1 AND event_id = $2")
            .bind(id)
            .bind(event_id)
            .fetch_optional(db)
            .await?;
    signup.ok_or_else(|| AppError::NotFound("Player not found".into()))
}

fn signup_json(signup: &EventSignup) -> Value {
    json!({
        "id": signup.id,
        "name": signup.name,
        "email": signup.email,
        "teamId": signup.team_id,
        "roleId": signup.role_id,
        "uuid": signup.uuid,
    })
}

/// Checks that the requested team/role pair is consistent for the event:
/// both must belong to the event, and the role must belong to the team.
async fn resolve_team_role(
    db: &sqlx::PgPool,
    event_id: Uuid,
    team_id: Option<Uuid>,
    role_id: Option<Uuid>,
) -> AppResult<(Option<Uuid>, Option<Uuid>)> {
    if let Some(team_id) = team_id {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1 AND event_id = $2)")
                .bind(team_id)
                .bind(event_id)
                .fetch_one(db)
                .await?;
        if !exists {
            return Err(AppError::Validation(vec![
                "Invalid combination of team and role".to_string(),
            ]));
        }
    }
    if let Some(role_id) = role_id {
        let role_team: Option<Uuid> =
            sqlx::query_scalar("SELECT team_id FROM roles WHERE id = $1 AND event_id = $2")
                .bind(role_id)
                .bind(event_id)
                .fetch_optional(db)
                .await?;
        match role_team {
            Some(role_team) if Some(role_team) == team_id => {}
            _ => {
                return Err(AppError::Validation(vec![
                    "Invalid combination of team and role".to_string(),
                ]))
            }
        }
    }
    Ok((team_id, role_id))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let level =
        ability::require(&state.db, actor.id, event_id, Action::Read, Resource::Signup).await?;

    let rows: Vec<EventSignup> =
        sqlx::query_as("SELECT * FROM event_signups WHERE event_id = $1 ORDER BY created_at")
            .bind(event_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({
        "signups": rows.iter().map(signup_json).collect::<Vec<_>>(),
        "controlTeam": level == AccessLevel::ControlTeam,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<SignupRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::Signup).await?;

    let (team_id, role_id) =
        resolve_team_role(&state.db, event_id, body.team_id, body.role_id).await?;

    let mut conn = state.db.acquire().await?;
    let messages =
        signups::uniqueness_messages(&mut *conn, event_id, &body.email, team_id, role_id, None)
            .await?;
    if !messages.is_empty() {
        return Err(AppError::Validation(messages));
    }

    let signup: EventSignup = sqlx::query_as(
        "INSERT INTO event_signups (id, event_id, team_id, role_id, name, email, uuid)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(team_id)
    .bind(role_id)
    .bind(normalize_name(body.name.as_deref()))
    .bind(&body.email)
    .bind(Uuid::new_v4())
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "signup": signup_json(&signup),
        "notice": "Player was successfully created.",
    })))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<SignupRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Update, Resource::Signup).await?;
    fetch_signup(&state.db, event_id, id).await?;

    let (team_id, role_id) =
        resolve_team_role(&state.db, event_id, body.team_id, body.role_id).await?;

    let mut conn = state.db.acquire().await?;
    let messages =
        signups::uniqueness_messages(&mut *conn, event_id, &body.email, team_id, role_id, Some(id))
            .await?;
    if !messages.is_empty() {
        return Err(AppError::Validation(messages));
    }

    let signup: EventSignup = sqlx::query_as(
        "UPDATE event_signups
         SET name = $1, email = $2, team_id = $3, role_id = $4, updated_at = NOW()
         WHERE id = $5
         RETURNING *",
    )
    .bind(normalize_name(body.name.as_deref()))
    .bind(&body.email)
    .bind(team_id)
    .bind(role_id)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "signup": signup_json(&signup),
        "notice": "Player was successfully updated.",
    })))
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Destroy, Resource::Signup).await?;
    fetch_signup(&state.db, event_id, id).await?;

    sqlx::query("DELETE FROM event_signups WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "notice": "Player was successfully deleted." })))
}

/// Template CSV listing every role that currently has no fulfilling signup,
/// with name/email left blank for the organiser to fill in.
pub async fn generate_template(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::TemplateCsv).await?;
    let event = fetch_event(&state.db, event_id).await?;

    let unfulfilled: Vec<(String, String)> = sqlx::query_as(
        "SELECT t.name, r.name FROM roles r
         JOIN teams t ON t.id = r.team_id
         WHERE r.event_id = $1
           AND r.id NOT IN (
             SELECT role_id FROM event_signups
             WHERE event_id = $1 AND role_id IS NOT NULL
           )
         ORDER BY t.name, r.name",
    )
    .bind(event_id)
    .fetch_all(&state.db)
    .await?;

    let csv = csv_import::template_csv(&unfulfilled);
    let disposition = format!(
        "attachment; filename=\"Generated Template CSV for {}.csv\"",
        event.formatted_name()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// Bulk signup upload. Multipart form: a CSV file part plus the
/// `createTeams` / `createRoles` flags. All-or-nothing.
pub async fn import_csv(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::CsvImport).await?;
    fetch_event(&state.db, event_id).await?;

    let (upload, fields) = read_multipart(&mut multipart).await?;
    let options = ImportOptions {
        create_teams: flag(&fields, "createTeams"),
        create_roles: flag(&fields, "createRoles"),
    };

    let data = match upload {
        Some(upload) if !upload.bytes.is_empty() => upload.bytes,
        _ => return Err(ImportError::NoFile.into()),
    };

    let summary = csv_import::import_signups(&state.db, event_id, &data, options).await?;

    let notice = format!(
        "{} player(s) were uploaded successfully. {} new team(s) were created. {} new role(s) were created.",
        summary.rows, summary.teams_created, summary.roles_created
    );
    Ok(Json(json!({
        "notice": notice,
        "summary": summary,
    })))
}

/// Organiser-facing cast list as a PDF download.
pub async fn organiser_cast_list(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    ability::require(&state.db, actor.id, event_id, Action::Read, Resource::CastList).await?;
    let event = fetch_event(&state.db, event_id).await?;

    let cast = cast_list::load(&state.db, &event).await?;
    let html = cast_list::render_html(&cast, CastListVariant::Organiser);
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

#[derive(Debug, serde::Deserialize)]
pub struct EmailRequest {
    #[serde(rename = "emailNote")]
    pub email_note: Option<String>,
}

pub async fn email(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path(event_id): Path<Uuid>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::EmailDispatch)
        .await?;
    let event = fetch_event(&state.db, event_id).await?;

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

pub async fn email_single(
    State(state): State<AppState>,
    Extension(actor): Extension<AuthOrganiser>,
    Path((event_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<Value>> {
    ability::require(&state.db, actor.id, event_id, Action::Create, Resource::EmailDispatch)
        .await?;
    let event = fetch_event(&state.db, event_id).await?;
    let signup = fetch_signup(&state.db, event_id, id).await?;

    mailer::dispatch_single_email(
        &state.db,
        state.mailer.as_ref(),
        &state.config.base_url,
        &event,
        &signup,
        body.email_note,
    )
    .await?;

    Ok(Json(json!({ "notice": "Email sent" })))
}
