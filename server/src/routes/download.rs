use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::attachment::{extension_with_delimiter, AttachmentKind};
use crate::models::event::Event;
use crate::routes::play::fetch_signup_by_uuid;
use crate::services::bundle::{self, BundleEntry};
use crate::services::cast_list::{self, CastListVariant};
use crate::services::attachments;
use crate::AppState;

/// Player download bundle, addressed by signup uuid: role brief, team
/// brief, rulebook, every additional document and a freshly generated
/// player cast-list PDF, zipped.
pub async fn show(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
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
    let prefix = bundle::team_prefix(team_name.as_deref());

    let mut entries: Vec<BundleEntry> = Vec::new();

    if let Some(role_id) = signup.role_id {
        if let Some(brief) = attachments::find(&state.db, AttachmentKind::RoleBrief, role_id).await?
        {
            entries.push(BundleEntry {
                name: format!("{prefix}role brief{}", extension_with_delimiter(&brief.filename)),
                bytes: state.storage.get(&brief.blob_key).await?,
            });
        }
    }

    if let Some(team_id) = signup.team_id {
        if let Some(brief) = attachments::find(&state.db, AttachmentKind::TeamBrief, team_id).await?
        {
            entries.push(BundleEntry {
                name: format!("{prefix}team brief{}", extension_with_delimiter(&brief.filename)),
                bytes: state.storage.get(&brief.blob_key).await?,
            });
        }
    }

    if let Some(rulebook) =
        attachments::find(&state.db, AttachmentKind::EventRulebook, event.id).await?
    {
        entries.push(BundleEntry {
            name: format!("{prefix}rulebook{}", extension_with_delimiter(&rulebook.filename)),
            bytes: state.storage.get(&rulebook.blob_key).await?,
        });
    }

    for doc in attachments::list(&state.db, AttachmentKind::EventDocument, event.id).await? {
        entries.push(BundleEntry {
            name: format!("{prefix}{}", doc.filename),
            bytes: state.storage.get(&doc.blob_key).await?,
        });
    }

    let cast = cast_list::load(&state.db, &event).await?;
    let html = cast_list::render_html(&cast, CastListVariant::Player);
    entries.push(BundleEntry {
        name: format!("{prefix}cast.pdf"),
        bytes: state.renderer.render_html(&html).await?,
    });

    let archive = tokio::task::spawn_blocking(move || bundle::build_zip(&entries))
        .await
        .map_err(|e| AppError::Internal(format!("bundle task failed: {e}")))??;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        bundle::archive_filename(&event.formatted_name(), &prefix)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}
