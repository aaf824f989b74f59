use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::attachment::{Attachment, AttachmentKind};
use crate::services::storage::Storage;

pub async fn find(
    db: &PgPool,
    kind: AttachmentKind,
    owner_id: Uuid,
) -> AppResult<Option<Attachment>> {
    let attachment = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE owner_kind = $1 AND owner_id = $2 LIMIT 1",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .fetch_optional(db)
    .await?;
    Ok(attachment)
}

pub async fn list(db: &PgPool, kind: AttachmentKind, owner_id: Uuid) -> AppResult<Vec<Attachment>> {
    let attachments = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE owner_kind = $1 AND owner_id = $2 ORDER BY created_at",
    )
    .bind(kind.as_str())
    .bind(owner_id)
    .fetch_all(db)
    .await?;
    Ok(attachments)
}

/// Persists an uploaded file: validates the content type for the kind,
/// writes the blob, records the metadata row. Singular kinds replace any
/// existing attachment for the owner.
pub async fn store(
    db: &PgPool,
    storage: &Storage,
    kind: AttachmentKind,
    owner_id: Uuid,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> AppResult<Attachment> {
    if !kind.accepts(content_type) {
        return Err(AppError::Validation(vec![format!(
            "'{content_type}' is not an accepted content type for this attachment"
        )]));
    }
    if bytes.is_empty() {
        return Err(AppError::Validation(vec![
            "Uploaded file is empty".to_string()
        ]));
    }

    let blob_key = Uuid::new_v4().to_string();
    storage.put(&blob_key, bytes).await?;

    let replaced: Option<Attachment> = if kind.singular() {
        find(db, kind, owner_id).await?
    } else {
        None
    };

    let mut tx = db.begin().await?;
    if let Some(old) = &replaced {
        sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(old.id)
            .execute(&mut *tx)
            .await?;
    }
    let attachment = sqlx::query_as::<_, Attachment>(
        "INSERT INTO attachments (id, owner_kind, owner_id, filename, content_type, blob_key, byte_size)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(kind.as_str())
    .bind(owner_id)
    .bind(filename)
    .bind(content_type)
    .bind(&blob_key)
    .bind(bytes.len() as i64)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    if let Some(old) = replaced {
        if let Err(e) = storage.delete(&old.blob_key).await {
            tracing::warn!("failed to delete replaced blob {}: {e}", old.blob_key);
        }
    }

    Ok(attachment)
}

pub async fn remove(db: &PgPool, storage: &Storage, attachment: &Attachment) -> AppResult<()> {
    sqlx::query("DELETE FROM attachments WHERE id = $1")
        .bind(attachment.id)
        .execute(db)
        .await?;
    storage.delete(&attachment.blob_key).await?;
    Ok(())
}

/// Drops every attachment belonging to an owner; used when the owning
/// entity is destroyed.
pub async fn remove_all_for_owner(db: &PgPool, storage: &Storage, owner_id: Uuid) -> AppResult<()> {
    let attachments = sqlx::query_as::<_, Attachment>(
        "SELECT * FROM attachments WHERE owner_id = $1",
    )
    .bind(owner_id)
    .fetch_all(db)
    .await?;

    sqlx::query("DELETE FROM attachments WHERE owner_id = $1")
        .bind(owner_id)
        .execute(db)
        .await?;

    for attachment in attachments {
        if let Err(e) = storage.delete(&attachment.blob_key).await {
            tracing::warn!("failed to delete blob {}: {e}", attachment.blob_key);
        }
    }
    Ok(())
}
