use std::io::Write;

use sqlx::PgPool;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::DocumentConfig;
use crate::error::{AppError, AppResult};
use crate::models::attachment::{self, Attachment};
use crate::services::storage::Storage;

/// Shells out to the configured converter (pandoc by default) for
/// Word-to-PDF conversion. Input and output go through scratch files that
/// are removed on every exit path.
#[derive(Clone)]
pub struct DocConverter {
    command: String,
}

impl DocConverter {
    pub fn new(config: &DocumentConfig) -> Self {
        Self {
            command: config.convert_command.clone(),
        }
    }

    pub async fn to_pdf(&self, input: &[u8]) -> AppResult<Vec<u8>> {
        let mut src = tempfile::Builder::new()
            .suffix(".docx")
            .tempfile()
            .map_err(|e| AppError::Conversion(format!("scratch file: {e}")))?;
        src.write_all(input)
            .map_err(|e| AppError::Conversion(format!("scratch write: {e}")))?;

        let out = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| AppError::Conversion(format!("scratch file: {e}")))?;

        let status = Command::new(&self.command)
            .arg(src.path())
            .arg("-o")
            .arg(out.path())
            .status()
            .await
            .map_err(|e| AppError::Conversion(format!("{} failed to start: {e}", self.command)))?;

        if !status.success() {
            return Err(AppError::Conversion(format!(
                "{} exited with {status}",
                self.command
            )));
        }

        tokio::fs::read(out.path())
            .await
            .map_err(|e| AppError::Conversion(format!("reading converted output: {e}")))
    }
}

/// Shells out to the configured HTML-to-PDF renderer (weasyprint by
/// default) for cast-list documents.
#[derive(Clone)]
pub struct PdfRenderer {
    command: String,
}

impl PdfRenderer {
    pub fn new(config: &DocumentConfig) -> Self {
        Self {
            command: config.render_command.clone(),
        }
    }

    pub async fn render_html(&self, html: &str) -> AppResult<Vec<u8>> {
        let mut src = tempfile::Builder::new()
            .suffix(".html")
            .tempfile()
            .map_err(|e| AppError::Conversion(format!("scratch file: {e}")))?;
        src.write_all(html.as_bytes())
            .map_err(|e| AppError::Conversion(format!("scratch write: {e}")))?;

        let out = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| AppError::Conversion(format!("scratch file: {e}")))?;

        let status = Command::new(&self.command)
            .arg(src.path())
            .arg(out.path())
            .status()
            .await
            .map_err(|e| AppError::Conversion(format!("{} failed to start: {e}", self.command)))?;

        if !status.success() {
            return Err(AppError::Conversion(format!(
                "{} exited with {status}",
                self.command
            )));
        }

        tokio::fs::read(out.path())
            .await
            .map_err(|e| AppError::Conversion(format!("reading rendered output: {e}")))
    }
}

/// Converts a Word attachment to PDF in place. Non-Word attachments
/// (including already-converted PDFs) are left untouched and report
/// `Ok(false)`. The new blob is written before the metadata row is updated
/// and the old blob removed, so a failed conversion leaves the original
/// attachment servable.
pub async fn convert_attachment(
    db: &PgPool,
    storage: &Storage,
    converter: &DocConverter,
    attachment: &Attachment,
) -> AppResult<bool> {
    if !attachment::is_word_document(&attachment.content_type) {
        return Ok(false);
    }

    let input = storage.get(&attachment.blob_key).await?;
    let pdf = converter.to_pdf(&input).await?;

    let new_key = Uuid::new_v4().to_string();
    storage.put(&new_key, &pdf).await?;

    let new_filename = format!("{}.pdf", attachment::file_stem(&attachment.filename));
    sqlx::query(
        "UPDATE attachments
         SET filename = $1, content_type = $2, blob_key = $3, byte_size = $4
         WHERE id = $5",
    )
    .bind(&new_filename)
    .bind(attachment::PDF_TYPE)
    .bind(&new_key)
    .bind(pdf.len() as i64)
    .bind(attachment.id)
    .execute(db)
    .await?;

    if let Err(e) = storage.delete(&attachment.blob_key).await {
        tracing::warn!("failed to delete converted blob {}: {e}", attachment.blob_key);
    }

    tracing::info!(
        attachment = %attachment.id,
        "converted {} to {}",
        attachment.filename,
        new_filename
    );
    Ok(true)
}
