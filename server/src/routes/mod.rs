use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::{AppError, AppResult};

pub mod auth;
pub mod download;
pub mod event_organisers;
pub mod event_signups;
pub mod events;
pub mod health;
pub mod play;
pub mod roles;
pub mod teams;

/// A file pulled out of a multipart form.
pub(crate) struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reads a multipart form into at most one file part plus its text fields.
pub(crate) async fn read_multipart(
    multipart: &mut Multipart,
) -> AppResult<(Option<Upload>, HashMap<String, String>)> {
    let mut upload = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(filename) = field.file_name() {
            let filename = filename.to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?;
            upload = Some(Upload {
                filename,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?;
            fields.insert(name, value);
        }
    }

    Ok((upload, fields))
}

pub(crate) fn flag(fields: &HashMap<String, String>, name: &str) -> bool {
    matches!(
        fields.get(name).map(String::as_str),
        Some("1") | Some("true") | Some("on")
    )
}
