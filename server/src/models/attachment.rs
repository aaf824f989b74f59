use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PDF_TYPE: &str = "application/pdf";
pub const DOC_TYPE: &str = "application/msword";
pub const DOCX_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Metadata row for a blob held in the opaque blob store.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub owner_kind: String,
    pub owner_id: Uuid,
    pub filename: String,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub blob_key: String,
    pub byte_size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    EventRulebook,
    EventDocument,
    TeamBrief,
    TeamImage,
    RoleBrief,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::EventRulebook => "event_rulebook",
            AttachmentKind::EventDocument => "event_document",
            AttachmentKind::TeamBrief => "team_brief",
            AttachmentKind::TeamImage => "team_image",
            AttachmentKind::RoleBrief => "role_brief",
        }
    }

    /// Events can carry many additional documents; every other kind holds at
    /// most one attachment per owner.
    pub fn singular(self) -> bool {
        !matches!(self, AttachmentKind::EventDocument)
    }

    pub fn accepts(self, content_type: &str) -> bool {
        match self {
            AttachmentKind::TeamImage => content_type.starts_with("image/"),
            _ => matches!(content_type, PDF_TYPE | DOC_TYPE | DOCX_TYPE),
        }
    }
}

/// Word-format attachments are eligible for conversion to PDF; everything
/// else (including an already-converted PDF) is left untouched.
pub fn is_word_document(content_type: &str) -> bool {
    matches!(content_type, DOC_TYPE | DOCX_TYPE)
}

/// `"brief.pdf"` -> `".pdf"`, `"notes"` -> `""`.
pub fn extension_with_delimiter(filename: &str) -> String {
    match filename.rfind('.') {
        Some(i) if i > 0 => filename[i..].to_string(),
        _ => String::new(),
    }
}

/// `"brief.docx"` -> `"brief"`.
pub fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(i) if i > 0 => &filename[..i],
        _ => filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn briefs_accept_pdf_and_word_only() {
        for kind in [
            AttachmentKind::EventRulebook,
            AttachmentKind::EventDocument,
            AttachmentKind::TeamBrief,
            AttachmentKind::RoleBrief,
        ] {
            assert!(kind.accepts(PDF_TYPE));
            assert!(kind.accepts(DOC_TYPE));
            assert!(kind.accepts(DOCX_TYPE));
            assert!(!kind.accepts("image/png"));
            assert!(!kind.accepts("text/html"));
        }
    }

    #[test]
    fn team_images_accept_any_image() {
        assert!(AttachmentKind::TeamImage.accepts("image/png"));
        assert!(AttachmentKind::TeamImage.accepts("image/jpeg"));
        assert!(!AttachmentKind::TeamImage.accepts(PDF_TYPE));
    }

    #[test]
    fn word_detection_skips_pdfs() {
        assert!(is_word_document(DOCX_TYPE));
        assert!(is_word_document(DOC_TYPE));
        assert!(!is_word_document(PDF_TYPE));
        assert!(!is_word_document("image/png"));
    }

    #[test]
    fn filename_helpers() {
        assert_eq!(extension_with_delimiter("brief.pdf"), ".pdf");
        assert_eq!(extension_with_delimiter("archive.tar.gz"), ".gz");
        assert_eq!(extension_with_delimiter("notes"), "");
        assert_eq!(extension_with_delimiter(".hidden"), "");
        assert_eq!(file_stem("brief.docx"), "brief");
        assert_eq!(file_stem("notes"), "notes");
    }
}
