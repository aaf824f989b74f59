use std::io::{Read, Seek, SeekFrom, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::{AppError, AppResult};

/// One member of a player download bundle.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// `"team Aliens "` when the signup has a named team, empty otherwise. The
/// prefix keeps member names collision-free when role brief, team brief and
/// rulebook share a base name across teams.
pub fn team_prefix(team_name: Option<&str>) -> String {
    match team_name {
        Some(name) if !name.is_empty() => format!("team {name} "),
        _ => String::new(),
    }
}

/// `"<EventName> <team prefix>.zip"`; the team segment is omitted when the
/// signup has no team.
pub fn archive_filename(event_name: &str, prefix: &str) -> String {
    format!("{event_name} {prefix}.zip")
}

/// Writes all entries into a ZIP archive in an anonymous scratch file, then
/// reads the finished archive back. The scratch file is removed by the OS
/// on drop on every exit path.
pub fn build_zip(entries: &[BundleEntry]) -> AppResult<Vec<u8>> {
    let file = tempfile::tempfile()
        .map_err(|e| AppError::Internal(format!("bundle scratch file: {e}")))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default();

    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| AppError::Internal(format!("zip entry '{}': {e}", entry.name)))?;
        writer
            .write_all(&entry.bytes)
            .map_err(|e| AppError::Internal(format!("zip entry '{}': {e}", entry.name)))?;
    }

    let mut file = writer
        .finish()
        .map_err(|e| AppError::Internal(format!("zip finish: {e}")))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| AppError::Internal(format!("zip rewind: {e}")))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| AppError::Internal(format!("zip read: {e}")))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::ZipArchive;

    #[test]
    fn prefixes() {
        assert_eq!(team_prefix(Some("Aliens")), "team Aliens ");
        assert_eq!(team_prefix(Some("")), "");
        assert_eq!(team_prefix(None), "");
    }

    #[test]
    fn archive_names() {
        assert_eq!(
            archive_filename("Watch the Skies", "team Aliens "),
            "Watch the Skies team Aliens .zip"
        );
        assert_eq!(archive_filename("Watch the Skies", ""), "Watch the Skies .zip");
    }

    #[test]
    fn builds_readable_archives() {
        let entries = vec![
            BundleEntry {
                name: "team Aliens role brief.pdf".to_string(),
                bytes: b"role".to_vec(),
            },
            BundleEntry {
                name: "team Aliens team brief.pdf".to_string(),
                bytes: b"team".to_vec(),
            },
            BundleEntry {
                name: "team Aliens rulebook.pdf".to_string(),
                bytes: b"rules".to_vec(),
            },
            BundleEntry {
                name: "team Aliens cast.pdf".to_string(),
                bytes: b"cast".to_vec(),
            },
        ];
        let bytes = build_zip(&entries).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);
        let mut content = String::new();
        archive
            .by_name("team Aliens rulebook.pdf")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "rules");
    }

    #[test]
    fn empty_bundle_is_still_a_valid_archive() {
        let bytes = build_zip(&[]).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
