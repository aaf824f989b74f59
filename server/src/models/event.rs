use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organiser_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub additional_info: Option<String>,
    pub date: DateTime<Utc>,
    pub location: String,
    pub maps_embed: Option<String>,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn formatted_name(&self) -> String {
        if self.name.is_empty() {
            format!("Event {}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "additionalInfo")]
    pub additional_info: Option<String>,
    pub date: DateTime<Utc>,
    pub location: String,
    #[serde(rename = "mapsEmbed")]
    pub maps_embed: Option<String>,
    pub draft: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "additionalInfo")]
    pub additional_info: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    #[serde(rename = "mapsEmbed")]
    pub maps_embed: Option<String>,
}

/// Field constraint check for new/updated events.
pub fn validate_event_fields(name: &str, location: &str) -> Vec<String> {
    let mut messages = Vec::new();
    if name.trim().is_empty() {
        messages.push("Name can't be blank".to_string());
    }
    if location.trim().is_empty() {
        messages.push("Location can't be blank".to_string());
    }
    messages
}

/// Pulls the bare URL out of an embedded map iframe snippet.
/// The stored value is the full `<iframe src="...">` markup; the player page
/// and event detail only want the src.
pub fn extract_embed_src(embed: &str) -> Option<&str> {
    let start = if let Some(i) = embed.find("src=\"") {
        i + 5
    } else {
        embed.find('"')? + 1
    };
    let rest = &embed[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Accepts an iframe snippet only when its src is an https URL on the
/// configured embed-host allowlist. Returns the snippet unchanged on
/// success.
pub fn sanitize_embed<'a>(embed: &'a str, allowed_prefixes: &[String]) -> Option<&'a str> {
    let src = extract_embed_src(embed)?;
    if !src.starts_with("https://") {
        return None;
    }
    if allowed_prefixes.iter().any(|p| src.starts_with(p.as_str())) {
        Some(embed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFRAME: &str = r#"<iframe src="https://www.google.com/maps/embed?pb=!1m18" width="600" height="450"></iframe>"#;

    fn prefixes() -> Vec<String> {
        vec!["https://www.google.com/maps/embed".to_string()]
    }

    #[test]
    fn extracts_src_from_iframe() {
        assert_eq!(
            extract_embed_src(IFRAME),
            Some("https://www.google.com/maps/embed?pb=!1m18")
        );
    }

    #[test]
    fn extract_falls_back_to_first_quoted_value() {
        assert_eq!(extract_embed_src(r#"<iframe foo="bar">"#), Some("bar"));
        assert_eq!(extract_embed_src("no quotes here"), None);
    }

    #[test]
    fn sanitize_accepts_allowlisted_https_embed() {
        assert_eq!(sanitize_embed(IFRAME, &prefixes()), Some(IFRAME));
    }

    #[test]
    fn sanitize_rejects_http_and_foreign_hosts() {
        let http = r#"<iframe src="http://www.google.com/maps/embed?pb=1">"#;
        assert_eq!(sanitize_embed(http, &prefixes()), None);

        let other = r#"<iframe src="https://evil.example/maps/embed">"#;
        assert_eq!(sanitize_embed(other, &prefixes()), None);
    }

    #[test]
    fn validates_required_fields() {
        assert!(validate_event_fields("Operation Unicorn", "Sheffield").is_empty());
        let messages = validate_event_fields("", "  ");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Name"));
        assert!(messages[1].contains("Location"));
    }
}
