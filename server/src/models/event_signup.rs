use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventSignup {
    pub id: Uuid,
    pub event_id: Uuid,
    pub team_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: String,
    /// Public identifier used in unauthenticated player-facing links. The
    /// only credential needed to view or download a player's materials, so
    /// it is always a freshly generated v4 UUID.
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: String,
    #[serde(rename = "teamId")]
    pub team_id: Option<Uuid>,
    #[serde(rename = "roleId")]
    pub role_id: Option<Uuid>,
}

/// Editing a signup and clearing the name submits an empty string; it needs
/// to be NULL so `name.unwrap_or("No name")`-style display code works.
pub fn normalize_name(name: Option<&str>) -> Option<String> {
    match name {
        Some(n) if !n.trim().is_empty() => Some(n.to_string()),
        _ => None,
    }
}

/// Structural email check: one `@` with a non-empty local part and a
/// non-empty domain containing no whitespace.
pub fn valid_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(d) => d,
        None => return false,
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(valid_email("alice@example.com"));
        assert!(valid_email("a.b+c@sub.example.co.uk"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!valid_email(""));
        assert!(!valid_email("no-at-sign"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("alice@"));
        assert!(!valid_email("alice@exa mple.com"));
        assert!(!valid_email("alice@b@c.com"));
    }

    #[test]
    fn blank_names_normalize_to_none() {
        assert_eq!(normalize_name(None), None);
        assert_eq!(normalize_name(Some("")), None);
        assert_eq!(normalize_name(Some("   ")), None);
        assert_eq!(normalize_name(Some("Ada")), Some("Ada".to_string()));
    }
}
