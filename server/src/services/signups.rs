use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::event_signup::valid_email;

/// Business-rule checks shared by signup create/update and the CSV import:
/// email syntax, email-unique-per-event, role-fulfilled-once-per-team.
/// Returns one message per violation; empty means the signup may be saved.
/// The storage layer's unique constraints back these checks up against
/// concurrent writers.
pub async fn uniqueness_messages(
    conn: &mut PgConnection,
    event_id: Uuid,
    email: &str,
    team_id: Option<Uuid>,
    role_id: Option<Uuid>,
    exclude: Option<Uuid>,
) -> Result<Vec<String>, sqlx::Error> {
    let mut messages = Vec::new();

    if !valid_email(email) {
        messages.push(format!("The email '{email}' is invalid"));
    }

    let existing: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT name FROM event_signups
         WHERE event_id = $1 AND email = $2 AND ($3::uuid IS NULL OR id <> $3)
         LIMIT 1",
    )
    .bind(event_id)
    .bind(email)
    .bind(exclude)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some((name,)) = existing {
        messages.push(format!(
            "The email '{email}' is already in use by '{}'.",
            name.as_deref().unwrap_or("No name")
        ));
    }

    if let Some(role_id) = role_id {
        let fulfilled: Option<(Option<String>, String)> = sqlx::query_as(
            "SELECT s.name, r.name FROM event_signups s
             JOIN roles r ON r.id = s.role_id
             WHERE s.role_id = $1 AND s.team_id IS NOT DISTINCT FROM $2
               AND ($3::uuid IS NULL OR s.id <> $3)
             LIMIT 1",
        )
        .bind(role_id)
        .bind(team_id)
        .bind(exclude)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some((name, role_name)) = fulfilled {
            messages.push(format!(
                "The role '{role_name}' is already fulfilled by '{}' on this team.",
                name.as_deref().unwrap_or("No name")
            ));
        }
    }

    Ok(messages)
}
