use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};
use crate::models::event::Event;
use crate::models::event_signup::EventSignup;
use crate::models::organiser::Organiser;

/// Lightweight mail transport posting to an HTTP mail API. Fire-and-forget
/// from the dispatch component's perspective; `None` when unconfigured.
#[derive(Clone)]
pub struct Mailer {
    api_url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl Mailer {
    pub fn new(config: &MailConfig) -> Option<Self> {
        if config.api_url.is_empty() {
            return None;
        }
        Some(Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            client: reqwest::Client::new(),
        })
    }

    pub async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Mail request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Internal(format!(
                "Mail API error: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Pre-send checks shared by the all-signups and single-signup paths. All
/// of them run before the first email goes out, so a rejection sends
/// nothing.
pub fn dispatch_precondition(draft: bool, signups: &[EventSignup]) -> Result<(), AppError> {
    if draft {
        return Err(AppError::BadRequest(
            "Event needs to be published to send emails".into(),
        ));
    }
    if signups.iter().any(|s| s.role_id.is_none()) {
        return Err(AppError::BadRequest("a signup is missing a role".into()));
    }
    if signups.is_empty() {
        return Err(AppError::BadRequest(
            "There are no signups to email".into(),
        ));
    }
    Ok(())
}

/// Counts above the threshold go to the background sender.
pub fn use_async(signup_count: usize, sync_send_limit: usize) -> bool {
    signup_count > sync_send_limit
}

pub fn brief_email(
    signup: &EventSignup,
    event: &Event,
    note: Option<&str>,
    organiser: &Organiser,
    base_url: &str,
) -> (String, String) {
    let subject = format!("{} - Event information!", event.formatted_name());
    let mut body = format!(
        "Hello {},\n\nYou are signed up to {} on {} at {}.\n",
        signup.name.as_deref().unwrap_or("player"),
        event.formatted_name(),
        event.date.format("%Y-%m-%d %H:%M"),
        event.location,
    );
    if let Some(note) = note {
        if !note.is_empty() {
            body.push_str(&format!("\n{note}\n"));
        }
    }
    body.push_str(&format!(
        "\nYour player page, briefing documents and cast list:\n{}/play/{}\n",
        base_url, signup.uuid
    ));
    body.push_str(&format!(
        "\nAny questions? Contact your organiser {} at {}.\n",
        organiser.name, organiser.email
    ));
    (subject, body)
}

/// Sent when adding an organiser by email creates a brand-new account.
pub fn account_email(
    email: &str,
    password: &str,
    event_name: &str,
    base_url: &str,
) -> (String, String) {
    let subject = "An account has been created for you".to_string();
    let body = format!(
        "You have been added as an organiser of {event_name}.\n\n\
         Log in at {base_url} with:\n  email: {email}\n  password: {password}\n\n\
         Please change your password after your first login.\n"
    );
    (subject, body)
}

/// Emails every signup on an event. Small events are sent synchronously in
/// order within the request (the first failure aborts the loop and
/// surfaces); larger ones are handed to the background sender and the
/// caller gets an immediate acknowledgement.
pub async fn dispatch_event_emails(
    db: &PgPool,
    mailer: Option<&Mailer>,
    config: &MailConfig,
    base_url: &str,
    event: &Event,
    note: Option<String>,
) -> AppResult<()> {
    let signups: Vec<EventSignup> =
        sqlx::query_as("SELECT * FROM event_signups WHERE event_id = $1 ORDER BY created_at")
            .bind(event.id)
            .fetch_all(db)
            .await?;

    dispatch_precondition(event.draft, &signups)?;

    let mailer = mailer
        .ok_or_else(|| AppError::Internal("Mail transport is not configured".into()))?;

    let organiser: Organiser = sqlx::query_as("SELECT * FROM organisers WHERE id = $1")
        .bind(event.organiser_id)
        .fetch_one(db)
        .await?;

    if use_async(signups.len(), config.sync_send_limit) {
        let signup_ids = signups.iter().map(|s| s.id).collect();
        spawn_email_job(
            db.clone(),
            mailer.clone(),
            config.clone(),
            base_url.to_string(),
            event.id,
            organiser.id,
            signup_ids,
            note,
        );
    } else {
        for signup in &signups {
            let (subject, body) =
                brief_email(signup, event, note.as_deref(), &organiser, base_url);
            mailer.send(&signup.email, &subject, &body).await?;
        }
    }

    Ok(())
}

/// Same draft/missing-role checks, scoped to one signup.
pub async fn dispatch_single_email(
    db: &PgPool,
    mailer: Option<&Mailer>,
    base_url: &str,
    event: &Event,
    signup: &EventSignup,
    note: Option<String>,
) -> AppResult<()> {
    if event.draft {
        return Err(AppError::BadRequest(
            "Event needs to be published to send emails".into(),
        ));
    }
    if signup.role_id.is_none() {
        return Err(AppError::BadRequest(
            "this signup doesn't have a role assigned".into(),
        ));
    }

    let mailer = mailer
        .ok_or_else(|| AppError::Internal("Mail transport is not configured".into()))?;

    let organiser: Organiser = sqlx::query_as("SELECT * FROM organisers WHERE id = $1")
        .bind(event.organiser_id)
        .fetch_one(db)
        .await?;

    let (subject, body) = brief_email(signup, event, note.as_deref(), &organiser, base_url);
    mailer.send(&signup.email, &subject, &body).await
}

/// Hands the full send off to a background task and returns immediately.
/// The task receives ids only and re-fetches rows when it runs; the
/// triggering request cannot observe individual send failures.
pub fn spawn_email_job(
    db: PgPool,
    mailer: Mailer,
    config: MailConfig,
    base_url: String,
    event_id: Uuid,
    organiser_id: Uuid,
    signup_ids: Vec<Uuid>,
    note: Option<String>,
) {
    tokio::spawn(async move {
        if let Err(e) = run_email_job(
            &db,
            &mailer,
            &config,
            &base_url,
            event_id,
            organiser_id,
            &signup_ids,
            note.as_deref(),
        )
        .await
        {
            tracing::error!("background email job for event {event_id} failed: {e}");
        }
    });
}

#[allow(clippy::too_many_arguments)]
async fn run_email_job(
    db: &PgPool,
    mailer: &Mailer,
    config: &MailConfig,
    base_url: &str,
    event_id: Uuid,
    organiser_id: Uuid,
    signup_ids: &[Uuid],
    note: Option<&str>,
) -> AppResult<()> {
    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id = $1")
        .bind(event_id)
        .fetch_one(db)
        .await?;
    let organiser: Organiser = sqlx::query_as("SELECT * FROM organisers WHERE id = $1")
        .bind(organiser_id)
        .fetch_one(db)
        .await?;

    for batch in signup_ids.chunks(config.batch_size.max(1)) {
        for id in batch {
            let signup: Option<EventSignup> =
                sqlx::query_as("SELECT * FROM event_signups WHERE id = $1")
                    .bind(id)
                    .fetch_optional(db)
                    .await?;
            // Signups deleted since the job was queued are skipped.
            let Some(signup) = signup else { continue };

            let (subject, body) = brief_email(&signup, &event, note, &organiser, base_url);
            if let Err(e) = mailer.send(&signup.email, &subject, &body).await {
                tracing::error!("email to {} failed: {e}", signup.email);
            }
        }
        // Pause between batches to respect outbound mail-rate limits.
        tokio::time::sleep(std::time::Duration::from_secs(config.batch_pause_secs)).await;
    }

    tracing::info!(
        "background email job for event {event_id} finished ({} signups)",
        signup_ids.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signup(role_id: Option<Uuid>) -> EventSignup {
        EventSignup {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            team_id: None,
            role_id,
            name: Some("Ada".to_string()),
            email: "ada@example.com".to_string(),
            uuid: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn draft_events_never_send() {
        let err = dispatch_precondition(true, &[signup(Some(Uuid::new_v4()))]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("published")));
    }

    #[test]
    fn a_signup_without_a_role_blocks_the_whole_send() {
        let err = dispatch_precondition(
            false,
            &[signup(Some(Uuid::new_v4())), signup(None)],
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("missing a role")));
    }

    #[test]
    fn zero_signups_is_an_error() {
        let err = dispatch_precondition(false, &[]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("no signups")));
    }

    #[test]
    fn threshold_is_exclusive_at_ten() {
        assert!(!use_async(9, 10));
        assert!(!use_async(10, 10));
        assert!(use_async(11, 10));
    }

    #[test]
    fn batches_preserve_order() {
        let ids: Vec<Uuid> = (0..25).map(|_| Uuid::new_v4()).collect();
        let batches: Vec<&[Uuid]> = ids.chunks(10).collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[2].len(), 5);
        let flattened: Vec<Uuid> = batches.concat();
        assert_eq!(flattened, ids);
    }

    #[test]
    fn brief_email_includes_player_link_and_note() {
        let event = Event {
            id: Uuid::new_v4(),
            organiser_id: Uuid::new_v4(),
            name: "Watch the Skies".to_string(),
            description: None,
            additional_info: None,
            date: Utc::now(),
            location: "Sheffield".to_string(),
            maps_embed: None,
            draft: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let organiser = Organiser {
            id: Uuid::new_v4(),
            email: "olivia@example.com".to_string(),
            password_hash: String::new(),
            name: "Olivia".to_string(),
            created_at: Utc::now(),
            last_login_at: None,
        };
        let s = signup(Some(Uuid::new_v4()));

        let (subject, body) = brief_email(
            &s,
            &event,
            Some("Doors open at 9."),
            &organiser,
            "https://hub.example",
        );
        assert_eq!(subject, "Watch the Skies - Event information!");
        assert!(body.contains(&format!("https://hub.example/play/{}", s.uuid)));
        assert!(body.contains("Doors open at 9."));
        assert!(body.contains("olivia@example.com"));
    }
}
