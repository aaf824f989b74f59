use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Organiser-to-event link. `read_only = true` marks a control-team member;
/// `read_only = false` a full organiser. The row matching the event's
/// `organiser_id` with `read_only = false` is the owner membership and can
/// never be edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub event_id: Uuid,
    pub organiser_id: Uuid,
    pub read_only: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddMembershipRequest {
    pub email: String,
    #[serde(rename = "readOnly")]
    pub read_only: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMembershipRequest {
    #[serde(rename = "readOnly")]
    pub read_only: bool,
    pub description: Option<String>,
}
