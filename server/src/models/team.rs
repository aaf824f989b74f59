use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub team_id: Uuid,
    /// Denormalised from the owning team for query convenience; always
    /// agrees with `teams.event_id`.
    pub event_id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub name: String,
    #[serde(rename = "teamId")]
    pub team_id: Uuid,
}
