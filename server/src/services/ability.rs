use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Event,
    Team,
    Role,
    Signup,
    Membership,
    CsvImport,
    EmailDispatch,
    CastList,
    TemplateCsv,
}

/// The actor's standing on a single event. `Owner` is the holder of the
/// event's `organiser_id` and has manage rights regardless of membership
/// rows; `Organiser` is a non-read-only member; `ControlTeam` a read-only
/// member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Owner,
    Organiser,
    ControlTeam,
    NoAccess,
}

impl AccessLevel {
    pub fn manage(self) -> bool {
        matches!(self, AccessLevel::Owner | AccessLevel::Organiser)
    }
}

/// Internal causes behind a denial. Both variants surface to clients as the
/// same generic "not authorised" response; tests distinguish them here.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("referenced event does not exist")]
    UnknownEvent,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::UnknownEvent => AppError::AccessDenied,
            AccessError::Db(e) => AppError::Database(e),
        }
    }
}

/// The decision table. Default deny: anything not explicitly allowed here
/// is refused.
pub fn allows(level: AccessLevel, action: Action, resource: Resource) -> bool {
    match level {
        AccessLevel::Owner | AccessLevel::Organiser => true,
        AccessLevel::ControlTeam => {
            action == Action::Read
                && matches!(
                    resource,
                    Resource::Event
                        | Resource::Team
                        | Resource::Role
                        | Resource::Signup
                        | Resource::Membership
                )
        }
        AccessLevel::NoAccess => false,
    }
}

/// Resolves the actor's standing on an event. Defends against duplicate
/// membership rows by preferring the non-read-only one.
pub async fn access_level(
    db: &PgPool,
    organiser_id: Uuid,
    event_id: Uuid,
) -> Result<AccessLevel, AccessError> {
    let owner_id: Option<Uuid> =
        sqlx::query_scalar("SELECT organiser_id FROM events WHERE id = $1")
            .bind(event_id)
            .fetch_optional(db)
            .await?;
    let owner_id = owner_id.ok_or(AccessError::UnknownEvent)?;

    if owner_id == organiser_id {
        return Ok(AccessLevel::Owner);
    }

    let read_only: Option<bool> = sqlx::query_scalar(
        "SELECT read_only FROM organiser_to_events
         WHERE event_id = $1 AND organiser_id = $2
         ORDER BY read_only ASC LIMIT 1",
    )
    .bind(event_id)
    .bind(organiser_id)
    .fetch_optional(db)
    .await?;

    Ok(match read_only {
        Some(false) => AccessLevel::Organiser,
        Some(true) => AccessLevel::ControlTeam,
        None => AccessLevel::NoAccess,
    })
}

/// Handler gate: resolve the actor's level and deny unless the table allows
/// the (action, resource) pair. A missing event and a missing membership
/// both come back as the uniform `AccessDenied`.
pub async fn require(
    db: &PgPool,
    organiser_id: Uuid,
    event_id: Uuid,
    action: Action,
    resource: Resource,
) -> Result<AccessLevel, AppError> {
    let level = access_level(db, organiser_id, event_id).await?;
    if allows(level, action, resource) {
        Ok(level)
    } else {
        Err(AppError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIONS: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Destroy];
    const RESOURCES: [Resource; 9] = [
        Resource::Event,
        Resource::Team,
        Resource::Role,
        Resource::Signup,
        Resource::Membership,
        Resource::CsvImport,
        Resource::EmailDispatch,
        Resource::CastList,
        Resource::TemplateCsv,
    ];

    #[test]
    fn manage_levels_may_do_everything() {
        for level in [AccessLevel::Owner, AccessLevel::Organiser] {
            for action in ACTIONS {
                for resource in RESOURCES {
                    assert!(allows(level, action, resource), "{level:?} {action:?} {resource:?}");
                }
            }
        }
    }

    #[test]
    fn control_team_reads_entities_only() {
        let readable = [
            Resource::Event,
            Resource::Team,
            Resource::Role,
            Resource::Signup,
            Resource::Membership,
        ];
        for resource in RESOURCES {
            let expected = readable.contains(&resource);
            assert_eq!(
                allows(AccessLevel::ControlTeam, Action::Read, resource),
                expected,
                "read {resource:?}"
            );
        }
    }

    #[test]
    fn control_team_never_mutates() {
        for action in [Action::Create, Action::Update, Action::Destroy] {
            for resource in RESOURCES {
                assert!(!allows(AccessLevel::ControlTeam, action, resource));
            }
        }
    }

    #[test]
    fn control_team_cannot_trigger_import_or_email() {
        assert!(!allows(AccessLevel::ControlTeam, Action::Create, Resource::CsvImport));
        assert!(!allows(AccessLevel::ControlTeam, Action::Create, Resource::EmailDispatch));
        assert!(!allows(AccessLevel::ControlTeam, Action::Read, Resource::CastList));
        assert!(!allows(AccessLevel::ControlTeam, Action::Read, Resource::TemplateCsv));
    }

    #[test]
    fn no_membership_means_no_access_at_all() {
        for action in ACTIONS {
            for resource in RESOURCES {
                assert!(!allows(AccessLevel::NoAccess, action, resource));
            }
        }
    }

    #[test]
    fn manage_helper_matches_table() {
        assert!(AccessLevel::Owner.manage());
        assert!(AccessLevel::Organiser.manage());
        assert!(!AccessLevel::ControlTeam.manage());
        assert!(!AccessLevel::NoAccess.manage());
    }
}
