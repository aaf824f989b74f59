use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::event::Event;

/// Which audience the rendered document is for. The organiser variant
/// includes player emails; the player variant hides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastListVariant {
    Organiser,
    Player,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastMember {
    pub name: Option<String>,
    pub email: String,
    #[serde(rename = "roleName")]
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamSection {
    #[serde(rename = "teamName")]
    pub team_name: Option<String>,
    pub members: Vec<CastMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganiserLine {
    pub name: String,
    pub email: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastList {
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub owner: Option<OrganiserLine>,
    /// Full organisers excluding the owner, who is listed separately.
    pub organisers: Vec<OrganiserLine>,
    #[serde(rename = "controlTeam")]
    pub control_team: Vec<OrganiserLine>,
    pub teams: Vec<TeamSection>,
}

/// One signup row as read from the store, before grouping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignupRow {
    pub name: Option<String>,
    pub email: String,
    pub team_name: Option<String>,
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub organiser_id: Uuid,
    pub name: String,
    pub email: String,
    pub read_only: bool,
    pub description: Option<String>,
}

/// Groups signups by team (teams sorted by name, the team-less group last,
/// signups within a team sorted by name) and splits the organiser roster
/// into owner / other full organisers / control team.
pub fn assemble(
    event_name: &str,
    owner_id: Uuid,
    signups: Vec<SignupRow>,
    members: Vec<MemberRow>,
    owner: Option<(String, String)>,
) -> CastList {
    let mut sections: Vec<TeamSection> = Vec::new();
    for row in signups {
        let member = CastMember {
            name: row.name,
            email: row.email,
            role_name: row.role_name,
        };
        match sections.iter_mut().find(|s| s.team_name == row.team_name) {
            Some(section) => section.members.push(member),
            None => sections.push(TeamSection {
                team_name: row.team_name,
                members: vec![member],
            }),
        }
    }
    // Named teams alphabetically, unassigned players at the end.
    sections.sort_by(|a, b| match (&a.team_name, &b.team_name) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    for section in &mut sections {
        section.members.sort_by(|a, b| {
            a.name
                .as_deref()
                .unwrap_or("")
                .cmp(b.name.as_deref().unwrap_or(""))
        });
    }

    let mut organisers = Vec::new();
    let mut control_team = Vec::new();
    let mut seen: Vec<Uuid> = Vec::new();
    for member in members {
        if seen.contains(&member.organiser_id) {
            continue;
        }
        seen.push(member.organiser_id);
        let line = OrganiserLine {
            name: member.name,
            email: member.email,
            description: member.description,
        };
        if member.read_only {
            control_team.push(line);
        } else if member.organiser_id != owner_id {
            organisers.push(line);
        }
    }

    CastList {
        event_name: event_name.to_string(),
        owner: owner.map(|(name, email)| OrganiserLine {
            name,
            email,
            description: None,
        }),
        organisers,
        control_team,
        teams: sections,
    }
}

pub async fn load(db: &PgPool, event: &Event) -> AppResult<CastList> {
    let signups = sqlx::query_as::<_, SignupRow>(
        "SELECT s.name, s.email, t.name AS team_name, r.name AS role_name
         FROM event_signups s
         LEFT JOIN teams t ON t.id = s.team_id
         LEFT JOIN roles r ON r.id = s.role_id
         WHERE s.event_id = $1",
    )
    .bind(event.id)
    .fetch_all(db)
    .await?;

    let members = sqlx::query_as::<_, MemberRow>(
        "SELECT m.organiser_id, o.name, o.email, m.read_only, m.description
         FROM organiser_to_events m
         JOIN organisers o ON o.id = m.organiser_id
         WHERE m.event_id = $1
         ORDER BY m.created_at",
    )
    .bind(event.id)
    .fetch_all(db)
    .await?;

    let owner: Option<(String, String)> =
        sqlx::query_as("SELECT name, email FROM organisers WHERE id = $1")
            .bind(event.organiser_id)
            .fetch_optional(db)
            .await?;

    Ok(assemble(
        &event.formatted_name(),
        event.organiser_id,
        signups,
        members,
        owner,
    ))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the structured cast list to a standalone HTML document, the
/// input to the external PDF renderer.
pub fn render_html(cast: &CastList, variant: CastListVariant) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>{} Cast List</title>\n",
        escape(&cast.event_name)
    ));
    html.push_str(
        "<style>body{font-family:sans-serif}table{border-collapse:collapse}\
         td,th{border:1px solid #444;padding:4px 8px}h2{margin-top:1.5em}</style>\n",
    );
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{} Cast List</h1>\n", escape(&cast.event_name)));

    if let Some(owner) = &cast.owner {
        html.push_str("<h2>Event owner</h2>\n");
        match variant {
            CastListVariant::Organiser => html.push_str(&format!(
                "<p>{} ({})</p>\n",
                escape(&owner.name),
                escape(&owner.email)
            )),
            CastListVariant::Player => {
                html.push_str(&format!("<p>{}</p>\n", escape(&owner.name)))
            }
        }
    }

    for (title, lines) in [
        ("Organisers", &cast.organisers),
        ("Control team", &cast.control_team),
    ] {
        if lines.is_empty() {
            continue;
        }
        html.push_str(&format!("<h2>{title}</h2>\n<ul>\n"));
        for line in lines {
            let mut item = escape(&line.name);
            if variant == CastListVariant::Organiser {
                item.push_str(&format!(" ({})", escape(&line.email)));
            }
            if let Some(description) = &line.description {
                item.push_str(&format!(" - {}", escape(description)));
            }
            html.push_str(&format!("<li>{item}</li>\n"));
        }
        html.push_str("</ul>\n");
    }

    for section in &cast.teams {
        let heading = section.team_name.as_deref().unwrap_or("No team");
        html.push_str(&format!("<h2>{}</h2>\n<table>\n", escape(heading)));
        match variant {
            CastListVariant::Organiser => {
                html.push_str("<tr><th>Name</th><th>Email</th><th>Role</th></tr>\n")
            }
            CastListVariant::Player => html.push_str("<tr><th>Name</th><th>Role</th></tr>\n"),
        }
        for member in &section.members {
            let name = escape(member.name.as_deref().unwrap_or("No name"));
            let role = escape(member.role_name.as_deref().unwrap_or(""));
            match variant {
                CastListVariant::Organiser => html.push_str(&format!(
                    "<tr><td>{name}</td><td>{}</td><td>{role}</td></tr>\n",
                    escape(&member.email)
                )),
                CastListVariant::Player => {
                    html.push_str(&format!("<tr><td>{name}</td><td>{role}</td></tr>\n"))
                }
            }
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(name: &str, email: &str, team: Option<&str>, role: Option<&str>) -> SignupRow {
        SignupRow {
            name: if name.is_empty() { None } else { Some(name.to_string()) },
            email: email.to_string(),
            team_name: team.map(String::from),
            role_name: role.map(String::from),
        }
    }

    fn member(id: Uuid, name: &str, read_only: bool) -> MemberRow {
        MemberRow {
            organiser_id: id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            read_only,
            description: None,
        }
    }

    #[test]
    fn groups_by_team_and_sorts() {
        let owner_id = Uuid::new_v4();
        let cast = assemble(
            "Watch the Skies",
            owner_id,
            vec![
                signup("Zed", "zed@example.com", Some("UN"), Some("Diplomat")),
                signup("Ann", "ann@example.com", Some("UN"), Some("Scientist")),
                signup("Bob", "bob@example.com", Some("Aliens"), None),
                signup("Loner", "loner@example.com", None, None),
            ],
            vec![],
            None,
        );

        let team_names: Vec<Option<&str>> = cast
            .teams
            .iter()
            .map(|s| s.team_name.as_deref())
            .collect();
        assert_eq!(team_names, vec![Some("Aliens"), Some("UN"), None]);

        let un = &cast.teams[1];
        let names: Vec<&str> = un.members.iter().map(|m| m.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["Ann", "Zed"]);
    }

    #[test]
    fn splits_organisers_and_excludes_owner() {
        let owner_id = Uuid::new_v4();
        let other_id = Uuid::new_v4();
        let control_id = Uuid::new_v4();
        let cast = assemble(
            "Watch the Skies",
            owner_id,
            vec![],
            vec![
                member(owner_id, "Olivia", false),
                member(other_id, "Frank", false),
                member(control_id, "Carol", true),
                // duplicate membership rows are collapsed
                member(other_id, "Frank", false),
            ],
            Some(("Olivia".to_string(), "olivia@example.com".to_string())),
        );

        assert_eq!(cast.owner.as_ref().unwrap().name, "Olivia");
        let organiser_names: Vec<&str> = cast.organisers.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(organiser_names, vec!["Frank"]);
        let control_names: Vec<&str> = cast.control_team.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(control_names, vec!["Carol"]);
    }

    #[test]
    fn player_variant_omits_emails() {
        let owner_id = Uuid::new_v4();
        let cast = assemble(
            "Den of Wolves",
            owner_id,
            vec![signup("Ann", "ann@example.com", Some("Crew"), Some("Captain"))],
            vec![],
            Some(("Olivia".to_string(), "olivia@example.com".to_string())),
        );

        let organiser_html = render_html(&cast, CastListVariant::Organiser);
        assert!(organiser_html.contains("ann@example.com"));
        assert!(organiser_html.contains("olivia@example.com"));

        let player_html = render_html(&cast, CastListVariant::Player);
        assert!(!player_html.contains("ann@example.com"));
        assert!(!player_html.contains("olivia@example.com"));
        assert!(player_html.contains("Captain"));
    }

    #[test]
    fn escapes_markup_in_names() {
        let cast = assemble(
            "<script>alert(1)</script>",
            Uuid::new_v4(),
            vec![signup("A & B", "ab@example.com", None, None)],
            vec![],
            None,
        );
        let html = render_html(&cast, CastListVariant::Organiser);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("A &amp; B"));
    }
}
