use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event_signup::{normalize_name, valid_email};
use crate::services::signups;

pub const REQUIRED_HEADERS: [&str; 4] = ["name", "email", "team", "role"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub create_teams: bool,
    pub create_roles: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    #[serde(rename = "teamsCreated")]
    pub teams_created: usize,
    #[serde(rename = "rolesCreated")]
    pub roles_created: usize,
    /// Team name -> roles referenced under it that were neither found nor
    /// created. A missing team appears with an empty list even when none of
    /// its roles were referenced.
    #[serde(rename = "missingTeamsAndRoles")]
    pub missing: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("No file / an incorrect file type has been provided. Please upload a '.csv' file.")]
    NoFile,

    #[error("Cannot create roles without also creating teams.")]
    RolesWithoutTeams,

    #[error("The uploaded CSV contains the following forbidden header(s): {0}. Please only provide the 'name', 'email', 'team' and 'role' column headers.")]
    ForbiddenHeaders(String),

    #[error("The uploaded CSV does not contain the following header(s): {0}. Please provide the 'name', 'email', 'team' and 'role' column headers.")]
    MissingHeaders(String),

    #[error("Malformed row on line {line}, not enough fields ({found}, should be 4)")]
    NotEnoughFields { line: usize, found: usize },

    #[error("Malformed row on line {line}, the email '{email}' is invalid")]
    InvalidEmail { line: usize, email: String },

    /// A row failed a business rule at save time (duplicate email,
    /// fulfilled role). Aborts the whole import.
    #[error("{0}")]
    Row(String),

    #[error("The uploaded CSV could not be parsed: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Db(e) => AppError::Database(e),
            other => AppError::ImportFormat(other.to_string()),
        }
    }
}

/// One structurally valid data row. `line` is 1-based and counts the header
/// row as line 1, so the first data row is line 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: usize,
    pub name: String,
    pub email: String,
    pub team: String,
    pub role: String,
}

/// It is not possible to create roles without also creating teams. Checked
/// before any row is read.
pub fn validate_options(options: ImportOptions) -> Result<(), ImportError> {
    if options.create_roles && !options.create_teams {
        return Err(ImportError::RolesWithoutTeams);
    }
    Ok(())
}

fn quote_join(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The header set, after dropping blank cells, must be exactly
/// {name, email, team, role}, in any order.
pub fn validate_headers(headers: &[&str]) -> Result<(), ImportError> {
    let present: Vec<&str> = headers
        .iter()
        .copied()
        .filter(|h| !h.trim().is_empty())
        .collect();

    let forbidden: Vec<&str> = present
        .iter()
        .copied()
        .filter(|h| !REQUIRED_HEADERS.contains(h))
        .collect();
    if !forbidden.is_empty() {
        return Err(ImportError::ForbiddenHeaders(quote_join(&forbidden)));
    }

    let missing: Vec<&str> = REQUIRED_HEADERS
        .iter()
        .copied()
        .filter(|h| !present.contains(h))
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingHeaders(quote_join(&missing)));
    }

    Ok(())
}

/// Parses and structurally validates the upload: header check, then per row
/// a 4-non-empty-fields check and an email syntax check. Fails on the first
/// bad row; nothing is applied until every row has passed.
pub fn parse_rows(data: &[u8]) -> Result<Vec<CsvRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

    let headers = reader.headers()?.clone();
    let header_cells: Vec<&str> = headers.iter().collect();
    validate_headers(&header_cells)?;

    let index_of = |name: &str| headers.iter().position(|h| h == name).unwrap();
    let name_idx = index_of("name");
    let email_idx = index_of("email");
    let team_idx = index_of("team");
    let role_idx = index_of("role");

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // 1-based, counting the header row as line 1.
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 2);

        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        let name = field(name_idx);
        let email = field(email_idx);
        let team = field(team_idx);
        let role = field(role_idx);

        let found = [&name, &email, &team, &role]
            .iter()
            .filter(|v| !v.is_empty())
            .count();
        if found < 4 {
            return Err(ImportError::NotEnoughFields { line, found });
        }

        if !valid_email(&email) {
            return Err(ImportError::InvalidEmail { line, email });
        }

        rows.push(CsvRow {
            line,
            name,
            email,
            team,
            role,
        });
    }

    Ok(rows)
}

/// Applies a validated upload to one event inside a single transaction.
/// Rows are processed in file order; a team or role synthesized by an
/// earlier row is visible to later rows. Any failure rolls back everything
/// including teams and roles synthesized during this call.
pub async fn import_signups(
    db: &PgPool,
    event_id: Uuid,
    data: &[u8],
    options: ImportOptions,
) -> Result<ImportSummary, ImportError> {
    validate_options(options)?;

    let rows = parse_rows(data)?;

    let mut summary = ImportSummary::default();
    let mut tx = db.begin().await?;

    for row in &rows {
        let mut team_id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM teams WHERE event_id = $1 AND name = $2")
                .bind(event_id)
                .bind(&row.team)
                .fetch_optional(&mut *tx)
                .await?;

        if team_id.is_none() {
            if options.create_teams {
                let id = Uuid::new_v4();
                sqlx::query("INSERT INTO teams (id, event_id, name) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(event_id)
                    .bind(&row.team)
                    .execute(&mut *tx)
                    .await?;
                team_id = Some(id);
                summary.teams_created += 1;
            } else {
                summary.missing.entry(row.team.clone()).or_default();
            }
        }

        // Role lookup is scoped to the team the row resolved to; a role can
        // only match under a matching team name.
        let mut role_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM roles
             WHERE event_id = $1 AND name = $2 AND team_id IS NOT DISTINCT FROM $3",
        )
        .bind(event_id)
        .bind(&row.role)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?;

        if role_id.is_none() {
            match team_id {
                Some(team_id) if options.create_roles => {
                    let id = Uuid::new_v4();
                    sqlx::query(
                        "INSERT INTO roles (id, team_id, event_id, name) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(id)
                    .bind(team_id)
                    .bind(event_id)
                    .bind(&row.role)
                    .execute(&mut *tx)
                    .await?;
                    role_id = Some(id);
                    summary.roles_created += 1;
                }
                _ => {
                    summary
                        .missing
                        .entry(row.team.clone())
                        .or_default()
                        .push(row.role.clone());
                }
            }
        }

        let messages =
            signups::uniqueness_messages(&mut *tx, event_id, &row.email, team_id, role_id, None)
                .await?;
        if !messages.is_empty() {
            // Dropping the transaction rolls back every row, team and role
            // written during this call.
            return Err(ImportError::Row(messages.join("\n")));
        }

        sqlx::query(
            "INSERT INTO event_signups (id, event_id, team_id, role_id, name, email, uuid)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(team_id)
        .bind(role_id)
        .bind(normalize_name(Some(&row.name)))
        .bind(&row.email)
        .bind(Uuid::new_v4())
        .execute(&mut *tx)
        .await?;
        summary.rows += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

/// Fill-in template for organisers: one row per role that currently has no
/// fulfilling signup, name/email left blank.
pub fn template_csv(unfulfilled: &[(String, String)]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(REQUIRED_HEADERS)
        .expect("writing to Vec cannot fail");
    for (team, role) in unfulfilled {
        writer
            .write_record(["", "", team.as_str(), role.as_str()])
            .expect("writing to Vec cannot fail");
    }
    String::from_utf8(writer.into_inner().expect("writing to Vec cannot fail"))
        .expect("csv output is UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_uploads() {
        let data = b"name,email,team,role\nAda,ada@example.com,UN,Scientist\nBob,bob@example.com,Aliens,Pilot\n";
        let rows = parse_rows(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].name, "Ada");
        assert_eq!(rows[1].line, 3);
        assert_eq!(rows[1].team, "Aliens");
    }

    #[test]
    fn header_order_does_not_matter() {
        let data = b"role,team,email,name\nScientist,UN,ada@example.com,Ada\n";
        let rows = parse_rows(data).unwrap();
        assert_eq!(rows[0].name, "Ada");
        assert_eq!(rows[0].email, "ada@example.com");
        assert_eq!(rows[0].team, "UN");
        assert_eq!(rows[0].role, "Scientist");
    }

    #[test]
    fn blank_trailing_header_cells_are_ignored() {
        let data = b"name,email,team,role,,\nAda,ada@example.com,UN,Scientist,,\n";
        assert!(parse_rows(data).is_ok());
    }

    #[test]
    fn forbidden_headers_are_named() {
        let data = b"name,email,team,role,HELLO\n";
        match parse_rows(data) {
            Err(ImportError::ForbiddenHeaders(names)) => assert_eq!(names, "'HELLO'"),
            other => panic!("expected forbidden-header error, got {other:?}"),
        }
    }

    #[test]
    fn missing_headers_are_named() {
        let data = b"name,email\nAda,ada@example.com\n";
        match parse_rows(data) {
            Err(ImportError::MissingHeaders(names)) => assert_eq!(names, "'team', 'role'"),
            other => panic!("expected missing-header error, got {other:?}"),
        }
    }

    #[test]
    fn short_rows_report_the_line_counting_the_header() {
        // Row 3 of the data is line 4 of the file.
        let data = b"name,email,team,role\nAda,ada@example.com,UN,Scientist\nBob,bob@example.com,UN,Pilot\nCarol,carol@example.com,UN\n";
        match parse_rows(data) {
            Err(ImportError::NotEnoughFields { line, found }) => {
                assert_eq!(line, 4);
                assert_eq!(found, 3);
            }
            other => panic!("expected not-enough-fields error, got {other:?}"),
        }
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let data = b"name,email,team,role\nAda,ada@example.com,,Scientist\n";
        match parse_rows(data) {
            Err(ImportError::NotEnoughFields { line, found }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 3);
            }
            other => panic!("expected not-enough-fields error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_emails_report_the_line() {
        let data = b"name,email,team,role\nAda,not-an-email,UN,Scientist\n";
        match parse_rows(data) {
            Err(ImportError::InvalidEmail { line, email }) => {
                assert_eq!(line, 2);
                assert_eq!(email, "not-an-email");
            }
            other => panic!("expected invalid-email error, got {other:?}"),
        }
    }

    #[test]
    fn quoted_fields_parse() {
        let data = b"name,email,team,role\n\"Ada, the first\",ada@example.com,\"UN Security Council\",Scientist\n";
        let rows = parse_rows(data).unwrap();
        assert_eq!(rows[0].name, "Ada, the first");
        assert_eq!(rows[0].team, "UN Security Council");
    }

    #[test]
    fn a_raw_template_fails_structural_validation_at_line_two() {
        // A freshly generated template has name/email blank in every row, so
        // an unfilled upload is rejected before anything is written.
        let data = template_csv(&[("UN".to_string(), "Scientist".to_string())]);
        match parse_rows(data.as_bytes()) {
            Err(ImportError::NotEnoughFields { line, found }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 2);
            }
            other => panic!("expected not-enough-fields error, got {other:?}"),
        }
    }

    #[test]
    fn template_lists_unfulfilled_roles_in_order() {
        let csv = template_csv(&[
            ("UN".to_string(), "Scientist".to_string()),
            ("Aliens".to_string(), "Pilot".to_string()),
        ]);
        assert_eq!(csv, "name,email,team,role\n,,UN,Scientist\n,,Aliens,Pilot\n");
    }

    #[test]
    fn a_filled_in_template_round_trips() {
        let template = template_csv(&[("UN".to_string(), "Scientist".to_string())]);
        let filled = template.replace(",,UN", "Ada,ada@example.com,UN");
        let rows = parse_rows(filled.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].team, "UN");
        assert_eq!(rows[0].role, "Scientist");
    }

    #[test]
    fn create_roles_requires_create_teams() {
        let err = validate_options(ImportOptions {
            create_teams: false,
            create_roles: true,
        })
        .unwrap_err();
        assert!(matches!(err, ImportError::RolesWithoutTeams));

        assert!(validate_options(ImportOptions {
            create_teams: true,
            create_roles: true,
        })
        .is_ok());
        assert!(validate_options(ImportOptions {
            create_teams: true,
            create_roles: false,
        })
        .is_ok());
    }
}
