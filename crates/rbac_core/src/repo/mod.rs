//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for tenants, groups,
//!   principals and workspaces.
//! - Isolate SQL details from service orchestration.
//! - Translate SQLite constraint failures into semantic errors.
//!
//! # Invariants
//! - Repositories never open transactions; callers pass a connection that is
//!   already inside `db::atomic` when atomicity matters.
//! - Unique violations are reported as `RepoError::UniqueViolation`, never as
//!   a bare SQLite error.

use crate::db::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod group_repo;
pub mod principal_repo;
pub mod tenant_repo;
pub mod workspace_repo;

static UNIQUE_FAILURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^UNIQUE constraint failed: (.+)$").expect("valid unique failure regex")
});
static QUALIFIED_COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\.(\w+)").expect("valid qualified column regex"));

pub type RepoResult<T> = Result<T, RepoError>;

/// Uniqueness rule that rejected a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueConstraint {
    /// `tenants.org_id`
    TenantOrgId,
    /// One mapping per tenant.
    TenantMapping,
    /// `(name, tenant, parent)` on workspaces.
    WorkspaceNamePerParent,
    /// One root / one default workspace per tenant.
    BuiltInWorkspace,
    /// `(username, tenant)` on principals.
    PrincipalUsername,
    /// Any other unique rule, as reported by SQLite.
    Other(String),
}

impl Display for UniqueConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TenantOrgId => f.write_str("tenant org_id"),
            Self::TenantMapping => f.write_str("tenant mapping per tenant"),
            Self::WorkspaceNamePerParent => f.write_str("workspace name per parent"),
            Self::BuiltInWorkspace => f.write_str("built-in workspace per tenant"),
            Self::PrincipalUsername => f.write_str("principal username per tenant"),
            Self::Other(columns) => write!(f, "{columns}"),
        }
    }
}

#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: String },
    UniqueViolation(UniqueConstraint),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_unique_violation(&self, constraint: &UniqueConstraint) -> bool {
        matches!(self, Self::UniqueViolation(current) if current == constraint)
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::UniqueViolation(constraint) => {
                write!(f, "unique constraint violated: {constraint}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match classify_unique_violation(&value) {
            Some(constraint) => Self::UniqueViolation(constraint),
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Maps a SQLite unique failure onto the rule it came from.
///
/// SQLite reports the offending columns as `table.column, table.column`, in
/// index definition order.
fn classify_unique_violation(err: &rusqlite::Error) -> Option<UniqueConstraint> {
    let rusqlite::Error::SqliteFailure(failure, Some(message)) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }
    let captures = UNIQUE_FAILURE_RE.captures(message)?;
    let columns_text = captures.get(1)?.as_str();
    let columns: Vec<(&str, &str)> = QUALIFIED_COLUMN_RE
        .captures_iter(columns_text)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .collect();
    let table = columns.first().map(|(table, _)| *table)?;
    let names: Vec<&str> = columns.iter().map(|(_, column)| *column).collect();

    let constraint = match (table, names.as_slice()) {
        ("tenants", ["org_id"]) => UniqueConstraint::TenantOrgId,
        ("tenant_mappings", ["tenant_id"]) => UniqueConstraint::TenantMapping,
        ("workspaces", ["name", "tenant_id", "parent_uuid"]) => {
            UniqueConstraint::WorkspaceNamePerParent
        }
        ("workspaces", ["tenant_id"]) | ("workspaces", ["tenant_id", "type"]) => {
            UniqueConstraint::BuiltInWorkspace
        }
        ("principals", ["username", "tenant_id"]) => UniqueConstraint::PrincipalUsername,
        _ => UniqueConstraint::Other(columns_text.to_string()),
    };
    Some(constraint)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::{RepoError, UniqueConstraint};
    use rusqlite::Connection;

    fn unique_error(create: &str, insert: &str) -> RepoError {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create).unwrap();
        conn.execute_batch(insert).unwrap();
        RepoError::from(conn.execute_batch(insert).unwrap_err())
    }

    #[test]
    fn classifies_workspace_name_per_parent() {
        let err = unique_error(
            "CREATE TABLE workspaces (name TEXT, tenant_id INTEGER, parent_uuid TEXT);
             CREATE UNIQUE INDEX uq ON workspaces (name, tenant_id, parent_uuid);",
            "INSERT INTO workspaces VALUES ('a', 1, 'p');",
        );
        assert!(err.is_unique_violation(&UniqueConstraint::WorkspaceNamePerParent));
    }

    #[test]
    fn classifies_tenant_org_id() {
        let err = unique_error(
            "CREATE TABLE tenants (org_id TEXT UNIQUE);",
            "INSERT INTO tenants VALUES ('1');",
        );
        assert!(err.is_unique_violation(&UniqueConstraint::TenantOrgId));
    }

    #[test]
    fn unknown_unique_rule_keeps_columns() {
        let err = unique_error(
            "CREATE TABLE things (a TEXT UNIQUE);",
            "INSERT INTO things VALUES ('x');",
        );
        assert!(matches!(
            err,
            RepoError::UniqueViolation(UniqueConstraint::Other(columns)) if columns == "things.a"
        ));
    }

    #[test]
    fn non_unique_failures_stay_db_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = RepoError::from(conn.execute_batch("SELECT * FROM missing;").unwrap_err());
        assert!(matches!(err, RepoError::Db(_)));
    }
}
