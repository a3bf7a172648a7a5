//! Principal persistence.
//!
//! # Invariants
//! - `(username, tenant_id)` is unique.
//! - Deleting a principal cascades its remaining memberships.

use crate::model::principal::{Principal, PrincipalType};
use crate::model::tenant::TenantId;
use crate::repo::{parse_uuid, RepoError, RepoResult, UniqueConstraint};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const PRINCIPAL_SELECT_SQL: &str = "SELECT
    p.id AS id,
    p.uuid AS uuid,
    p.username AS username,
    p.user_id AS user_id,
    p.type AS type,
    p.tenant_id AS tenant_id
FROM principals p";

pub trait PrincipalRepository {
    /// Returns the principal for `(username, tenant_id)`, inserting it when
    /// absent. The flag is `true` when this call inserted the row.
    fn get_or_create(
        &self,
        username: &str,
        tenant_id: TenantId,
        user_id: Option<&str>,
        kind: PrincipalType,
    ) -> RepoResult<(Principal, bool)>;
    fn find_by_username(&self, username: &str, tenant_id: TenantId)
        -> RepoResult<Option<Principal>>;
    /// Looks the principal up through the tenant's `org_id`.
    fn find_by_username_in_org(&self, username: &str, org_id: &str)
        -> RepoResult<Option<Principal>>;
    fn update_user_id(&self, principal_id: i64, user_id: &str) -> RepoResult<()>;
    fn delete(&self, principal_id: i64) -> RepoResult<bool>;
}

pub struct SqlitePrincipalRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePrincipalRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn insert(
        &self,
        username: &str,
        tenant_id: TenantId,
        user_id: Option<&str>,
        kind: PrincipalType,
    ) -> RepoResult<Principal> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO principals (uuid, username, user_id, type, tenant_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![uuid.to_string(), username, user_id, kind.as_str(), tenant_id],
        )?;
        Ok(Principal {
            id: self.conn.last_insert_rowid(),
            uuid,
            username: username.to_string(),
            user_id: user_id.map(str::to_string),
            kind,
            tenant_id,
        })
    }
}

impl PrincipalRepository for SqlitePrincipalRepository<'_> {
    fn get_or_create(
        &self,
        username: &str,
        tenant_id: TenantId,
        user_id: Option<&str>,
        kind: PrincipalType,
    ) -> RepoResult<(Principal, bool)> {
        if let Some(existing) = self.find_by_username(username, tenant_id)? {
            return Ok((existing, false));
        }

        match self.insert(username, tenant_id, user_id, kind) {
            Ok(created) => Ok((created, true)),
            Err(err) if err.is_unique_violation(&UniqueConstraint::PrincipalUsername) => {
                let existing = self
                    .find_by_username(username, tenant_id)?
                    .ok_or_else(|| RepoError::not_found("principal", username))?;
                Ok((existing, false))
            }
            Err(err) => Err(err),
        }
    }

    fn find_by_username(
        &self,
        username: &str,
        tenant_id: TenantId,
    ) -> RepoResult<Option<Principal>> {
        self.conn
            .query_row(
                &format!("{PRINCIPAL_SELECT_SQL} WHERE p.username = ?1 AND p.tenant_id = ?2;"),
                params![username, tenant_id],
                |row| Ok(parse_principal_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_by_username_in_org(
        &self,
        username: &str,
        org_id: &str,
    ) -> RepoResult<Option<Principal>> {
        self.conn
            .query_row(
                &format!(
                    "{PRINCIPAL_SELECT_SQL}
                     INNER JOIN tenants t ON t.id = p.tenant_id
                     WHERE p.username = ?1
                       AND t.org_id = ?2;"
                ),
                params![username, org_id],
                |row| Ok(parse_principal_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn update_user_id(&self, principal_id: i64, user_id: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE principals SET user_id = ?1 WHERE id = ?2;",
            params![user_id, principal_id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("principal", principal_id));
        }
        Ok(())
    }

    fn delete(&self, principal_id: i64) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM principals WHERE id = ?1;", [principal_id])?;
        Ok(changed == 1)
    }
}

fn parse_principal_row(row: &Row<'_>) -> RepoResult<Principal> {
    let uuid_text: String = row.get("uuid")?;
    let kind_text: String = row.get("type")?;
    let kind = PrincipalType::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid principal type `{kind_text}`"))
    })?;
    Ok(Principal {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "principals.uuid")?,
        username: row.get("username")?,
        user_id: row.get("user_id")?,
        kind,
        tenant_id: row.get("tenant_id")?,
    })
}
