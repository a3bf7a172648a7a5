//! Group, policy and membership persistence.
//!
//! # Invariants
//! - Membership rows are removed explicitly before a principal is deleted so
//!   callers can report every group that lost a member.
//! - Group listings are ordered by `id` for deterministic event contents.

use crate::model::group::{Group, NewGroup, Policy};
use crate::model::tenant::TenantId;
use crate::repo::{bool_to_int, parse_flag, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const GROUP_SELECT_SQL: &str = "SELECT
    g.id AS id,
    g.uuid AS uuid,
    g.name AS name,
    g.description AS description,
    g.tenant_id AS tenant_id,
    g.platform_default AS platform_default,
    g.admin_default AS admin_default,
    g.system AS system
FROM rbac_groups g";

/// Which default-access flag a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultGroupKind {
    Platform,
    Admin,
}

impl DefaultGroupKind {
    fn column(self) -> &'static str {
        match self {
            Self::Platform => "platform_default",
            Self::Admin => "admin_default",
        }
    }
}

pub trait GroupRepository {
    fn create_group(&self, group: &NewGroup) -> RepoResult<Group>;
    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<Group>>;
    fn create_policy(&self, group: &Group, name: &str, system: bool) -> RepoResult<Policy>;
    fn list_policies(&self, group_id: i64) -> RepoResult<Vec<Policy>>;
    /// System-owned default group of `tenant_id`, if seeded.
    fn find_system_default_group(
        &self,
        tenant_id: TenantId,
        kind: DefaultGroupKind,
    ) -> RepoResult<Option<Group>>;
    /// Whether the tenant replaced the built-in platform default group.
    fn has_custom_platform_default(&self, tenant_id: TenantId) -> RepoResult<bool>;
    fn add_principal(&self, group_id: i64, principal_id: i64) -> RepoResult<()>;
    fn remove_principal(&self, group_id: i64, principal_id: i64) -> RepoResult<bool>;
    fn groups_for_principal(&self, principal_id: i64) -> RepoResult<Vec<Group>>;
    fn principal_count(&self, group_id: i64) -> RepoResult<i64>;
}

pub struct SqliteGroupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGroupRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl GroupRepository for SqliteGroupRepository<'_> {
    fn create_group(&self, group: &NewGroup) -> RepoResult<Group> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO rbac_groups (
                uuid,
                name,
                description,
                tenant_id,
                platform_default,
                admin_default,
                system
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                uuid.to_string(),
                group.name.as_str(),
                group.description.as_deref(),
                group.tenant_id,
                bool_to_int(group.platform_default),
                bool_to_int(group.admin_default),
                bool_to_int(group.system),
            ],
        )?;
        self.get_group(uuid)?
            .ok_or_else(|| RepoError::not_found("group", uuid))
    }

    fn get_group(&self, uuid: Uuid) -> RepoResult<Option<Group>> {
        self.conn
            .query_row(
                &format!("{GROUP_SELECT_SQL} WHERE g.uuid = ?1;"),
                [uuid.to_string()],
                |row| Ok(parse_group_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn create_policy(&self, group: &Group, name: &str, system: bool) -> RepoResult<Policy> {
        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO policies (uuid, name, system, tenant_id, group_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                uuid.to_string(),
                name,
                bool_to_int(system),
                group.tenant_id,
                group.id,
            ],
        )?;
        Ok(Policy {
            id: self.conn.last_insert_rowid(),
            uuid,
            name: name.to_string(),
            system,
            tenant_id: group.tenant_id,
            group_id: group.id,
        })
    }

    fn list_policies(&self, group_id: i64) -> RepoResult<Vec<Policy>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, name, system, tenant_id, group_id
             FROM policies
             WHERE group_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([group_id])?;
        let mut policies = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            policies.push(Policy {
                id: row.get("id")?,
                uuid: parse_uuid(&uuid_text, "policies.uuid")?,
                name: row.get("name")?,
                system: parse_flag(row.get("system")?, "policies.system")?,
                tenant_id: row.get("tenant_id")?,
                group_id: row.get("group_id")?,
            });
        }
        Ok(policies)
    }

    fn find_system_default_group(
        &self,
        tenant_id: TenantId,
        kind: DefaultGroupKind,
    ) -> RepoResult<Option<Group>> {
        self.conn
            .query_row(
                &format!(
                    "{GROUP_SELECT_SQL}
                     WHERE g.tenant_id = ?1
                       AND g.{} = 1
                       AND g.system = 1
                     ORDER BY g.id ASC
                     LIMIT 1;",
                    kind.column()
                ),
                [tenant_id],
                |row| Ok(parse_group_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn has_custom_platform_default(&self, tenant_id: TenantId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM rbac_groups
                WHERE tenant_id = ?1
                  AND platform_default = 1
                  AND system = 0
            );",
            [tenant_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn add_principal(&self, group_id: i64, principal_id: i64) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO group_principals (group_id, principal_id)
             VALUES (?1, ?2);",
            [group_id, principal_id],
        )?;
        Ok(())
    }

    fn remove_principal(&self, group_id: i64, principal_id: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM group_principals
             WHERE group_id = ?1
               AND principal_id = ?2;",
            [group_id, principal_id],
        )?;
        Ok(changed == 1)
    }

    fn groups_for_principal(&self, principal_id: i64) -> RepoResult<Vec<Group>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GROUP_SELECT_SQL}
             INNER JOIN group_principals gp ON gp.group_id = g.id
             WHERE gp.principal_id = ?1
             ORDER BY g.id ASC;"
        ))?;
        let mut rows = stmt.query([principal_id])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(parse_group_row(row)?);
        }
        Ok(groups)
    }

    fn principal_count(&self, group_id: i64) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM group_principals WHERE group_id = ?1;",
            [group_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<Group> {
    let uuid_text: String = row.get("uuid")?;
    Ok(Group {
        id: row.get("id")?,
        uuid: parse_uuid(&uuid_text, "rbac_groups.uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        tenant_id: row.get("tenant_id")?,
        platform_default: parse_flag(row.get("platform_default")?, "rbac_groups.platform_default")?,
        admin_default: parse_flag(row.get("admin_default")?, "rbac_groups.admin_default")?,
        system: parse_flag(row.get("system")?, "rbac_groups.system")?,
    })
}
