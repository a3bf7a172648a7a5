//! Workspace hierarchy persistence.
//!
//! # Invariants
//! - The schema rejects a second root/default per tenant, a parent change
//!   that breaks `(type = root) = (parent IS NULL)`, and deleting a workspace
//!   that still has children.
//! - `lock_for_update` must run inside a write transaction; it only takes the
//!   database write lock and changes no values.

use crate::model::tenant::TenantId;
use crate::model::workspace::{
    Workspace, WorkspaceDraft, WorkspaceId, WorkspaceListQuery, WorkspaceType,
};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const WORKSPACE_SELECT_SQL: &str = "SELECT
    w.uuid AS uuid,
    w.name AS name,
    w.description AS description,
    w.type AS type,
    w.parent_uuid AS parent_uuid,
    w.tenant_id AS tenant_id,
    w.created_at AS created_at,
    w.modified_at AS modified_at
FROM workspaces w";

pub trait WorkspaceRepository {
    fn insert(&self, draft: &WorkspaceDraft) -> RepoResult<Workspace>;
    fn get(&self, uuid: WorkspaceId) -> RepoResult<Option<Workspace>>;
    /// Root or default workspace of `tenant_id`.
    fn get_builtin(&self, tenant_id: TenantId, kind: WorkspaceType)
        -> RepoResult<Option<Workspace>>;
    fn list(&self, tenant_id: TenantId, query: &WorkspaceListQuery) -> RepoResult<Vec<Workspace>>;
    fn has_children(&self, uuid: WorkspaceId, tenant_id: TenantId) -> RepoResult<bool>;
    /// Takes the write lock on one row. Returns `false` when it is gone.
    fn lock_for_update(&self, uuid: WorkspaceId) -> RepoResult<bool>;
    /// Writes name, description and parent of `workspace` and bumps
    /// `modified_at`.
    fn update(&self, workspace: &Workspace) -> RepoResult<Workspace>;
    fn delete(&self, uuid: WorkspaceId) -> RepoResult<()>;
    /// Parents of `uuid` from the direct parent up to the root.
    fn ancestors(&self, uuid: WorkspaceId) -> RepoResult<Vec<Workspace>>;
}

pub struct SqliteWorkspaceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteWorkspaceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl WorkspaceRepository for SqliteWorkspaceRepository<'_> {
    fn insert(&self, draft: &WorkspaceDraft) -> RepoResult<Workspace> {
        self.conn.execute(
            "INSERT INTO workspaces (uuid, name, description, type, parent_uuid, tenant_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                draft.uuid.to_string(),
                draft.name.as_str(),
                draft.description.as_deref(),
                draft.kind.as_str(),
                draft.parent_uuid.map(|uuid| uuid.to_string()),
                draft.tenant_id,
            ],
        )?;
        self.get(draft.uuid)?
            .ok_or_else(|| RepoError::not_found("workspace", draft.uuid))
    }

    fn get(&self, uuid: WorkspaceId) -> RepoResult<Option<Workspace>> {
        self.conn
            .query_row(
                &format!("{WORKSPACE_SELECT_SQL} WHERE w.uuid = ?1;"),
                [uuid.to_string()],
                |row| Ok(parse_workspace_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_builtin(
        &self,
        tenant_id: TenantId,
        kind: WorkspaceType,
    ) -> RepoResult<Option<Workspace>> {
        if kind == WorkspaceType::Standard {
            return Err(RepoError::InvalidData(
                "standard workspaces are not unique per tenant".to_string(),
            ));
        }
        self.conn
            .query_row(
                &format!("{WORKSPACE_SELECT_SQL} WHERE w.tenant_id = ?1 AND w.type = ?2;"),
                params![tenant_id, kind.as_str()],
                |row| Ok(parse_workspace_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list(&self, tenant_id: TenantId, query: &WorkspaceListQuery) -> RepoResult<Vec<Workspace>> {
        let mut stmt = self.conn.prepare(&format!(
            "{WORKSPACE_SELECT_SQL}
             WHERE w.tenant_id = ?1
               AND (?2 IS NULL OR w.type = ?2)
               AND (?3 IS NULL OR lower(w.name) = lower(?3))
             ORDER BY w.name ASC, w.modified_at ASC, w.id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            tenant_id,
            query.kind.map(WorkspaceType::as_str),
            query
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        ])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_workspace_row(row)?);
        }
        Ok(items)
    }

    fn has_children(&self, uuid: WorkspaceId, tenant_id: TenantId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM workspaces
                WHERE parent_uuid = ?1
                  AND tenant_id = ?2
            );",
            params![uuid.to_string(), tenant_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn lock_for_update(&self, uuid: WorkspaceId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE workspaces SET modified_at = modified_at WHERE uuid = ?1;",
            [uuid.to_string()],
        )?;
        Ok(changed == 1)
    }

    fn update(&self, workspace: &Workspace) -> RepoResult<Workspace> {
        let changed = self.conn.execute(
            "UPDATE workspaces
             SET name = ?1,
                 description = ?2,
                 parent_uuid = ?3,
                 modified_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?4;",
            params![
                workspace.name.as_str(),
                workspace.description.as_deref(),
                workspace.parent_uuid.map(|uuid| uuid.to_string()),
                workspace.uuid.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("workspace", workspace.uuid));
        }
        self.get(workspace.uuid)?
            .ok_or_else(|| RepoError::not_found("workspace", workspace.uuid))
    }

    fn delete(&self, uuid: WorkspaceId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM workspaces WHERE uuid = ?1;", [uuid.to_string()])?;
        if changed == 0 {
            return Err(RepoError::not_found("workspace", uuid));
        }
        Ok(())
    }

    fn ancestors(&self, uuid: WorkspaceId) -> RepoResult<Vec<Workspace>> {
        let mut stmt = self.conn.prepare(&format!(
            "WITH RECURSIVE lineage(uuid, depth) AS (
                SELECT parent_uuid, 1
                FROM workspaces
                WHERE uuid = ?1
                  AND parent_uuid IS NOT NULL
                UNION ALL
                SELECT parent.parent_uuid, lineage.depth + 1
                FROM workspaces parent
                INNER JOIN lineage ON parent.uuid = lineage.uuid
                WHERE parent.parent_uuid IS NOT NULL
            )
            {WORKSPACE_SELECT_SQL}
            INNER JOIN lineage ON lineage.uuid = w.uuid
            ORDER BY lineage.depth ASC;"
        ))?;
        let mut rows = stmt.query([uuid.to_string()])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_workspace_row(row)?);
        }
        Ok(items)
    }
}

fn parse_workspace_row(row: &Row<'_>) -> RepoResult<Workspace> {
    let uuid_text: String = row.get("uuid")?;
    let kind_text: String = row.get("type")?;
    let kind = WorkspaceType::parse(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid workspace type `{kind_text}`"))
    })?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "workspaces.parent_uuid"))
        .transpose()?;

    Ok(Workspace {
        uuid: parse_uuid(&uuid_text, "workspaces.uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        kind,
        parent_uuid,
        tenant_id: row.get("tenant_id")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    })
}
