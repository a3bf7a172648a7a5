//! Workspace hierarchy use-cases.
//!
//! # Responsibility
//! - Create the built-in root/default pair during tenant bootstrap.
//! - Create, update and delete standard workspaces and replicate their
//!   parent edge.
//!
//! # Invariants
//! - Every mutation and its event share one `db::atomic` unit.
//! - Validation failures (`is_validation`) are raised before any row changes.
//! - A duplicate `(name, tenant, parent)` never reaches the replicator.

use crate::config::BootstrapConfig;
use crate::db::{self, DbError};
use crate::model::tenant::Tenant;
use crate::model::workspace::{
    BuiltInWorkspaces, NewWorkspace, Workspace, WorkspaceDraft, WorkspaceId, WorkspaceListQuery,
    WorkspaceType, WorkspaceUpdate, DEFAULT_WORKSPACE_NAME, ROOT_WORKSPACE_NAME,
};
use crate::relation::event::{ReplicationEvent, ReplicationEventType};
use crate::relation::replicator::{RelationReplicator, ReplicationError};
use crate::relation::tuple::{create_relationship, Relationship, RBAC_NAMESPACE};
use crate::repo::workspace_repo::{SqliteWorkspaceRepository, WorkspaceRepository};
use crate::repo::{RepoError, UniqueConstraint};
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub const DUPLICATE_NAME_MESSAGE: &str =
    "Can't create workspace with same name within same parent workspace";

#[derive(Debug)]
pub enum WorkspaceServiceError {
    /// Name is blank after trimming.
    InvalidName,
    /// Parent does not exist in the caller's tenant.
    ParentNotFound(WorkspaceId),
    /// Tenant has no default workspace to place a workspace under.
    TenantNotBootstrapped(i64),
    NotFound(WorkspaceId),
    DuplicateName,
    SelfParent,
    /// The requested parent sits below the workspace being moved.
    ParentIsDescendant(WorkspaceId),
    NotUpdatable(WorkspaceType),
    /// Only standard workspaces can be deleted.
    NotDeletable(WorkspaceType),
    HasDependencies(WorkspaceId),
    Repo(RepoError),
    Replication(ReplicationError),
}

impl WorkspaceServiceError {
    /// `true` for failures the caller should report as bad input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidName
                | Self::ParentNotFound(_)
                | Self::DuplicateName
                | Self::SelfParent
                | Self::ParentIsDescendant(_)
                | Self::NotUpdatable(_)
                | Self::NotDeletable(_)
                | Self::HasDependencies(_)
        )
    }
}

impl Display for WorkspaceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => f.write_str("workspace name must not be blank"),
            Self::ParentNotFound(uuid) => write!(f, "parent workspace not found: {uuid}"),
            Self::TenantNotBootstrapped(tenant_id) => {
                write!(f, "tenant {tenant_id} has no default workspace")
            }
            Self::NotFound(uuid) => write!(f, "workspace not found: {uuid}"),
            Self::DuplicateName => f.write_str(DUPLICATE_NAME_MESSAGE),
            Self::SelfParent => f.write_str("Parent ID and ID can't be same"),
            Self::ParentIsDescendant(uuid) => {
                write!(f, "parent workspace {uuid} is a descendant of the workspace")
            }
            Self::NotUpdatable(kind) => write!(f, "Unable to update {kind} workspace"),
            Self::NotDeletable(kind) => write!(f, "Unable to delete {kind} workspace"),
            Self::HasDependencies(_) => {
                f.write_str("Unable to delete due to workspace dependencies")
            }
            Self::Repo(err) => write!(f, "{err}"),
            Self::Replication(err) => write!(f, "{err}"),
        }
    }
}

impl Error for WorkspaceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Replication(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for WorkspaceServiceError {
    fn from(value: RepoError) -> Self {
        if value.is_unique_violation(&UniqueConstraint::WorkspaceNamePerParent) {
            return Self::DuplicateName;
        }
        Self::Repo(value)
    }
}

impl From<DbError> for WorkspaceServiceError {
    fn from(value: DbError) -> Self {
        Self::from(RepoError::from(value))
    }
}

impl From<rusqlite::Error> for WorkspaceServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(RepoError::from(value))
    }
}

impl From<ReplicationError> for WorkspaceServiceError {
    fn from(value: ReplicationError) -> Self {
        Self::Replication(value)
    }
}

pub struct WorkspaceService<'conn> {
    conn: &'conn Connection,
    partition_key: String,
    replicator: Arc<dyn RelationReplicator>,
}

impl<'conn> WorkspaceService<'conn> {
    /// Creates the service after checking that `conn` is migrated.
    pub fn try_new(
        conn: &'conn Connection,
        config: &BootstrapConfig,
        replicator: Arc<dyn RelationReplicator>,
    ) -> Result<Self, WorkspaceServiceError> {
        db::ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            partition_key: config.partition_key.clone(),
            replicator,
        })
    }

    /// Inserts the root workspace and the default workspace under it.
    ///
    /// Emits nothing; the bootstrap event describes both edges.
    pub(crate) fn create_builtin_hierarchy(
        conn: &Connection,
        tenant: &Tenant,
    ) -> Result<BuiltInWorkspaces, RepoError> {
        let repo = SqliteWorkspaceRepository::new(conn);
        let root = repo.insert(&WorkspaceDraft {
            uuid: Uuid::new_v4(),
            name: ROOT_WORKSPACE_NAME.to_string(),
            description: None,
            kind: WorkspaceType::Root,
            parent_uuid: None,
            tenant_id: tenant.id,
        })?;
        let default = repo.insert(&WorkspaceDraft {
            uuid: Uuid::new_v4(),
            name: DEFAULT_WORKSPACE_NAME.to_string(),
            description: None,
            kind: WorkspaceType::Default,
            parent_uuid: Some(root.uuid),
            tenant_id: tenant.id,
        })?;
        Ok(BuiltInWorkspaces { root, default })
    }

    /// Creates a standard workspace and replicates its parent edge.
    pub fn create_workspace(
        &self,
        tenant: &Tenant,
        request: &NewWorkspace,
    ) -> Result<Workspace, WorkspaceServiceError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(WorkspaceServiceError::InvalidName);
        }

        db::atomic(self.conn, |conn| {
            let repo = SqliteWorkspaceRepository::new(conn);
            let parent = match request.parent_uuid {
                Some(parent_uuid) => repo
                    .get(parent_uuid)?
                    .filter(|parent| parent.tenant_id == tenant.id)
                    .ok_or(WorkspaceServiceError::ParentNotFound(parent_uuid))?,
                None => repo
                    .get_builtin(tenant.id, WorkspaceType::Default)?
                    .ok_or(WorkspaceServiceError::TenantNotBootstrapped(tenant.id))?,
            };

            let workspace = repo.insert(&WorkspaceDraft {
                uuid: Uuid::new_v4(),
                name: name.to_string(),
                description: request.description.clone(),
                kind: WorkspaceType::Standard,
                parent_uuid: Some(parent.uuid),
                tenant_id: tenant.id,
            })?;

            let event = ReplicationEvent::new(
                ReplicationEventType::CreateWorkspace,
                self.partition_key.as_str(),
            )
            .with_info("workspace_uuid", workspace.uuid.to_string())
            .with_info("org_id", tenant.org_id_str())
            .with_add(vec![parent_tuple(workspace.uuid, parent.uuid)]);
            self.replicator.replicate(conn, &event)?;

            info!(
                "event=workspace_create module=workspace status=ok tenant_id={} workspace_uuid={}",
                tenant.id, workspace.uuid
            );
            Ok(workspace)
        })
    }

    /// Applies `changes` to a standard workspace.
    ///
    /// A parent change replicates as one event that removes the old edge and
    /// adds the new one. Name or description changes alone emit nothing.
    pub fn update_workspace(
        &self,
        uuid: WorkspaceId,
        changes: &WorkspaceUpdate,
    ) -> Result<Workspace, WorkspaceServiceError> {
        let name = match changes.name.as_deref().map(str::trim) {
            Some("") => return Err(WorkspaceServiceError::InvalidName),
            other => other,
        };
        if changes.parent_uuid == Some(uuid) {
            return Err(WorkspaceServiceError::SelfParent);
        }

        db::atomic(self.conn, |conn| {
            let repo = SqliteWorkspaceRepository::new(conn);
            if !repo.lock_for_update(uuid)? {
                return Err(WorkspaceServiceError::NotFound(uuid));
            }
            let current = repo
                .get(uuid)?
                .ok_or(WorkspaceServiceError::NotFound(uuid))?;
            if current.kind != WorkspaceType::Standard {
                return Err(WorkspaceServiceError::NotUpdatable(current.kind));
            }

            let mut next = current.clone();
            if let Some(name) = name {
                next.name = name.to_string();
            }
            if let Some(description) = &changes.description {
                next.description = Some(description.clone());
            }
            if let Some(parent_uuid) = changes.parent_uuid {
                let parent = repo
                    .get(parent_uuid)?
                    .filter(|parent| parent.tenant_id == current.tenant_id)
                    .ok_or(WorkspaceServiceError::ParentNotFound(parent_uuid))?;
                if repo
                    .ancestors(parent.uuid)?
                    .iter()
                    .any(|ancestor| ancestor.uuid == uuid)
                {
                    return Err(WorkspaceServiceError::ParentIsDescendant(parent.uuid));
                }
                next.parent_uuid = Some(parent.uuid);
            }

            let updated = repo.update(&next)?;

            if updated.parent_uuid != current.parent_uuid {
                let org_id = tenant_org_id(conn, updated.tenant_id)?;
                let mut event = ReplicationEvent::new(
                    ReplicationEventType::UpdateWorkspace,
                    self.partition_key.as_str(),
                )
                .with_info("workspace_uuid", uuid.to_string())
                .with_info("org_id", org_id);
                if let Some(old_parent) = current.parent_uuid {
                    event = event.with_remove(vec![parent_tuple(uuid, old_parent)]);
                }
                if let Some(new_parent) = updated.parent_uuid {
                    event = event.with_add(vec![parent_tuple(uuid, new_parent)]);
                }
                self.replicator.replicate(conn, &event)?;
            }

            info!(
                "event=workspace_update module=workspace status=ok tenant_id={} workspace_uuid={} parent_changed={}",
                updated.tenant_id,
                uuid,
                updated.parent_uuid != current.parent_uuid
            );
            Ok(updated)
        })
    }

    /// Deletion precondition check. Takes no lock and changes nothing.
    pub fn ensure_deletable(&self, uuid: WorkspaceId) -> Result<Workspace, WorkspaceServiceError> {
        check_deletable(&SqliteWorkspaceRepository::new(self.conn), uuid)
    }

    /// Deletes a childless standard workspace and replicates the removed edge.
    pub fn delete_workspace(&self, uuid: WorkspaceId) -> Result<(), WorkspaceServiceError> {
        self.ensure_deletable(uuid)?;

        db::atomic(self.conn, |conn| {
            let repo = SqliteWorkspaceRepository::new(conn);
            if !repo.lock_for_update(uuid)? {
                return Err(WorkspaceServiceError::NotFound(uuid));
            }
            // Children may have been added between the check and the lock.
            let workspace = check_deletable(&repo, uuid)?;
            let org_id = tenant_org_id(conn, workspace.tenant_id)?;

            repo.delete(uuid)?;

            let mut event = ReplicationEvent::new(
                ReplicationEventType::DeleteWorkspace,
                self.partition_key.as_str(),
            )
            .with_info("workspace_uuid", uuid.to_string())
            .with_info("org_id", org_id);
            if let Some(parent_uuid) = workspace.parent_uuid {
                event = event.with_remove(vec![parent_tuple(uuid, parent_uuid)]);
            }
            self.replicator.replicate(conn, &event)?;

            info!(
                "event=workspace_delete module=workspace status=ok tenant_id={} workspace_uuid={}",
                workspace.tenant_id, uuid
            );
            Ok(())
        })
    }

    pub fn get_workspace(&self, uuid: WorkspaceId) -> Result<Workspace, WorkspaceServiceError> {
        SqliteWorkspaceRepository::new(self.conn)
            .get(uuid)?
            .ok_or(WorkspaceServiceError::NotFound(uuid))
    }

    pub fn list_workspaces(
        &self,
        tenant: &Tenant,
        query: &WorkspaceListQuery,
    ) -> Result<Vec<Workspace>, WorkspaceServiceError> {
        Ok(SqliteWorkspaceRepository::new(self.conn).list(tenant.id, query)?)
    }

    /// Parents of `uuid`, nearest first, ending at the root.
    pub fn ancestry(&self, uuid: WorkspaceId) -> Result<Vec<Workspace>, WorkspaceServiceError> {
        let repo = SqliteWorkspaceRepository::new(self.conn);
        if repo.get(uuid)?.is_none() {
            return Err(WorkspaceServiceError::NotFound(uuid));
        }
        Ok(repo.ancestors(uuid)?)
    }
}

fn check_deletable(
    repo: &impl WorkspaceRepository,
    uuid: WorkspaceId,
) -> Result<Workspace, WorkspaceServiceError> {
    let workspace = repo
        .get(uuid)?
        .ok_or(WorkspaceServiceError::NotFound(uuid))?;
    if workspace.kind != WorkspaceType::Standard {
        return Err(WorkspaceServiceError::NotDeletable(workspace.kind));
    }
    if repo.has_children(uuid, workspace.tenant_id)? {
        return Err(WorkspaceServiceError::HasDependencies(uuid));
    }
    Ok(workspace)
}

/// Empty for tenants without an org id.
fn tenant_org_id(conn: &Connection, tenant_id: i64) -> rusqlite::Result<String> {
    Ok(conn
        .query_row(
            "SELECT org_id FROM tenants WHERE id = ?1;",
            [tenant_id],
            |row| row.get::<_, Option<String>>(0),
        )?
        .unwrap_or_default())
}

/// `workspace:{child} #parent workspace:{parent}`
pub(crate) fn parent_tuple(child: WorkspaceId, parent: WorkspaceId) -> Relationship {
    create_relationship(
        (RBAC_NAMESPACE, "workspace"),
        child.to_string(),
        (RBAC_NAMESPACE, "workspace"),
        parent.to_string(),
        "parent",
    )
}
