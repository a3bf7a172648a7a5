//! Tenant bootstrap contract and strategy selection.
//!
//! # Responsibility
//! - Define the user upsert entry point shared by both strategies.
//! - Pick the strategy once, from configuration, at construction time.
//!
//! # Invariants
//! - Shared callers hold a `dyn TenantBootstrapService` and never inspect
//!   which strategy they got.

use crate::config::{BootstrapConfig, BootstrapStrategy};
use crate::db::DbError;
use crate::model::group::Group;
use crate::model::principal::{Principal, PrincipalType, User};
use crate::model::tenant::{BootstrappedTenant, TenantId};
use crate::relation::replicator::{RelationReplicator, ReplicationError};
use crate::repo::group_repo::{GroupRepository, SqliteGroupRepository};
use crate::repo::principal_repo::{PrincipalRepository, SqlitePrincipalRepository};
use crate::repo::RepoError;
use crate::service::graph_bootstrap::GraphTenantBootstrapService;
use crate::service::legacy_bootstrap::LegacyTenantBootstrapService;
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[derive(Debug)]
pub enum BootstrapError {
    /// Caller supplied a bootstrapped tenant without its mapping.
    MissingTenantMapping { org_id: String },
    Repo(RepoError),
    Replication(ReplicationError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTenantMapping { org_id } => write!(
                f,
                "bootstrapped tenant for org {org_id} was supplied without a tenant mapping"
            ),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Replication(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingTenantMapping { .. } => None,
            Self::Repo(err) => Some(err),
            Self::Replication(err) => Some(err),
        }
    }
}

impl From<RepoError> for BootstrapError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<rusqlite::Error> for BootstrapError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl From<ReplicationError> for BootstrapError {
    fn from(value: ReplicationError) -> Self {
        Self::Replication(value)
    }
}

/// Reacts to identity-provider user activation and deactivation.
pub trait TenantBootstrapService {
    /// Active user: ensures the tenant (and, for the graph-aware strategy,
    /// its mapping and memberships) and returns it.
    /// Inactive user: removes the principal and returns `None`.
    ///
    /// `bootstrapped` short-circuits the tenant lookup for active users.
    fn upsert_user(
        &self,
        user: &User,
        bootstrapped: Option<&BootstrappedTenant>,
    ) -> BootstrapResult<Option<BootstrappedTenant>>;
}

/// Gets or creates the principal for `user` in `tenant_id` and keeps its
/// external `user_id` current.
pub(crate) fn ensure_principal_with_user_id(
    conn: &Connection,
    user: &User,
    tenant_id: TenantId,
) -> BootstrapResult<Principal> {
    let principals = SqlitePrincipalRepository::new(conn);
    let kind = if user.is_service_account {
        PrincipalType::ServiceAccount
    } else {
        PrincipalType::User
    };
    let (mut principal, created) =
        principals.get_or_create(&user.username, tenant_id, Some(&user.user_id), kind)?;
    if !created && principal.user_id.as_deref() != Some(user.user_id.as_str()) {
        principals.update_user_id(principal.id, &user.user_id)?;
        principal.user_id = Some(user.user_id.clone());
    }
    Ok(principal)
}

/// Detaches `principal` from every group it belongs to, deletes it and
/// returns the groups it left.
pub(crate) fn remove_principal(
    conn: &Connection,
    principal: &Principal,
) -> BootstrapResult<Vec<Group>> {
    let groups = SqliteGroupRepository::new(conn);
    let memberships = groups.groups_for_principal(principal.id)?;
    for group in &memberships {
        groups.remove_principal(group.id, principal.id)?;
    }
    SqlitePrincipalRepository::new(conn).delete(principal.id)?;

    if memberships.is_empty() {
        info!(
            "event=principal_remove module=bootstrap status=ok principal_uuid={} groups=0",
            principal.uuid
        );
    }
    for group in &memberships {
        info!(
            "event=principal_remove module=bootstrap status=ok principal_uuid={} group_uuid={}",
            principal.uuid, group.uuid
        );
    }
    Ok(memberships)
}

/// Builds the strategy selected by `config.strategy`.
///
/// # Errors
/// - `conn` is not migrated to the current schema.
pub fn tenant_bootstrap_service<'conn>(
    conn: &'conn Connection,
    config: &BootstrapConfig,
    replicator: Arc<dyn RelationReplicator>,
) -> BootstrapResult<Box<dyn TenantBootstrapService + 'conn>> {
    match config.strategy {
        BootstrapStrategy::Legacy => Ok(Box::new(LegacyTenantBootstrapService::try_new(
            conn, config,
        )?)),
        BootstrapStrategy::GraphAware => Ok(Box::new(GraphTenantBootstrapService::try_new(
            conn, config, replicator,
        )?)),
    }
}
