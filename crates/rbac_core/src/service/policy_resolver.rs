//! Default policy lookup and default-access tuples.
//!
//! # Responsibility
//! - Resolve the public tenant and its platform/admin default policies once
//!   per resolver instance.
//! - Build the role binding tuples that give a tenant's default groups access
//!   to its default workspace.
//!
//! # Invariants
//! - Each cell is written at most once. A miss is memoized as `None`; a
//!   storage error leaves the cell empty so the next call retries.
//! - The admin binding is never suppressed by tenant customization.

use crate::model::tenant::{Tenant, TenantMapping};
use crate::model::workspace::WorkspaceId;
use crate::relation::tuple::{
    create_relationship, create_relationship_with_subrelation, Relationship, RBAC_NAMESPACE,
};
use crate::repo::group_repo::{DefaultGroupKind, GroupRepository, SqliteGroupRepository};
use crate::repo::tenant_repo::{SqliteTenantRepository, TenantRepository};
use crate::repo::{RepoError, RepoResult};
use log::warn;
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use uuid::Uuid;

/// Create-once cache of the system default policies.
#[derive(Debug)]
pub struct DefaultPolicyResolver {
    public_tenant_name: String,
    public_tenant: OnceCell<Option<Tenant>>,
    platform_policy: OnceCell<Option<Uuid>>,
    admin_policy: OnceCell<Option<Uuid>>,
}

impl DefaultPolicyResolver {
    pub fn new(public_tenant_name: impl Into<String>) -> Self {
        Self {
            public_tenant_name: public_tenant_name.into(),
            public_tenant: OnceCell::new(),
            platform_policy: OnceCell::new(),
            admin_policy: OnceCell::new(),
        }
    }

    /// Tenant that owns the system default groups.
    pub fn public_tenant(&self, conn: &Connection) -> RepoResult<Option<&Tenant>> {
        let tenant = self.public_tenant.get_or_try_init(|| {
            let tenant =
                SqliteTenantRepository::new(conn).get_tenant_by_name(&self.public_tenant_name)?;
            if tenant.is_none() {
                warn!(
                    "event=public_tenant_lookup module=policy status=missing tenant_name={}",
                    self.public_tenant_name
                );
            }
            Ok::<_, RepoError>(tenant)
        })?;
        Ok(tenant.as_ref())
    }

    pub fn platform_default_policy_uuid(&self, conn: &Connection) -> RepoResult<Option<Uuid>> {
        self.platform_policy
            .get_or_try_init(|| self.resolve(conn, DefaultGroupKind::Platform))
            .copied()
    }

    pub fn admin_default_policy_uuid(&self, conn: &Connection) -> RepoResult<Option<Uuid>> {
        self.admin_policy
            .get_or_try_init(|| self.resolve(conn, DefaultGroupKind::Admin))
            .copied()
    }

    fn resolve(&self, conn: &Connection, kind: DefaultGroupKind) -> RepoResult<Option<Uuid>> {
        let Some(public_tenant) = self.public_tenant(conn)? else {
            return Ok(None);
        };
        let groups = SqliteGroupRepository::new(conn);
        let Some(group) = groups.find_system_default_group(public_tenant.id, kind)? else {
            return Ok(None);
        };

        let policies = groups.list_policies(group.id)?;
        match policies.as_slice() {
            [] => Ok(None),
            [policy] => Ok(Some(policy.uuid)),
            _ => Err(RepoError::InvalidData(format!(
                "default group {} has {} policies, expected one",
                group.uuid,
                policies.len()
            ))),
        }
    }
}

/// Role binding tuples granting the tenant's default groups access to its
/// default workspace.
///
/// The platform binding is skipped when its policy is unknown or the tenant
/// has its own platform default group. The admin binding is skipped only when
/// its policy is unknown.
pub fn default_access_tuples(
    conn: &Connection,
    resolver: &DefaultPolicyResolver,
    tenant: &Tenant,
    mapping: &TenantMapping,
    default_workspace: WorkspaceId,
) -> RepoResult<Vec<Relationship>> {
    let platform_role = resolver.platform_default_policy_uuid(conn)?;
    let admin_role = resolver.admin_default_policy_uuid(conn)?;

    if platform_role.is_none() {
        warn!(
            "event=default_access module=policy status=skipped binding=platform reason=no_platform_default_policy tenant_id={}",
            tenant.id
        );
    }
    if admin_role.is_none() {
        warn!(
            "event=default_access module=policy status=skipped binding=admin reason=no_admin_default_policy tenant_id={}",
            tenant.id
        );
    }

    let mut tuples = Vec::new();

    if let Some(role) = platform_role {
        if !SqliteGroupRepository::new(conn).has_custom_platform_default(tenant.id)? {
            tuples.extend(role_binding_tuples(
                default_workspace,
                mapping.default_user_role_binding_uuid,
                role,
                mapping.default_group_uuid,
            ));
        }
    }

    if let Some(role) = admin_role {
        tuples.extend(role_binding_tuples(
            default_workspace,
            mapping.default_admin_role_binding_uuid,
            role,
            mapping.default_admin_group_uuid,
        ));
    }

    Ok(tuples)
}

fn role_binding_tuples(
    workspace: WorkspaceId,
    role_binding: Uuid,
    role: Uuid,
    group: Uuid,
) -> [Relationship; 3] {
    let role_binding = role_binding.to_string();
    [
        create_relationship(
            (RBAC_NAMESPACE, "workspace"),
            workspace.to_string(),
            (RBAC_NAMESPACE, "role_binding"),
            role_binding.as_str(),
            "binding",
        ),
        create_relationship(
            (RBAC_NAMESPACE, "role_binding"),
            role_binding.as_str(),
            (RBAC_NAMESPACE, "role"),
            role.to_string(),
            "role",
        ),
        create_relationship_with_subrelation(
            (RBAC_NAMESPACE, "role_binding"),
            role_binding.as_str(),
            (RBAC_NAMESPACE, "group"),
            group.to_string(),
            "subject",
            "member",
        ),
    ]
}
