//! Graph-aware bootstrap strategy: relational rows plus relation tuples.
//!
//! # Responsibility
//! - Bootstrap tenants (built-in workspaces, mapping, default access) and
//!   replicate the matching tuples in the same transaction.
//! - Keep default/admin group membership tuples in step with user activation.
//!
//! # Invariants
//! - A tenant is either unbootstrapped or has its mapping, both built-in
//!   workspaces and `ready = true`; no other state is ever committed.
//! - Each public operation emits exactly one event or none (on error).
//! - A losing bootstrap race re-reads the winner's mapping instead of failing.

use crate::config::BootstrapConfig;
use crate::db;
use crate::model::principal::User;
use crate::model::tenant::{
    tenant_name_for, BootstrappedTenant, NewTenant, Tenant, TenantMapping,
};
use crate::relation::event::{ReplicationEvent, ReplicationEventType};
use crate::relation::replicator::RelationReplicator;
use crate::relation::tuple::{create_relationship, Relationship, RBAC_NAMESPACE};
use crate::repo::principal_repo::{PrincipalRepository, SqlitePrincipalRepository};
use crate::repo::tenant_repo::{SqliteTenantRepository, TenantRepository};
use crate::repo::{RepoError, UniqueConstraint};
use crate::service::bootstrap_service::{
    ensure_principal_with_user_id, remove_principal, BootstrapError, BootstrapResult,
    TenantBootstrapService,
};
use crate::service::policy_resolver::{default_access_tuples, DefaultPolicyResolver};
use crate::service::workspace_service::{parent_tuple, WorkspaceService};
use log::{info, warn};
use rusqlite::Connection;
use std::sync::Arc;
use uuid::Uuid;

pub struct GraphTenantBootstrapService<'conn> {
    conn: &'conn Connection,
    config: BootstrapConfig,
    replicator: Arc<dyn RelationReplicator>,
    resolver: Arc<DefaultPolicyResolver>,
}

impl<'conn> GraphTenantBootstrapService<'conn> {
    /// Creates the service with its own policy resolver.
    pub fn try_new(
        conn: &'conn Connection,
        config: &BootstrapConfig,
        replicator: Arc<dyn RelationReplicator>,
    ) -> BootstrapResult<Self> {
        db::ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            config: config.clone(),
            replicator,
            resolver: Arc::new(DefaultPolicyResolver::new(config.public_tenant_name.as_str())),
        })
    }

    /// Shares an already warmed resolver between service instances.
    pub fn with_policy_resolver(mut self, resolver: Arc<DefaultPolicyResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the tenant and its mapping, bootstrapping it on first sight.
    pub fn get_or_bootstrap_tenant(
        &self,
        org_id: &str,
        account_number: Option<&str>,
    ) -> BootstrapResult<BootstrappedTenant> {
        self.get_or_bootstrap_in(self.conn, org_id, account_number)
    }

    /// Creates a new tenant row and bootstraps it.
    ///
    /// # Errors
    /// - `RepoError::UniqueViolation(TenantOrgId)` when the org already exists.
    pub fn new_bootstrapped_tenant(
        &self,
        org_id: &str,
        account_number: Option<&str>,
    ) -> BootstrapResult<BootstrappedTenant> {
        db::atomic(self.conn, |conn| {
            let tenant = SqliteTenantRepository::new(conn).create_tenant(&NewTenant {
                org_id: Some(org_id.to_string()),
                account_id: account_number.map(str::to_string),
                tenant_name: tenant_name_for(org_id, account_number),
                ready: false,
            })?;
            self.bootstrap_in(conn, &tenant)
        })
    }

    /// Bootstraps `tenant` unconditionally.
    ///
    /// # Errors
    /// - `RepoError::UniqueViolation(TenantMapping)` when the tenant is
    ///   already bootstrapped. Nothing is written in that case.
    pub fn bootstrap_tenant(&self, tenant: &Tenant) -> BootstrapResult<BootstrappedTenant> {
        db::atomic(self.conn, |conn| self.bootstrap_in(conn, tenant))
    }

    fn get_or_bootstrap_in(
        &self,
        conn: &Connection,
        org_id: &str,
        account_number: Option<&str>,
    ) -> BootstrapResult<BootstrappedTenant> {
        let attempt = db::atomic(conn, |sp| {
            let tenants = SqliteTenantRepository::new(sp);
            let (tenant, _) = tenants.get_or_create_tenant(&NewTenant {
                org_id: Some(org_id.to_string()),
                account_id: account_number.map(str::to_string),
                tenant_name: format!("org{org_id}"),
                ready: false,
            })?;
            if let Some(mapping) = tenants.get_mapping(tenant.id)? {
                return Ok(BootstrappedTenant {
                    tenant,
                    mapping: Some(mapping),
                });
            }
            self.bootstrap_in(sp, &tenant)
        });

        match attempt {
            Err(BootstrapError::Repo(err)) if lost_bootstrap_race(&err) => {
                warn!(
                    "event=tenant_bootstrap module=bootstrap status=retry reason=concurrent_bootstrap constraint={}",
                    err
                );
                read_bootstrapped(conn, org_id)?.ok_or(BootstrapError::Repo(err))
            }
            other => other,
        }
    }

    fn bootstrap_in(
        &self,
        conn: &Connection,
        tenant: &Tenant,
    ) -> BootstrapResult<BootstrappedTenant> {
        let org_id = tenant.org_id.clone().ok_or_else(|| {
            RepoError::InvalidData(format!("tenant {} has no org_id to bootstrap", tenant.id))
        })?;
        let tenants = SqliteTenantRepository::new(conn);

        let mapping = tenants.create_mapping(&TenantMapping::generate(tenant.id))?;
        let workspaces = WorkspaceService::create_builtin_hierarchy(conn, tenant)?;
        let default_access = default_access_tuples(
            conn,
            &self.resolver,
            tenant,
            &mapping,
            workspaces.default.uuid,
        )?;
        tenants.mark_ready(tenant.id)?;

        let tenant_resource = self.config.tenant_resource_id(&org_id);
        let mut tuples = vec![
            parent_tuple(workspaces.default.uuid, workspaces.root.uuid),
            create_relationship(
                (RBAC_NAMESPACE, "workspace"),
                workspaces.root.uuid.to_string(),
                (RBAC_NAMESPACE, "tenant"),
                tenant_resource.as_str(),
                "parent",
            ),
            create_relationship(
                (RBAC_NAMESPACE, "tenant"),
                tenant_resource.as_str(),
                (RBAC_NAMESPACE, "platform"),
                self.config.environment_name.as_str(),
                "platform",
            ),
        ];
        tuples.extend(default_access);

        let event = ReplicationEvent::new(
            ReplicationEventType::BootstrapTenant,
            self.config.partition_key.as_str(),
        )
        .with_info("org_id", org_id.as_str())
        .with_info("default_workspace_uuid", workspaces.default.uuid.to_string())
        .with_add(tuples);
        self.replicator.replicate(conn, &event)?;

        info!(
            "event=tenant_bootstrap module=bootstrap status=ok tenant_id={} tuples={}",
            tenant.id,
            event.add.len()
        );
        Ok(BootstrappedTenant {
            tenant: Tenant {
                ready: true,
                ..tenant.clone()
            },
            mapping: Some(mapping),
        })
    }

    fn activate(
        &self,
        conn: &Connection,
        user: &User,
        bootstrapped: Option<&BootstrappedTenant>,
    ) -> BootstrapResult<BootstrappedTenant> {
        let bootstrapped = match bootstrapped {
            Some(bootstrapped) => bootstrapped.clone(),
            None => self.get_or_bootstrap_in(conn, &user.org_id, user.account.as_deref())?,
        };
        let mapping = bootstrapped
            .mapping
            .ok_or_else(|| BootstrapError::MissingTenantMapping {
                org_id: bootstrapped.tenant.org_id_str().to_string(),
            })?;

        let principal_id = self.config.principal_id(&user.user_id);
        let mut add = Vec::new();
        let mut remove = Vec::new();

        if !user.is_service_account {
            ensure_principal_with_user_id(conn, user, bootstrapped.tenant.id)?;

            add.push(membership_tuple(mapping.default_group_uuid, &principal_id));
            let admin_membership =
                membership_tuple(mapping.default_admin_group_uuid, &principal_id);
            if user.admin {
                add.push(admin_membership);
            } else {
                remove.push(admin_membership);
            }
        }

        let event = ReplicationEvent::new(
            ReplicationEventType::ExternalUserUpdate,
            self.config.partition_key.as_str(),
        )
        .with_info("principal_id", principal_id.as_str())
        .with_add(add)
        .with_remove(remove);
        self.replicator.replicate(conn, &event)?;

        Ok(bootstrapped)
    }

    fn deactivate(&self, conn: &Connection, user: &User) -> BootstrapResult<()> {
        let principal_id = self.config.principal_id(&user.user_id);
        let mut remove = Vec::new();

        if let Some(mapping) =
            SqliteTenantRepository::new(conn).get_mapping_by_org_id(&user.org_id)?
        {
            remove.push(membership_tuple(mapping.default_group_uuid, &principal_id));
            remove.push(membership_tuple(
                mapping.default_admin_group_uuid,
                &principal_id,
            ));
        }

        if let Some(principal) = SqlitePrincipalRepository::new(conn)
            .find_by_username_in_org(&user.username, &user.org_id)?
        {
            for group in remove_principal(conn, &principal)? {
                remove.push(membership_tuple(group.uuid, &principal_id));
            }
        }

        let event = ReplicationEvent::new(
            ReplicationEventType::ExternalUserUpdate,
            self.config.partition_key.as_str(),
        )
        .with_info("principal_id", principal_id.as_str())
        .with_remove(remove);
        self.replicator.replicate(conn, &event)?;
        Ok(())
    }
}

impl TenantBootstrapService for GraphTenantBootstrapService<'_> {
    fn upsert_user(
        &self,
        user: &User,
        bootstrapped: Option<&BootstrappedTenant>,
    ) -> BootstrapResult<Option<BootstrappedTenant>> {
        if !user.is_active {
            db::atomic(self.conn, |conn| self.deactivate(conn, user))?;
            return Ok(None);
        }

        if let Some(supplied) = bootstrapped {
            if supplied.mapping.is_none() {
                return Err(BootstrapError::MissingTenantMapping {
                    org_id: supplied.tenant.org_id_str().to_string(),
                });
            }
        }

        db::atomic(self.conn, |conn| self.activate(conn, user, bootstrapped)).map(Some)
    }
}

fn lost_bootstrap_race(err: &RepoError) -> bool {
    [
        UniqueConstraint::TenantOrgId,
        UniqueConstraint::TenantMapping,
        UniqueConstraint::BuiltInWorkspace,
    ]
    .iter()
    .any(|constraint| err.is_unique_violation(constraint))
}

fn read_bootstrapped(
    conn: &Connection,
    org_id: &str,
) -> BootstrapResult<Option<BootstrappedTenant>> {
    let tenants = SqliteTenantRepository::new(conn);
    let Some(tenant) = tenants.get_tenant_by_org_id(org_id)? else {
        return Ok(None);
    };
    Ok(tenants
        .get_mapping(tenant.id)?
        .map(|mapping| BootstrappedTenant {
            tenant,
            mapping: Some(mapping),
        }))
}

/// `group:{group} #member principal:{principal_id}`
fn membership_tuple(group: Uuid, principal_id: &str) -> Relationship {
    create_relationship(
        (RBAC_NAMESPACE, "group"),
        group.to_string(),
        (RBAC_NAMESPACE, "principal"),
        principal_id,
        "member",
    )
}
