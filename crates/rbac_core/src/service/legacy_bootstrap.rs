//! Relational-only bootstrap strategy.
//!
//! # Invariants
//! - Never replicates and never creates tenant mappings.
//! - A missing tenant or principal on deactivation is already-absent, not an
//!   error.

use crate::config::BootstrapConfig;
use crate::db;
use crate::model::principal::User;
use crate::model::tenant::{BootstrappedTenant, NewTenant};
use crate::repo::principal_repo::{PrincipalRepository, SqlitePrincipalRepository};
use crate::repo::tenant_repo::{SqliteTenantRepository, TenantRepository};
use crate::service::bootstrap_service::{
    ensure_principal_with_user_id, remove_principal, BootstrapResult, TenantBootstrapService,
};
use log::info;
use rusqlite::Connection;

pub struct LegacyTenantBootstrapService<'conn> {
    conn: &'conn Connection,
    add_user_id: bool,
}

impl<'conn> LegacyTenantBootstrapService<'conn> {
    pub fn try_new(conn: &'conn Connection, config: &BootstrapConfig) -> BootstrapResult<Self> {
        db::ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            add_user_id: config.legacy_add_user_id,
        })
    }

    fn activate(&self, conn: &Connection, user: &User) -> BootstrapResult<BootstrappedTenant> {
        let (tenant, created) = SqliteTenantRepository::new(conn).get_or_create_tenant(
            &NewTenant::for_org(user.org_id.as_str(), user.account.clone(), true),
        )?;
        if created {
            info!(
                "event=tenant_create module=bootstrap status=ok strategy=legacy tenant_id={}",
                tenant.id
            );
        }
        if self.add_user_id {
            ensure_principal_with_user_id(conn, user, tenant.id)?;
        }
        Ok(BootstrappedTenant {
            tenant,
            mapping: None,
        })
    }

    fn deactivate(&self, conn: &Connection, user: &User) -> BootstrapResult<()> {
        let Some(tenant) = SqliteTenantRepository::new(conn).get_tenant_by_org_id(&user.org_id)?
        else {
            return Ok(());
        };
        let Some(principal) =
            SqlitePrincipalRepository::new(conn).find_by_username(&user.username, tenant.id)?
        else {
            return Ok(());
        };
        remove_principal(conn, &principal)?;
        Ok(())
    }
}

impl TenantBootstrapService for LegacyTenantBootstrapService<'_> {
    fn upsert_user(
        &self,
        user: &User,
        _bootstrapped: Option<&BootstrappedTenant>,
    ) -> BootstrapResult<Option<BootstrappedTenant>> {
        db::atomic(self.conn, |conn| {
            if user.is_active {
                self.activate(conn, user).map(Some)
            } else {
                self.deactivate(conn, user).map(|()| None)
            }
        })
    }
}
