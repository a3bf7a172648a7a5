//! Tenant and tenant mapping persistence.
//!
//! # Invariants
//! - `org_id` is unique; `get_or_create_tenant` never inserts a second row for
//!   the same org, even when it loses an insert race.
//! - Mappings are insert-only (an `UPDATE` trigger aborts rewrites).

use crate::model::tenant::{NewTenant, Tenant, TenantId, TenantMapping};
use crate::repo::{bool_to_int, parse_flag, parse_uuid, RepoError, RepoResult, UniqueConstraint};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TENANT_SELECT_SQL: &str = "SELECT
    id,
    org_id,
    account_id,
    tenant_name,
    ready
FROM tenants";

const MAPPING_SELECT_SQL: &str = "SELECT
    tenant_id,
    default_group_uuid,
    default_admin_group_uuid,
    default_user_role_binding_uuid,
    default_admin_role_binding_uuid
FROM tenant_mappings";

pub trait TenantRepository {
    fn create_tenant(&self, tenant: &NewTenant) -> RepoResult<Tenant>;
    /// Returns the tenant for `org_id`, inserting `defaults` when absent.
    /// The flag is `true` when this call inserted the row.
    fn get_or_create_tenant(&self, defaults: &NewTenant) -> RepoResult<(Tenant, bool)>;
    fn get_tenant_by_org_id(&self, org_id: &str) -> RepoResult<Option<Tenant>>;
    fn get_tenant_by_name(&self, tenant_name: &str) -> RepoResult<Option<Tenant>>;
    fn mark_ready(&self, tenant_id: TenantId) -> RepoResult<()>;
    fn create_mapping(&self, mapping: &TenantMapping) -> RepoResult<TenantMapping>;
    fn get_mapping(&self, tenant_id: TenantId) -> RepoResult<Option<TenantMapping>>;
    fn get_mapping_by_org_id(&self, org_id: &str) -> RepoResult<Option<TenantMapping>>;
}

pub struct SqliteTenantRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTenantRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_tenant(&self, id: TenantId) -> RepoResult<Tenant> {
        self.conn
            .query_row(
                &format!("{TENANT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| Ok(parse_tenant_row(row)),
            )
            .optional()?
            .ok_or_else(|| RepoError::not_found("tenant", id))?
    }
}

impl TenantRepository for SqliteTenantRepository<'_> {
    fn create_tenant(&self, tenant: &NewTenant) -> RepoResult<Tenant> {
        self.conn.execute(
            "INSERT INTO tenants (org_id, account_id, tenant_name, ready)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                tenant.org_id.as_deref(),
                tenant.account_id.as_deref(),
                tenant.tenant_name.as_str(),
                bool_to_int(tenant.ready),
            ],
        )?;
        self.load_tenant(self.conn.last_insert_rowid())
    }

    fn get_or_create_tenant(&self, defaults: &NewTenant) -> RepoResult<(Tenant, bool)> {
        let org_id = defaults.org_id.as_deref().ok_or_else(|| {
            RepoError::InvalidData("get_or_create_tenant requires an org_id".to_string())
        })?;

        if let Some(existing) = self.get_tenant_by_org_id(org_id)? {
            return Ok((existing, false));
        }

        match self.create_tenant(defaults) {
            Ok(created) => Ok((created, true)),
            Err(err) if err.is_unique_violation(&UniqueConstraint::TenantOrgId) => {
                let existing = self
                    .get_tenant_by_org_id(org_id)?
                    .ok_or_else(|| RepoError::not_found("tenant", org_id))?;
                Ok((existing, false))
            }
            Err(err) => Err(err),
        }
    }

    fn get_tenant_by_org_id(&self, org_id: &str) -> RepoResult<Option<Tenant>> {
        self.conn
            .query_row(
                &format!("{TENANT_SELECT_SQL} WHERE org_id = ?1;"),
                [org_id],
                |row| Ok(parse_tenant_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_tenant_by_name(&self, tenant_name: &str) -> RepoResult<Option<Tenant>> {
        self.conn
            .query_row(
                &format!("{TENANT_SELECT_SQL} WHERE tenant_name = ?1 ORDER BY id ASC LIMIT 1;"),
                [tenant_name],
                |row| Ok(parse_tenant_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn mark_ready(&self, tenant_id: TenantId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("UPDATE tenants SET ready = 1 WHERE id = ?1;", [tenant_id])?;
        if changed == 0 {
            return Err(RepoError::not_found("tenant", tenant_id));
        }
        Ok(())
    }

    fn create_mapping(&self, mapping: &TenantMapping) -> RepoResult<TenantMapping> {
        self.conn.execute(
            "INSERT INTO tenant_mappings (
                tenant_id,
                default_group_uuid,
                default_admin_group_uuid,
                default_user_role_binding_uuid,
                default_admin_role_binding_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                mapping.tenant_id,
                mapping.default_group_uuid.to_string(),
                mapping.default_admin_group_uuid.to_string(),
                mapping.default_user_role_binding_uuid.to_string(),
                mapping.default_admin_role_binding_uuid.to_string(),
            ],
        )?;
        Ok(*mapping)
    }

    fn get_mapping(&self, tenant_id: TenantId) -> RepoResult<Option<TenantMapping>> {
        self.conn
            .query_row(
                &format!("{MAPPING_SELECT_SQL} WHERE tenant_id = ?1;"),
                [tenant_id],
                |row| Ok(parse_mapping_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_mapping_by_org_id(&self, org_id: &str) -> RepoResult<Option<TenantMapping>> {
        self.conn
            .query_row(
                &format!(
                    "{MAPPING_SELECT_SQL}
                     WHERE tenant_id = (SELECT id FROM tenants WHERE org_id = ?1);"
                ),
                [org_id],
                |row| Ok(parse_mapping_row(row)),
            )
            .optional()?
            .transpose()
    }
}

fn parse_tenant_row(row: &Row<'_>) -> RepoResult<Tenant> {
    Ok(Tenant {
        id: row.get("id")?,
        org_id: row.get("org_id")?,
        account_id: row.get("account_id")?,
        tenant_name: row.get("tenant_name")?,
        ready: parse_flag(row.get("ready")?, "tenants.ready")?,
    })
}

fn parse_mapping_row(row: &Row<'_>) -> RepoResult<TenantMapping> {
    let uuid_column = |column: &'static str| -> RepoResult<uuid::Uuid> {
        let value: String = row.get(column)?;
        parse_uuid(&value, column)
    };

    Ok(TenantMapping {
        tenant_id: row.get("tenant_id")?,
        default_group_uuid: uuid_column("default_group_uuid")?,
        default_admin_group_uuid: uuid_column("default_admin_group_uuid")?,
        default_user_role_binding_uuid: uuid_column("default_user_role_binding_uuid")?,
        default_admin_role_binding_uuid: uuid_column("default_admin_role_binding_uuid")?,
    })
}
