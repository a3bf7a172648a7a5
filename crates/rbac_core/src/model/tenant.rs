//! Tenant, tenant mapping and bootstrap result models.
//!
//! # Invariants
//! - `org_id` is the stable external key; only the public tenant has none.
//! - A `TenantMapping` exists iff the tenant was bootstrapped with graph
//!   relations, and its four uuids never change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage identifier of one tenant row.
pub type TenantId = i64;

/// Organization identity and unit of isolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// External organization id. `None` only for the public tenant.
    pub org_id: Option<String>,
    /// Legacy account number, kept for callers that still key on it.
    pub account_id: Option<String>,
    pub tenant_name: String,
    /// Set once bootstrap for this tenant has committed.
    pub ready: bool,
}

impl Tenant {
    /// Returns the org id, or an empty string for the public tenant.
    pub fn org_id_str(&self) -> &str {
        self.org_id.as_deref().unwrap_or_default()
    }
}

/// Fields required to insert a tenant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTenant {
    pub org_id: Option<String>,
    pub account_id: Option<String>,
    pub tenant_name: String,
    pub ready: bool,
}

impl NewTenant {
    /// Tenant for `org_id` named after the account when one is known.
    pub fn for_org(org_id: impl Into<String>, account_id: Option<String>, ready: bool) -> Self {
        let org_id = org_id.into();
        let tenant_name = tenant_name_for(org_id.as_str(), account_id.as_deref());
        Self {
            org_id: Some(org_id),
            account_id,
            tenant_name,
            ready,
        }
    }
}

/// Derives the display name used for newly seen tenants.
///
/// - account present -> `acct{account}`
/// - otherwise -> `org{org_id}`
pub fn tenant_name_for(org_id: &str, account_id: Option<&str>) -> String {
    match account_id.map(str::trim).filter(|value| !value.is_empty()) {
        Some(account) => format!("acct{account}"),
        None => format!("org{org_id}"),
    }
}

/// Stable graph identifiers assigned to a tenant at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMapping {
    pub tenant_id: TenantId,
    pub default_group_uuid: Uuid,
    pub default_admin_group_uuid: Uuid,
    pub default_user_role_binding_uuid: Uuid,
    pub default_admin_role_binding_uuid: Uuid,
}

impl TenantMapping {
    /// Creates a mapping with four fresh uuids.
    pub fn generate(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            default_group_uuid: Uuid::new_v4(),
            default_admin_group_uuid: Uuid::new_v4(),
            default_user_role_binding_uuid: Uuid::new_v4(),
            default_admin_role_binding_uuid: Uuid::new_v4(),
        }
    }
}

/// Tenant plus its mapping, when the tenant has one.
///
/// The legacy bootstrap strategy never creates mappings and returns
/// `mapping: None`; the graph-aware strategy always returns `Some`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrappedTenant {
    pub tenant: Tenant,
    pub mapping: Option<TenantMapping>,
}
