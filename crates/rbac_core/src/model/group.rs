//! Group and policy models.

use crate::model::tenant::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant-scoped principal collection.
///
/// `platform_default`/`admin_default` mark default-access groups; `system`
/// distinguishes built-in groups from tenant-customized copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tenant_id: TenantId,
    pub platform_default: bool,
    pub admin_default: bool,
    pub system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub tenant_id: TenantId,
    pub platform_default: bool,
    pub admin_default: bool,
    pub system: bool,
}

impl NewGroup {
    /// Plain tenant group with no default/system flags.
    pub fn custom(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tenant_id,
            platform_default: false,
            admin_default: false,
            system: false,
        }
    }
}

/// Policy attached to a group. The uuid of a system default group's policy
/// is the role id bound by default access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub system: bool,
    pub tenant_id: TenantId,
    pub group_id: i64,
}
