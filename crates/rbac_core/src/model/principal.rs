//! Principal record and the user input that drives it.

use crate::model::tenant::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalType {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "service-account")]
    ServiceAccount,
}

impl PrincipalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ServiceAccount => "service-account",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "service-account" => Some(Self::ServiceAccount),
            _ => None,
        }
    }
}

/// Tenant-scoped user identity, keyed by `(username, tenant_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub uuid: Uuid,
    pub username: String,
    /// External identity-provider user id.
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: PrincipalType,
    pub tenant_id: TenantId,
}

/// User as reported by the identity provider on activation/deactivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub user_id: String,
    pub org_id: String,
    pub account: Option<String>,
    pub is_active: bool,
    pub admin: bool,
    pub is_service_account: bool,
}

impl User {
    /// Active, non-admin, non-service-account user.
    pub fn active(
        org_id: impl Into<String>,
        username: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            user_id: user_id.into(),
            org_id: org_id.into(),
            account: None,
            is_active: true,
            admin: false,
            is_service_account: false,
        }
    }
}
