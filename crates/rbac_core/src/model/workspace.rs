//! Workspace hierarchy model.
//!
//! # Invariants
//! - Each tenant has exactly one `Root` and one `Default` workspace once
//!   bootstrapped; `Default` is parented to `Root`.
//! - `parent_uuid` is `None` iff the workspace is `Root`.
//! - Only `Standard` workspaces are created, updated or deleted by API
//!   callers.

use crate::model::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable workspace identifier.
pub type WorkspaceId = Uuid;

pub const ROOT_WORKSPACE_NAME: &str = "Root Workspace";
pub const DEFAULT_WORKSPACE_NAME: &str = "Default Workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceType {
    /// Tenant-level root, created at bootstrap.
    Root,
    /// Child of root that receives the default role bindings.
    Default,
    /// User-managed workspace.
    Standard,
}

impl WorkspaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Default => "default",
            Self::Standard => "standard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "root" => Some(Self::Root),
            "default" => Some(Self::Default),
            "standard" => Some(Self::Standard),
            _ => None,
        }
    }
}

impl Display for WorkspaceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workspace read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub uuid: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: WorkspaceType,
    pub parent_uuid: Option<WorkspaceId>,
    pub tenant_id: TenantId,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub modified_at: i64,
}

/// Insert model for one workspace row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceDraft {
    pub uuid: WorkspaceId,
    pub name: String,
    pub description: Option<String>,
    pub kind: WorkspaceType,
    pub parent_uuid: Option<WorkspaceId>,
    pub tenant_id: TenantId,
}

/// Caller request for a user-managed workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewWorkspace {
    pub name: String,
    pub description: Option<String>,
    /// Parent in the same tenant; `None` places it under the default workspace.
    pub parent_uuid: Option<WorkspaceId>,
}

/// Filter for listing workspaces of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceListQuery {
    pub kind: Option<WorkspaceType>,
    /// Case-insensitive exact name match. Blank means no filter.
    pub name: Option<String>,
}

/// Changes to a standard workspace. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// New parent in the same tenant. Must not be the workspace itself or one
    /// of its descendants.
    pub parent_uuid: Option<WorkspaceId>,
}

/// Root and default workspaces created for a tenant at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltInWorkspaces {
    pub root: Workspace,
    pub default: Workspace,
}
