//! Tenant bootstrap and relation dual-write core.
//! This crate is the single source of truth for tenant, workspace and
//! membership invariants, and for the tuples replicated from them.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod relation;
pub mod repo;
pub mod service;

pub use config::{BootstrapConfig, BootstrapStrategy, ConfigError, LoggingConfig, ReplicatorKind};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::principal::User;
pub use model::tenant::{BootstrappedTenant, Tenant, TenantMapping};
pub use model::workspace::{
    NewWorkspace, Workspace, WorkspaceListQuery, WorkspaceType, WorkspaceUpdate,
};
pub use relation::event::{ReplicationEvent, ReplicationEventType};
pub use relation::outbox::{OutboxEntry, OutboxReplicator};
pub use relation::replicator::{
    replicator_from_config, InMemoryReplicator, NoopReplicator, RelationReplicator,
    ReplicationError,
};
pub use relation::tuple::{create_relationship, create_relationship_with_subrelation, Relationship};
pub use repo::{RepoError, RepoResult, UniqueConstraint};
pub use service::bootstrap_service::{
    tenant_bootstrap_service, BootstrapError, BootstrapResult, TenantBootstrapService,
};
pub use service::graph_bootstrap::GraphTenantBootstrapService;
pub use service::legacy_bootstrap::LegacyTenantBootstrapService;
pub use service::policy_resolver::DefaultPolicyResolver;
pub use service::workspace_service::{WorkspaceService, WorkspaceServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
