//! Injected configuration for bootstrap services and logging.
//!
//! # Responsibility
//! - Carry feature switches and naming constants that services would
//!   otherwise read from process-wide settings.
//! - Parse JSON configuration with per-field defaults.
//!
//! # Invariants
//! - Services receive a validated `BootstrapConfig` at construction and never
//!   consult globals afterwards.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_PRINCIPAL_USER_DOMAIN: &str = "redhat";
pub const DEFAULT_ENVIRONMENT_NAME: &str = "stage";
pub const DEFAULT_PUBLIC_TENANT_NAME: &str = "public";
pub const DEFAULT_PARTITION_KEY: &str = "rbactodo";

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid configuration: {err}"),
            Self::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Which tenant bootstrap implementation the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStrategy {
    /// Relational rows only; nothing is replicated.
    Legacy,
    /// Relational rows plus relation tuples in the same transaction.
    #[default]
    GraphAware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicatorKind {
    /// Transactional outbox table.
    #[default]
    Outbox,
    /// Log and drop.
    Noop,
}

/// Configuration for tenant bootstrap and workspace services.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub strategy: BootstrapStrategy,
    /// Legacy strategy: also create principals and keep `user_id` in sync.
    pub legacy_add_user_id: bool,
    /// Prefix for principal and tenant ids in the relation graph.
    pub principal_user_domain: String,
    /// Platform object every tenant is attached to.
    pub environment_name: String,
    /// Tenant holding the system default groups and policies.
    pub public_tenant_name: String,
    /// Transport ordering key stamped on every event.
    pub partition_key: String,
    pub replicator: ReplicatorKind,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            strategy: BootstrapStrategy::default(),
            legacy_add_user_id: false,
            principal_user_domain: DEFAULT_PRINCIPAL_USER_DOMAIN.to_string(),
            environment_name: DEFAULT_ENVIRONMENT_NAME.to_string(),
            public_tenant_name: DEFAULT_PUBLIC_TENANT_NAME.to_string(),
            partition_key: DEFAULT_PARTITION_KEY.to_string(),
            replicator: ReplicatorKind::default(),
        }
    }
}

impl BootstrapConfig {
    /// Parses and validates JSON configuration. Missing fields use defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("principal_user_domain", &self.principal_user_domain),
            ("environment_name", &self.environment_name),
            ("public_tenant_name", &self.public_tenant_name),
            ("partition_key", &self.partition_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be blank",
                });
            }
        }
        if self.principal_user_domain.contains(':') {
            return Err(ConfigError::Invalid {
                field: "principal_user_domain",
                reason: "must not contain `:`",
            });
        }
        Ok(())
    }

    /// Graph id of a principal: `{domain}:{user_id}`.
    pub fn principal_id(&self, user_id: &str) -> String {
        format!("{}:{user_id}", self.principal_user_domain)
    }

    /// Graph id of a tenant: `{domain}:{org_id}`.
    pub fn tenant_resource_id(&self, org_id: &str) -> String {
        format!("{}:{org_id}", self.principal_user_domain)
    }
}

/// File logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: std::env::temp_dir().join("rbac_core_logs"),
        }
    }
}
