//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls and replication into use-case level APIs.
//! - Own the transaction boundary of every state-changing operation.

pub mod bootstrap_service;
pub mod graph_bootstrap;
pub mod legacy_bootstrap;
pub mod policy_resolver;
pub mod workspace_service;
