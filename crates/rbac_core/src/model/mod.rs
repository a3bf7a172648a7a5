//! Relational domain model for tenants, workspaces, groups and principals.
//!
//! # Responsibility
//! - Define the records read and written by the bootstrap and workspace flows.
//! - Keep graph-facing identifiers (uuids) stable and separate from storage ids.
//!
//! # Invariants
//! - Every record exposed to the relation graph is identified by a uuid that
//!   never changes after creation.
//! - `TenantMapping` uuids are assigned once and never rewritten.

pub mod group;
pub mod principal;
pub mod tenant;
pub mod workspace;
