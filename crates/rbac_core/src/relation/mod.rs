//! Relationship tuples and their replication to the relation graph.
//!
//! # Responsibility
//! - Build tuple values with one shared constructor.
//! - Model replication events and the sinks that receive them.
//!
//! # Invariants
//! - Tuples are never stored relationally except inside outbox payloads.

pub mod event;
pub mod outbox;
pub mod replicator;
pub mod tuple;
