//! Replication sink contract and in-process implementations.
//!
//! # Responsibility
//! - Define the boundary between relational writes and the relation graph.
//! - Provide logging-only and in-memory sinks for embedding and tests.
//!
//! # Invariants
//! - `replicate` is called with the connection of the open transaction that
//!   performed the writes the event describes.
//! - An `Err` from `replicate` aborts that transaction.

use crate::config::ReplicatorKind;
use crate::relation::event::ReplicationEvent;
use crate::relation::outbox::OutboxReplicator;
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

pub type ReplicationResult<T> = Result<T, ReplicationError>;

#[derive(Debug)]
pub enum ReplicationError {
    /// Event could not be encoded for the transport.
    Serialize(serde_json::Error),
    /// Writing the event through the transaction failed.
    Db(rusqlite::Error),
    /// Sink refused the event.
    Rejected(String),
}

impl Display for ReplicationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(err) => write!(f, "failed to encode replication event: {err}"),
            Self::Db(err) => write!(f, "failed to persist replication event: {err}"),
            Self::Rejected(reason) => write!(f, "replication rejected: {reason}"),
        }
    }
}

impl Error for ReplicationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialize(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Rejected(_) => None,
        }
    }
}

impl From<serde_json::Error> for ReplicationError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialize(value)
    }
}

impl From<rusqlite::Error> for ReplicationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}

/// Sink for relationship changes produced by one relational transaction.
pub trait RelationReplicator: Send + Sync {
    /// Hands one event to the sink.
    ///
    /// `conn` is the transaction the caller is about to commit. Durable sinks
    /// must write through it so that the event commits or rolls back together
    /// with the relational rows.
    fn replicate(&self, conn: &Connection, event: &ReplicationEvent) -> ReplicationResult<()>;
}

/// Logs and drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReplicator;

impl RelationReplicator for NoopReplicator {
    fn replicate(&self, _conn: &Connection, event: &ReplicationEvent) -> ReplicationResult<()> {
        info!(
            "event=replicate module=relation status=skipped sink=noop type={} partition_key={} add={} remove={}",
            event.event_type,
            event.partition_key,
            event.add.len(),
            event.remove.len()
        );
        Ok(())
    }
}

/// Records events in memory.
///
/// Events are recorded at `replicate` time, so an event whose transaction is
/// later rolled back stays recorded. Use [`OutboxReplicator`] when emission
/// must follow the commit outcome.
#[derive(Debug, Default)]
pub struct InMemoryReplicator {
    events: Mutex<Vec<ReplicationEvent>>,
}

impl InMemoryReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of recorded events in emission order.
    pub fn events(&self) -> Vec<ReplicationEvent> {
        self.lock().clone()
    }

    /// Removes and returns recorded events.
    pub fn take(&self) -> Vec<ReplicationEvent> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReplicationEvent>> {
        // A poisoned lock only means a recording thread panicked; the vector
        // itself is still consistent.
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RelationReplicator for InMemoryReplicator {
    fn replicate(&self, _conn: &Connection, event: &ReplicationEvent) -> ReplicationResult<()> {
        self.lock().push(event.clone());
        Ok(())
    }
}

/// Builds the sink selected by configuration.
pub fn replicator_from_config(kind: ReplicatorKind) -> Arc<dyn RelationReplicator> {
    match kind {
        ReplicatorKind::Outbox => Arc::new(OutboxReplicator::new()),
        ReplicatorKind::Noop => Arc::new(NoopReplicator),
    }
}
