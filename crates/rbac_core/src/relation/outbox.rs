//! Transactional outbox for replication events.
//!
//! # Responsibility
//! - Persist each event as JSON in `replication_outbox` through the caller's
//!   transaction.
//! - Let an external transport drain pending rows in insertion order.
//!
//! # Invariants
//! - A row exists iff the transaction that produced the event committed.
//! - Pending rows are returned by ascending `id`.
//! - Delivery/retry semantics belong to the transport, not to this module.

use crate::relation::event::ReplicationEvent;
use crate::relation::replicator::{RelationReplicator, ReplicationError, ReplicationResult};
use log::debug;
use rusqlite::{params, Connection};

/// Outbox row waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: i64,
    pub event: ReplicationEvent,
    /// Epoch ms insert timestamp.
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxReplicator;

impl OutboxReplicator {
    pub fn new() -> Self {
        Self
    }

    /// Lists undelivered events, oldest first.
    pub fn pending_events(conn: &Connection, limit: u32) -> ReplicationResult<Vec<OutboxEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, payload, created_at
             FROM replication_outbox
             WHERE delivered_at IS NULL
             ORDER BY id ASC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([i64::from(limit)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let payload: String = row.get("payload")?;
            entries.push(OutboxEntry {
                id: row.get("id")?,
                event: serde_json::from_str(&payload)?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(entries)
    }

    /// Marks one row delivered. Returns `false` when it was already delivered
    /// or does not exist.
    pub fn mark_delivered(conn: &Connection, id: i64) -> ReplicationResult<bool> {
        let changed = conn.execute(
            "UPDATE replication_outbox
             SET delivered_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND delivered_at IS NULL;",
            [id],
        )?;
        Ok(changed == 1)
    }
}

impl RelationReplicator for OutboxReplicator {
    fn replicate(&self, conn: &Connection, event: &ReplicationEvent) -> ReplicationResult<()> {
        if conn.is_autocommit() {
            return Err(ReplicationError::Rejected(
                "outbox writes require an open transaction".to_string(),
            ));
        }

        let payload = serde_json::to_string(event)?;
        conn.execute(
            "INSERT INTO replication_outbox (event_type, partition_key, payload)
             VALUES (?1, ?2, ?3);",
            params![
                event.event_type.as_str(),
                event.partition_key.as_str(),
                payload
            ],
        )?;
        debug!(
            "event=replicate module=relation status=ok sink=outbox type={} outbox_id={}",
            event.event_type,
            conn.last_insert_rowid()
        );
        Ok(())
    }
}
