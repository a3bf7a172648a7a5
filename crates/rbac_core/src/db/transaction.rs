//! Transaction boundary shared by every state-changing operation.
//!
//! # Invariants
//! - Outermost call opens an `IMMEDIATE` transaction, so the write lock is
//!   held from the first read of a check-then-write sequence.
//! - Nested calls run inside a uniquely named savepoint and roll back only
//!   their own writes on error.
//! - `Err` from the operation always rolls back; nothing it wrote survives.

use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Runs `op` atomically on `conn`.
///
/// On an autocommit connection this opens and commits a transaction. When the
/// connection is already inside a transaction (for example a service call
/// made from another service call) a savepoint is used instead.
pub fn atomic<T, E, F>(conn: &Connection, op: F) -> Result<T, E>
where
    F: FnOnce(&Connection) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    if conn.is_autocommit() {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        return Ok(value);
    }

    let name = format!(
        "rbac_sp_{}",
        SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    conn.execute_batch(&format!("SAVEPOINT {name};"))?;
    match op(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name};"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name};"))
            {
                warn!(
                    "event=savepoint_rollback module=db status=error savepoint={name} error={rollback_err}"
                );
            }
            Err(err)
        }
    }
}
