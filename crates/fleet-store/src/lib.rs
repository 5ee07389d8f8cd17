//! Durable state schema and Session Registry.
//!
//! A single `rusqlite::Connection` wrapped in `Store`: open-or-create, run
//! migrations, expose typed CRUD methods. Row-level CAS
//! (`WHERE status = expected`) is the mutual-exclusion primitive every
//! mutator that changes a live status goes through.

mod alternation;
mod error;
mod reconcile;
mod sessions;
mod workers;

pub use error::{Result, StoreError};
pub use reconcile::ReconciliationReport;
pub use sessions::InsertOutcome;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

/// SQLite-backed persistence for workers, sessions, and alternation state.
///
/// The connection is wrapped in a `Mutex` because `rusqlite::Connection` is
/// `!Sync`; callers needing concurrent access share a `Store` behind an
/// `Arc`. Row-level CAS predicates (not this mutex) are the authoritative
/// concurrency primitive — the mutex only serializes access to the single
/// OS-level sqlite connection.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database at the given filesystem path and run
    /// migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database. Used by tests and dry-run tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS workers (
                id                          INTEGER PRIMARY KEY AUTOINCREMENT,
                provider                    TEXT NOT NULL,
                account_id                  TEXT NOT NULL,
                tunnel_url                  TEXT,
                status                      TEXT NOT NULL,
                capabilities                TEXT NOT NULL DEFAULT '{}',
                auto_managed                INTEGER NOT NULL DEFAULT 1,
                last_used_at                TEXT,
                session_started_at          TEXT,
                session_duration_seconds    INTEGER NOT NULL DEFAULT 0,
                max_session_duration_seconds INTEGER NOT NULL DEFAULT 0,
                weekly_usage_seconds        INTEGER NOT NULL DEFAULT 0,
                max_weekly_seconds          INTEGER,
                week_started_at             TEXT,
                cooldown_until              TEXT,
                scheduled_stop_at           TEXT,
                provider_limits             TEXT NOT NULL DEFAULT '{}',
                created_at                  TEXT NOT NULL,
                updated_at                  TEXT NOT NULL,
                UNIQUE(provider, account_id)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                worker_id        INTEGER NOT NULL REFERENCES workers(id),
                session_id       TEXT NOT NULL,
                provider         TEXT NOT NULL,
                status           TEXT NOT NULL,
                started_at       TEXT NOT NULL,
                last_activity    TEXT NOT NULL,
                expires_at       TEXT NOT NULL,
                terminated_at    TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                shutdown_reason  TEXT,
                tunnel_url       TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS sessions_live_worker_idx
                ON sessions(worker_id)
                WHERE status IN ('starting', 'active', 'idle');

            CREATE TABLE IF NOT EXISTS alternation_state (
                id              INTEGER PRIMARY KEY CHECK (id = 1),
                last_started    TEXT,
                last_stopped    TEXT,
                start_history   TEXT NOT NULL DEFAULT '[]',
                stop_history    TEXT NOT NULL DEFAULT '[]',
                override_count  INTEGER NOT NULL DEFAULT 0,
                updated_at      TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.migrate().unwrap();
        store.migrate().unwrap();
    }
}
