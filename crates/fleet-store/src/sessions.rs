//! Session table CRUD — the Session Registry.
//!
//! At most one live session per worker is enforced by the
//! `sessions_live_worker_idx` partial unique index created in
//! `lib.rs::migrate`. `insert_session` uses
//! `INSERT OR IGNORE`; a caller that sees zero rows affected reports
//! "already active" rather than retrying. Status transitions go through
//! `transition_session`, which issues `UPDATE ... WHERE status = ?expected`
//! so a concurrent terminate loses the race cleanly instead of
//! clobbering it.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use fleet_core::session_fsm::is_valid_transition;
use fleet_core::types::{Provider, Session, SessionStatus, ShutdownReason};

use crate::error::{Result, StoreError};
use crate::Store;

const SESSION_COLUMNS: &str = "id, worker_id, session_id, provider, status, started_at,
    last_activity, expires_at, terminated_at, duration_seconds, shutdown_reason, tunnel_url";

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let provider_str: String = row.get("provider")?;
    let status_str: String = row.get("status")?;
    let shutdown_reason_str: Option<String> = row.get("shutdown_reason")?;

    let provider: Provider = provider_str.parse().map_err(|e: fleet_core::FleetError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: SessionStatus = status_str.parse().map_err(|e: fleet_core::FleetError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let shutdown_reason: Option<ShutdownReason> = shutdown_reason_str
        .map(|s| s.parse())
        .transpose()
        .map_err(|e: fleet_core::FleetError| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let parse_ts = |s: String| -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };
    let parse_ts_opt = |s: Option<String>| -> Option<DateTime<Utc>> {
        s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    Ok(Session {
        id: row.get("id")?,
        worker_id: row.get("worker_id")?,
        session_id: row.get("session_id")?,
        provider,
        status,
        started_at: parse_ts(row.get("started_at")?),
        last_activity: parse_ts(row.get("last_activity")?),
        expires_at: parse_ts(row.get("expires_at")?),
        terminated_at: parse_ts_opt(row.get("terminated_at")?),
        duration_seconds: row.get("duration_seconds")?,
        shutdown_reason,
        tunnel_url: row.get("tunnel_url")?,
    })
}

/// Outcome of an attempted session insert, distinguishing the
/// already-live-session conflict path from a hard error.
pub enum InsertOutcome {
    Inserted(i64),
    AlreadyActive,
}

impl Store {
    /// Insert a new `starting` session row. If a live row already exists for
    /// this worker, the partial unique index causes the insert to be
    /// ignored; the caller reports "already active".
    pub fn insert_session(
        &self,
        worker_id: i64,
        session_id: &str,
        provider: Provider,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute(
            "INSERT OR IGNORE INTO sessions
                (worker_id, session_id, provider, status, started_at, last_activity,
                 expires_at, terminated_at, duration_seconds, shutdown_reason, tunnel_url)
             VALUES (?1, ?2, ?3, 'starting', ?4, ?4, ?5, NULL, 0, NULL, NULL)",
            params![
                worker_id,
                session_id,
                provider.as_str(),
                now.to_rfc3339(),
                expires_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            Ok(InsertOutcome::AlreadyActive)
        } else {
            Ok(InsertOutcome::Inserted(conn.last_insert_rowid()))
        }
    }

    pub fn get_session(&self, id: i64) -> Result<Session> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
            params![id],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("session {id}")),
            other => other.into(),
        })
    }

    /// The single live session for a worker, if any (enforced unique in the schema).
    pub fn live_session_for_worker(&self, worker_id: i64) -> Result<Option<Session>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE worker_id = ?1 AND status IN ('starting', 'active', 'idle')"
            ),
            params![worker_id],
            row_to_session,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_live_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status IN ('starting', 'active', 'idle')"
        ))?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ?1"
        ))?;
        let rows = stmt.query_map(params![status.as_str()], row_to_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// CAS transition: `UPDATE ... WHERE id = ? AND status = expected`.
    /// Returns `Ok(false)` when the guard failed (a concurrent writer beat
    /// us to it) rather than erroring — callers decide what "lost the race"
    /// means for them.
    pub fn transition_session(
        &self,
        session_id: i64,
        expected: SessionStatus,
        to: SessionStatus,
        now: DateTime<Utc>,
        tunnel_url: Option<&str>,
        shutdown_reason: Option<ShutdownReason>,
    ) -> Result<bool> {
        if !is_valid_transition(expected, to) {
            return Err(StoreError::Conflict(format!(
                "illegal session transition {expected} -> {to}"
            )));
        }
        let conn = self.conn.lock().expect("store mutex poisoned");
        let terminated_at = if to.is_terminal() {
            Some(now.to_rfc3339())
        } else {
            None
        };
        let changed = conn.execute(
            "UPDATE sessions SET
                status = ?3, last_activity = ?4, terminated_at = COALESCE(?5, terminated_at),
                tunnel_url = COALESCE(?6, tunnel_url), shutdown_reason = COALESCE(?7, shutdown_reason)
             WHERE id = ?1 AND status = ?2",
            params![
                session_id,
                expected.as_str(),
                to.as_str(),
                now.to_rfc3339(),
                terminated_at,
                tunnel_url,
                shutdown_reason.map(|r| r.as_str()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn touch_session_activity(&self, session_id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE sessions SET last_activity = ?2 WHERE id = ?1",
            params![session_id, now.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fleet_core::types::{Capabilities, Worker, WorkerStatus};

    fn insert_worker(store: &Store, provider: Provider, account_id: &str) -> i64 {
        let now = Utc::now();
        let w = Worker {
            id: 0,
            provider,
            account_id: account_id.to_string(),
            tunnel_url: None,
            status: WorkerStatus::Offline,
            capabilities: Capabilities::default(),
            auto_managed: true,
            last_used_at: None,
            session_started_at: None,
            session_duration_seconds: 0,
            max_session_duration_seconds: 0,
            weekly_usage_seconds: 0,
            max_weekly_seconds: None,
            week_started_at: None,
            cooldown_until: None,
            scheduled_stop_at: None,
            provider_limits: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        store.insert_worker(&w).unwrap()
    }

    #[test]
    fn partial_uniqueness_rejects_second_live_session() {
        let store = Store::open_in_memory().unwrap();
        let worker_id = insert_worker(&store, Provider::K, "kaggle-1");
        let now = Utc::now();
        let expires = now + Duration::hours(8);

        let first = store
            .insert_session(worker_id, "corr-1", Provider::K, now, expires)
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store
            .insert_session(worker_id, "corr-2", Provider::K, now, expires)
            .unwrap();
        assert!(matches!(second, InsertOutcome::AlreadyActive));
    }

    #[test]
    fn terminated_session_frees_the_slot() {
        let store = Store::open_in_memory().unwrap();
        let worker_id = insert_worker(&store, Provider::K, "kaggle-2");
        let now = Utc::now();
        let expires = now + Duration::hours(8);

        let id = match store
            .insert_session(worker_id, "corr-1", Provider::K, now, expires)
            .unwrap()
        {
            InsertOutcome::Inserted(id) => id,
            _ => panic!("expected insert"),
        };
        store
            .transition_session(
                id,
                SessionStatus::Starting,
                SessionStatus::Terminated,
                now,
                None,
                Some(ShutdownReason::StartupError),
            )
            .unwrap();

        let again = store
            .insert_session(worker_id, "corr-2", Provider::K, now, expires)
            .unwrap();
        assert!(matches!(again, InsertOutcome::Inserted(_)));
    }

    #[test]
    fn cas_transition_fails_on_stale_expected_status() {
        let store = Store::open_in_memory().unwrap();
        let worker_id = insert_worker(&store, Provider::K, "kaggle-3");
        let now = Utc::now();
        let expires = now + Duration::hours(8);
        let id = match store
            .insert_session(worker_id, "corr-1", Provider::K, now, expires)
            .unwrap()
        {
            InsertOutcome::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        // Move starting -> active.
        assert!(store
            .transition_session(id, SessionStatus::Starting, SessionStatus::Active, now, Some("https://tunnel"), None)
            .unwrap());

        // A stale caller still thinks it's `starting` — CAS must reject it.
        let stale = store
            .transition_session(id, SessionStatus::Starting, SessionStatus::Terminated, now, None, Some(ShutdownReason::ProviderError))
            .unwrap();
        assert!(!stale, "CAS guard must reject a stale expected status");
    }

    #[test]
    fn illegal_transition_out_of_terminal_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let worker_id = insert_worker(&store, Provider::K, "kaggle-4");
        let now = Utc::now();
        let expires = now + Duration::hours(8);
        let id = match store
            .insert_session(worker_id, "corr-1", Provider::K, now, expires)
            .unwrap()
        {
            InsertOutcome::Inserted(id) => id,
            _ => panic!("expected insert"),
        };
        store
            .transition_session(id, SessionStatus::Starting, SessionStatus::Terminated, now, None, Some(ShutdownReason::ManualStop))
            .unwrap();

        let result = store.transition_session(
            id,
            SessionStatus::Terminated,
            SessionStatus::Active,
            now,
            None,
            None,
        );
        assert!(result.is_err());
    }
}
