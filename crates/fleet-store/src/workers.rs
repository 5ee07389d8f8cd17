//! Worker table CRUD. Identity is `(provider, account_id)`, enforced by the
//! `UNIQUE(provider, account_id)` constraint in the schema.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use fleet_core::types::{Capabilities, Provider, Worker, WorkerStatus};

use crate::error::{Result, StoreError};
use crate::Store;

fn row_to_worker(row: &Row) -> rusqlite::Result<Worker> {
    let provider_str: String = row.get("provider")?;
    let status_str: String = row.get("status")?;
    let capabilities_str: String = row.get("capabilities")?;
    let provider_limits_str: String = row.get("provider_limits")?;

    let provider: Provider = provider_str
        .parse()
        .map_err(|e: fleet_core::FleetError| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;
    let status: WorkerStatus = status_str.parse().map_err(|e: fleet_core::FleetError| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let capabilities: Capabilities =
        serde_json::from_str(&capabilities_str).unwrap_or_default();
    let provider_limits: serde_json::Value =
        serde_json::from_str(&provider_limits_str).unwrap_or(serde_json::Value::Null);

    let parse_ts = |s: Option<String>| -> Option<DateTime<Utc>> {
        s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    };

    Ok(Worker {
        id: row.get("id")?,
        provider,
        account_id: row.get("account_id")?,
        tunnel_url: row.get("tunnel_url")?,
        status,
        capabilities,
        auto_managed: row.get::<_, i64>("auto_managed")? != 0,
        last_used_at: parse_ts(row.get("last_used_at")?),
        session_started_at: parse_ts(row.get("session_started_at")?),
        session_duration_seconds: row.get("session_duration_seconds")?,
        max_session_duration_seconds: row.get("max_session_duration_seconds")?,
        weekly_usage_seconds: row.get("weekly_usage_seconds")?,
        max_weekly_seconds: row.get("max_weekly_seconds")?,
        week_started_at: parse_ts(row.get("week_started_at")?),
        cooldown_until: parse_ts(row.get("cooldown_until")?),
        scheduled_stop_at: parse_ts(row.get("scheduled_stop_at")?),
        provider_limits,
        created_at: parse_ts(row.get("created_at")?).unwrap_or_else(Utc::now),
        updated_at: parse_ts(row.get("updated_at")?).unwrap_or_else(Utc::now),
    })
}

const WORKER_COLUMNS: &str = "id, provider, account_id, tunnel_url, status, capabilities,
     auto_managed, last_used_at, session_started_at, session_duration_seconds,
     max_session_duration_seconds, weekly_usage_seconds, max_weekly_seconds,
     week_started_at, cooldown_until, scheduled_stop_at, provider_limits,
     created_at, updated_at";

impl Store {
    /// Insert a new auto-discovered worker row with `status = offline`.
    /// Returns the assigned id.
    pub fn insert_worker(&self, worker: &Worker) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO workers
                (provider, account_id, tunnel_url, status, capabilities, auto_managed,
                 last_used_at, session_started_at, session_duration_seconds,
                 max_session_duration_seconds, weekly_usage_seconds, max_weekly_seconds,
                 week_started_at, cooldown_until, scheduled_stop_at, provider_limits,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                worker.provider.as_str(),
                worker.account_id,
                worker.tunnel_url,
                worker.status.as_str(),
                serde_json::to_string(&worker.capabilities)?,
                worker.auto_managed as i64,
                worker.last_used_at.map(|d| d.to_rfc3339()),
                worker.session_started_at.map(|d| d.to_rfc3339()),
                worker.session_duration_seconds,
                worker.max_session_duration_seconds,
                worker.weekly_usage_seconds,
                worker.max_weekly_seconds,
                worker.week_started_at.map(|d| d.to_rfc3339()),
                worker.cooldown_until.map(|d| d.to_rfc3339()),
                worker.scheduled_stop_at.map(|d| d.to_rfc3339()),
                serde_json::to_string(&worker.provider_limits)?,
                worker.created_at.to_rfc3339(),
                worker.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_worker(&self, id: i64) -> Result<Worker> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1"),
            params![id],
            row_to_worker,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("worker {id}"))
            }
            other => other.into(),
        })
    }

    pub fn find_worker(&self, provider: Provider, account_id: &str) -> Result<Option<Worker>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!(
                "SELECT {WORKER_COLUMNS} FROM workers WHERE provider = ?1 AND account_id = ?2"
            ),
            params![provider.as_str(), account_id],
            row_to_worker,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_workers(&self) -> Result<Vec<Worker>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {WORKER_COLUMNS} FROM workers"))?;
        let rows = stmt.query_map([], row_to_worker)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_auto_managed_workers(&self) -> Result<Vec<Worker>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE auto_managed = 1"
        ))?;
        let rows = stmt.query_map([], row_to_worker)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_workers_by_provider(&self, provider: Provider) -> Result<Vec<Worker>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE provider = ?1"
        ))?;
        let rows = stmt.query_map(params![provider.as_str()], row_to_worker)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Full-row replace, used after a pure `fleet_core` transform produced a
    /// new `Worker` value (e.g. `quota::start_session`).
    pub fn save_worker(&self, worker: &Worker) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE workers SET
                tunnel_url = ?2, status = ?3, capabilities = ?4, auto_managed = ?5,
                last_used_at = ?6, session_started_at = ?7, session_duration_seconds = ?8,
                max_session_duration_seconds = ?9, weekly_usage_seconds = ?10,
                max_weekly_seconds = ?11, week_started_at = ?12, cooldown_until = ?13,
                scheduled_stop_at = ?14, provider_limits = ?15, updated_at = ?16
             WHERE id = ?1",
            params![
                worker.id,
                worker.tunnel_url,
                worker.status.as_str(),
                serde_json::to_string(&worker.capabilities)?,
                worker.auto_managed as i64,
                worker.last_used_at.map(|d| d.to_rfc3339()),
                worker.session_started_at.map(|d| d.to_rfc3339()),
                worker.session_duration_seconds,
                worker.max_session_duration_seconds,
                worker.weekly_usage_seconds,
                worker.max_weekly_seconds,
                worker.week_started_at.map(|d| d.to_rfc3339()),
                worker.cooldown_until.map(|d| d.to_rfc3339()),
                worker.scheduled_stop_at.map(|d| d.to_rfc3339()),
                serde_json::to_string(&worker.provider_limits)?,
                worker.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Durable `lastUsedAt` write — the sole source of truth the idle
    /// watcher reads from.
    pub fn touch_worker_last_used(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE workers SET last_used_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_worker(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM workers WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_worker(provider: Provider, account_id: &str) -> Worker {
        let now = Utc::now();
        Worker {
            id: 0,
            provider,
            account_id: account_id.to_string(),
            tunnel_url: Some(Worker::placeholder_tunnel(provider, account_id)),
            status: WorkerStatus::Offline,
            capabilities: Default::default(),
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
        }
    }

    #[test]
    fn insert_and_fetch_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let w = new_worker(Provider::K, "kaggle-1");
        let id = store.insert_worker(&w).unwrap();
        let fetched = store.get_worker(id).unwrap();
        assert_eq!(fetched.account_id, "kaggle-1");
        assert_eq!(fetched.provider, Provider::K);
        assert_eq!(fetched.status, WorkerStatus::Offline);
    }

    #[test]
    fn unique_provider_account_constraint_enforced() {
        let store = Store::open_in_memory().unwrap();
        let w = new_worker(Provider::C, "colab-1");
        store.insert_worker(&w).unwrap();
        let dup = store.insert_worker(&w);
        assert!(dup.is_err());
    }

    #[test]
    fn find_worker_returns_none_for_missing() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_worker(Provider::C, "nope").unwrap().is_none());
    }

    #[test]
    fn delete_worker_removes_row() {
        let store = Store::open_in_memory().unwrap();
        let id = store.insert_worker(&new_worker(Provider::K, "kaggle-2")).unwrap();
        store.delete_worker(id).unwrap();
        assert!(matches!(store.get_worker(id), Err(StoreError::NotFound(_))));
    }
}
