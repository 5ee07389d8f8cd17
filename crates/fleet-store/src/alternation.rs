//! Single-row alternation state persistence.
//!
//! `ensure_row` does an atomic `INSERT OR IGNORE` of the singleton row so
//! concurrent process boots never race to create it twice; all reads and
//! writes thereafter go through the `id = 1` row.

use chrono::Utc;
use rusqlite::{params, Row};

use fleet_core::alternation::{AlternationEvent, AlternationState};
use fleet_core::types::Provider;

use crate::error::Result;
use crate::Store;

fn event_opt_to_json(event: &Option<AlternationEvent>) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

fn history_to_json(history: &[AlternationEvent]) -> Result<String> {
    Ok(serde_json::to_string(history)?)
}

fn row_to_state(row: &Row) -> rusqlite::Result<AlternationState> {
    let last_started_str: Option<String> = row.get("last_started")?;
    let last_stopped_str: Option<String> = row.get("last_stopped")?;
    let start_history_str: String = row.get("start_history")?;
    let stop_history_str: String = row.get("stop_history")?;

    let last_started: Option<AlternationEvent> = last_started_str
        .and_then(|s| serde_json::from_str(&s).ok());
    let last_stopped: Option<AlternationEvent> = last_stopped_str
        .and_then(|s| serde_json::from_str(&s).ok());
    let start_history: Vec<AlternationEvent> =
        serde_json::from_str(&start_history_str).unwrap_or_default();
    let stop_history: Vec<AlternationEvent> =
        serde_json::from_str(&stop_history_str).unwrap_or_default();

    Ok(AlternationState {
        last_started,
        last_stopped,
        start_history,
        stop_history,
        override_count: row.get::<_, i64>("override_count")? as u64,
    })
}

impl Store {
    /// Atomic upsert on initialization — safe to call from every process at
    /// boot without risking a duplicate singleton row.
    pub fn ensure_alternation_row(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO alternation_state
                (id, last_started, last_stopped, start_history, stop_history, override_count, updated_at)
             VALUES (1, NULL, NULL, '[]', '[]', 0, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_alternation_state(&self) -> Result<AlternationState> {
        self.ensure_alternation_row()?;
        let conn = self.conn.lock().expect("store mutex poisoned");
        let state = conn.query_row(
            "SELECT last_started, last_stopped, start_history, stop_history, override_count
             FROM alternation_state WHERE id = 1",
            [],
            row_to_state,
        )?;
        Ok(state)
    }

    pub fn save_alternation_state(&self, state: &AlternationState) -> Result<()> {
        let last_started = event_opt_to_json(&state.last_started)?;
        let last_stopped = event_opt_to_json(&state.last_stopped)?;
        let start_history = history_to_json(&state.start_history)?;
        let stop_history = history_to_json(&state.stop_history)?;
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "UPDATE alternation_state SET
                last_started = ?1, last_stopped = ?2, start_history = ?3,
                stop_history = ?4, override_count = ?5, updated_at = ?6
             WHERE id = 1",
            params![
                last_started,
                last_stopped,
                start_history,
                stop_history,
                state.override_count as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// `nextProvider()` read directly from the durable row, for callers
    /// (the quota monitor's dual-exhaustion scan) that only need the one
    /// field and don't want to round-trip the full JSON history.
    pub fn alternation_next_provider(&self) -> Result<Provider> {
        Ok(self.load_alternation_state()?.next_provider())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_creates_default_row_on_first_call() {
        let store = Store::open_in_memory().unwrap();
        let state = store.load_alternation_state().unwrap();
        assert_eq!(state.next_provider(), Provider::C);
    }

    #[test]
    fn save_and_reload_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        let state = store.load_alternation_state().unwrap();
        let state = state.record_started(Provider::C, Utc::now());
        store.save_alternation_state(&state).unwrap();

        let reloaded = store.load_alternation_state().unwrap();
        assert_eq!(reloaded.start_history.len(), 1);
        assert_eq!(reloaded.last_started.unwrap().provider, Provider::C);
    }

    #[test]
    fn ensure_row_is_idempotent_under_repeated_calls() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_alternation_row().unwrap();
        store.ensure_alternation_row().unwrap();
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM alternation_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
