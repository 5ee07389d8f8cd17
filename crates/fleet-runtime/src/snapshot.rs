//! `FleetSnapshot`: the read-only view the `status` subcommand and the
//! control socket's `status` method both render from. One query path so
//! CLI and UDS clients never drift.

use serde::Serialize;

use fleet_core::quota;
use fleet_core::types::Worker;
use fleet_store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    pub id: i64,
    pub provider: String,
    pub account_id: String,
    pub status: String,
    pub auto_managed: bool,
    pub session_duration_seconds: i64,
    pub weekly_usage_seconds: i64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    pub workers: Vec<WorkerSnapshot>,
    pub next_provider: String,
    pub override_count: u64,
}

fn worker_snapshot(worker: &Worker) -> WorkerSnapshot {
    let status = quota::get_status(worker, chrono::Utc::now());
    WorkerSnapshot {
        id: worker.id,
        provider: worker.provider.to_string(),
        account_id: worker.account_id.clone(),
        status: worker.status.to_string(),
        auto_managed: worker.auto_managed,
        session_duration_seconds: worker.session_duration_seconds,
        weekly_usage_seconds: worker.weekly_usage_seconds,
        utilization_percent: status.utilization_percent,
    }
}

pub fn build_snapshot(store: &Store) -> fleet_store::Result<FleetSnapshot> {
    let workers = store.list_workers()?;
    let alt_state = store.load_alternation_state()?;
    Ok(FleetSnapshot {
        next_provider: alt_state.next_provider().to_string(),
        override_count: alt_state.override_count,
        workers: workers.iter().map(worker_snapshot).collect(),
    })
}

/// Human-readable table for terminal output, the same shape `fleetd status`
/// prints.
pub fn render_table(snapshot: &FleetSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "next provider: {}  overrides: {}\n",
        snapshot.next_provider, snapshot.override_count
    ));
    out.push_str(&format!(
        "{:>4} {:<4} {:<16} {:<10} {:>10} {:>10} {:>6}\n",
        "id", "prov", "account", "status", "session_s", "weekly_s", "util%"
    ));
    for w in &snapshot.workers {
        out.push_str(&format!(
            "{:>4} {:<4} {:<16} {:<10} {:>10} {:>10} {:>6.1}\n",
            w.id,
            w.provider,
            w.account_id,
            w.status,
            w.session_duration_seconds,
            w.weekly_usage_seconds,
            w.utilization_percent,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_yields_empty_snapshot() {
        let store = Store::open_in_memory().unwrap();
        let snapshot = build_snapshot(&store).unwrap();
        assert!(snapshot.workers.is_empty());
        assert_eq!(snapshot.next_provider, "c");
    }

    #[test]
    fn render_table_includes_header_and_rows() {
        let store = Store::open_in_memory().unwrap();
        let snapshot = build_snapshot(&store).unwrap();
        let table = render_table(&snapshot);
        assert!(table.contains("next provider"));
        assert!(table.contains("util%"));
    }
}
