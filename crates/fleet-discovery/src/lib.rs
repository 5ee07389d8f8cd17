//! Auto-Discovery.
//!
//! Scans the [`SecretSurface`] for numbered credential tuples, upserts one
//! `fleet-store` worker row per discovered account, and deletes
//! auto-managed workers whose credentials disappeared. Idempotent:
//! rerunning against the same secret map is a no-op.

mod secret_surface;

pub use secret_surface::{EnvSecretSurface, MapSecretSurface, SecretSurface};

use chrono::Utc;
use tracing::{info, warn};

use fleet_core::types::{Capabilities, Provider, Worker, WorkerStatus};
use fleet_gateway::{FleetEvent, Gateway};
use fleet_store::Store;

#[derive(Debug, Default, Clone)]
pub struct DiscoveryReport {
    pub added: Vec<(i64, Provider, String)>,
    pub removed: Vec<(i64, Provider, String)>,
    pub unchanged: usize,
}

/// Scan `secrets` for `KAGGLE_USERNAME_<n>`/`KAGGLE_KEY_<n>` pairs,
/// n = 1, 2, ... until a gap terminates the scan. A present
/// `USERNAME_n` with no matching `KEY_n` is a per-account error: logged
/// and skipped, scan continues (one malformed pair shouldn't hide every
/// account configured after it).
fn scan_kaggle_account_ids(secrets: &dyn SecretSurface) -> Vec<String> {
    let mut found = Vec::new();
    let mut n = 1;
    loop {
        let username_key = format!("KAGGLE_USERNAME_{n}");
        let Some(_username) = secrets.get(&username_key) else {
            break;
        };
        let key_key = format!("KAGGLE_KEY_{n}");
        if secrets.get(&key_key).is_none() {
            warn!(n, "auto-discovery: KAGGLE_USERNAME_{n} present without matching KAGGLE_KEY_{n}, skipping");
            n += 1;
            continue;
        }
        found.push(format!("kaggle-{n}"));
        n += 1;
    }
    found
}

fn scan_colab_account_ids(secrets: &dyn SecretSurface) -> Vec<String> {
    let mut found = Vec::new();
    let mut n = 1;
    loop {
        let email_key = format!("COLAB_EMAIL_{n}");
        let Some(_email) = secrets.get(&email_key) else {
            break;
        };
        let password_key = format!("COLAB_PASSWORD_{n}");
        if secrets.get(&password_key).is_none() {
            warn!(n, "auto-discovery: COLAB_EMAIL_{n} present without matching COLAB_PASSWORD_{n}, skipping");
            n += 1;
            continue;
        }
        found.push(format!("colab-{n}"));
        n += 1;
    }
    found
}

fn new_worker_row(provider: Provider, account_id: &str, now: chrono::DateTime<Utc>) -> Worker {
    Worker {
        id: 0,
        provider,
        account_id: account_id.to_string(),
        tunnel_url: Some(Worker::placeholder_tunnel(provider, account_id)),
        status: WorkerStatus::Offline,
        capabilities: Capabilities::default(),
        auto_managed: true,
        last_used_at: None,
        session_started_at: None,
        session_duration_seconds: 0,
        max_session_duration_seconds: fleet_core::quota::SESSION_SAFE_CAP_SECS,
        weekly_usage_seconds: 0,
        max_weekly_seconds: if provider == Provider::K {
            Some(fleet_core::quota::K_WEEKLY_HARD_MAX_SECS)
        } else {
            None
        },
        week_started_at: None,
        cooldown_until: None,
        scheduled_stop_at: None,
        provider_limits: serde_json::Value::Null,
        created_at: now,
        updated_at: now,
    }
}

/// Run a full discovery pass: scan `secrets`, upsert new accounts, delete
/// auto-managed workers whose accounts are no longer present.
pub fn run(store: &Store, secrets: &dyn SecretSurface) -> fleet_store::Result<DiscoveryReport> {
    let now = Utc::now();
    let mut report = DiscoveryReport::default();

    let discovered: Vec<(Provider, String)> = scan_kaggle_account_ids(secrets)
        .into_iter()
        .map(|id| (Provider::K, id))
        .chain(
            scan_colab_account_ids(secrets)
                .into_iter()
                .map(|id| (Provider::C, id)),
        )
        .collect();

    for (provider, account_id) in &discovered {
        match store.find_worker(*provider, account_id) {
            Ok(Some(_)) => report.unchanged += 1,
            Ok(None) => {
                let row = new_worker_row(*provider, account_id, now);
                match store.insert_worker(&row) {
                    Ok(worker_id) => {
                        info!(provider = %provider, account_id, worker_id, "auto-discovery: inserted worker");
                        report.added.push((worker_id, *provider, account_id.clone()));
                    }
                    Err(e) => {
                        // Per-account errors are non-fatal; log and continue.
                        warn!(provider = %provider, account_id, error = %e, "auto-discovery: insert failed");
                    }
                }
            }
            Err(e) => {
                warn!(provider = %provider, account_id, error = %e, "auto-discovery: lookup failed");
            }
        }
    }

    let existing = store.list_auto_managed_workers()?;
    for worker in existing {
        let still_present = discovered
            .iter()
            .any(|(p, id)| *p == worker.provider && *id == worker.account_id);
        if !still_present {
            match store.delete_worker(worker.id) {
                Ok(()) => {
                    info!(provider = %worker.provider, account_id = %worker.account_id, "auto-discovery: removed orphaned worker");
                    report.removed.push((worker.id, worker.provider, worker.account_id));
                }
                Err(e) => {
                    warn!(worker_id = worker.id, error = %e, "auto-discovery: delete failed");
                }
            }
        }
    }

    Ok(report)
}

/// Publish `WORKER_ADDED`/`WORKER_DELETED` for everything a discovery pass
/// changed. Kept separate from [`run`] so the scan itself stays a plain
/// synchronous function over the store — only the event fan-out needs the
/// async gateway.
pub async fn publish_events(gateway: &Gateway, report: &DiscoveryReport) {
    for (worker_id, provider, account_id) in &report.added {
        info!(provider = %provider, account_id, worker_id, "auto-discovery: publishing WORKER_ADDED");
        gateway
            .publish(FleetEvent::WorkerAdded {
                worker_id: *worker_id,
                provider: *provider,
            })
            .await;
    }
    for (worker_id, provider, account_id) in &report.removed {
        info!(provider = %provider, account_id, worker_id, "auto-discovery: publishing WORKER_DELETED");
        gateway
            .publish(FleetEvent::WorkerDeleted {
                worker_id: *worker_id,
                provider: *provider,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets_with(pairs: &[(&str, &str)]) -> MapSecretSurface {
        let mut s = MapSecretSurface::new();
        for (k, v) in pairs {
            s = s.set(*k, *v);
        }
        s
    }

    #[test]
    fn scan_stops_at_gap() {
        let secrets = secrets_with(&[
            ("KAGGLE_USERNAME_1", "u1"),
            ("KAGGLE_KEY_1", "k1"),
            ("KAGGLE_USERNAME_2", "u2"),
            ("KAGGLE_KEY_2", "k2"),
            // gap at 3
            ("KAGGLE_USERNAME_4", "u4"),
            ("KAGGLE_KEY_4", "k4"),
        ]);
        let ids = scan_kaggle_account_ids(&secrets);
        assert_eq!(ids, vec!["kaggle-1".to_string(), "kaggle-2".to_string()]);
    }

    #[test]
    fn discovered_accounts_shrinking_deletes_the_orphaned_workers() {
        let store = Store::open_in_memory().unwrap();
        let secrets = secrets_with(&[
            ("KAGGLE_USERNAME_1", "u1"),
            ("KAGGLE_KEY_1", "k1"),
            ("KAGGLE_USERNAME_2", "u2"),
            ("KAGGLE_KEY_2", "k2"),
            ("KAGGLE_USERNAME_3", "u3"),
            ("KAGGLE_KEY_3", "k3"),
        ]);
        let report = run(&store, &secrets).unwrap();
        assert_eq!(report.added.len(), 3);
        assert_eq!(store.list_workers().unwrap().len(), 3);

        // USERNAME_2 removed -> scanner only sees _1, kaggle-2 and kaggle-3 deleted.
        let secrets2 = secrets_with(&[("KAGGLE_USERNAME_1", "u1"), ("KAGGLE_KEY_1", "k1")]);
        let report2 = run(&store, &secrets2).unwrap();
        assert_eq!(report2.removed.len(), 2);
        let remaining = store.list_workers().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].account_id, "kaggle-1");
    }

    #[test]
    fn rerunning_with_same_secrets_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        let secrets = secrets_with(&[
            ("COLAB_EMAIL_1", "e1"),
            ("COLAB_PASSWORD_1", "p1"),
        ]);
        run(&store, &secrets).unwrap();
        let report = run(&store, &secrets).unwrap();
        assert_eq!(report.added.len(), 0);
        assert_eq!(report.removed.len(), 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(store.list_workers().unwrap().len(), 1);
    }

    #[test]
    fn partial_pair_is_skipped_but_scan_continues() {
        let secrets = secrets_with(&[
            ("KAGGLE_USERNAME_1", "u1"),
            // key 1 missing
            ("KAGGLE_USERNAME_2", "u2"),
            ("KAGGLE_KEY_2", "k2"),
        ]);
        let ids = scan_kaggle_account_ids(&secrets);
        assert_eq!(ids, vec!["kaggle-2".to_string()]);
    }

    #[test]
    fn manually_managed_workers_are_never_deleted() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let mut manual = new_worker_row(Provider::K, "kaggle-manual", now);
        manual.auto_managed = false;
        store.insert_worker(&manual).unwrap();

        let report = run(&store, &MapSecretSurface::new()).unwrap();
        assert_eq!(report.removed.len(), 0);
        assert_eq!(store.list_workers().unwrap().len(), 1);
    }
}
