//! On-Demand Activator.
//!
//! Reuse is always preferred over a fresh start, and concurrent requests
//! for "a GPU, now" collapse onto one in-flight `StartGPU` call via the
//! idiomatic `tokio`+`futures` single-flight pattern: a
//! `Mutex<HashMap<WorkerId, Shared<...>>>` of cloned futures, so two
//! concurrent activations never race onto two different drivers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::info;

use fleet_core::types::{ActivationOutcome, WorkerStatus};
use fleet_gateway::Gateway;
use fleet_store::Store;

use crate::drivers::DriverSet;
use crate::error::ControllerError;
use crate::lifecycle::start_gpu;

type ActivationResult = Result<ActivationOutcome, ControllerError>;
type SharedActivation = Shared<std::pin::Pin<Box<dyn std::future::Future<Output = ActivationResult> + Send>>>;

/// Single-flight keyed by worker id. A fresh activation is only ever keyed
/// by the *specific* worker `StartGPU` is attempted against, chosen once
/// inside the critical section below — so two racing `activate()` calls
/// that both land on "no hot worker, start the first offline one" key onto
/// the same worker id and therefore the same shared future.
#[derive(Clone)]
pub struct Activator {
    store: Arc<Store>,
    gateway: Gateway,
    drivers: Arc<DriverSet>,
    vault: Arc<dyn fleet_drivers::CredentialsVault>,
    in_flight: Arc<Mutex<HashMap<i64, SharedActivation>>>,
}

impl Activator {
    pub fn new(
        store: Arc<Store>,
        gateway: Gateway,
        drivers: Arc<DriverSet>,
        vault: Arc<dyn fleet_drivers::CredentialsVault>,
    ) -> Self {
        Self {
            store,
            gateway,
            drivers,
            vault,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `Activate()`: reuse a hot worker, else start the first offline one.
    pub async fn activate(&self) -> ActivationResult {
        // Step 1: reuse a hot worker — preferred over any new start, and
        // MUST NOT touch the single-flight map or invoke a driver.
        let workers = self.store.list_workers()?;
        if let Some(hot) = workers.iter().find(|w| {
            matches!(w.status, WorkerStatus::Healthy | WorkerStatus::Online) && w.has_real_tunnel()
        }) {
            let now = Utc::now();
            self.store.touch_worker_last_used(hot.id, now)?;
            info!(worker_id = hot.id, "activator: reusing hot worker");
            return Ok(ActivationOutcome {
                kind: "reused".to_string(),
                reason: "ok".to_string(),
                worker_id: Some(hot.id),
                provider: Some(hot.provider),
            });
        }

        // Step 2: the first offline worker is a fresh-start candidate.
        let candidate = workers
            .iter()
            .find(|w| w.status == WorkerStatus::Offline)
            .map(|w| w.id);

        let Some(worker_id) = candidate else {
            // Step 3: no hot worker, nothing offline to start.
            return Err(ControllerError::new(
                "no_capacity",
                "no healthy worker to reuse and no offline worker available to start",
            ));
        };

        self.activate_worker(worker_id).await
    }

    /// Run (or join) the single in-flight `StartGPU` for `worker_id`.
    async fn activate_worker(&self, worker_id: i64) -> ActivationResult {
        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&worker_id) {
                existing.clone()
            } else {
                let store = self.store.clone();
                let gateway = self.gateway.clone();
                let drivers = self.drivers.clone();
                let vault = self.vault.clone();
                let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ActivationResult> + Send>> =
                    Box::pin(async move {
                        let now = Utc::now();
                        start_gpu(&store, &gateway, &drivers, vault.as_ref(), worker_id, now, false).await
                    });
                let shared = fut.shared();
                in_flight.insert(worker_id, shared.clone());
                shared
            }
        };

        let result = shared.await;

        // Only the caller that actually ran the future needs to evict the
        // entry; evicting unconditionally after every join is harmless
        // because the next caller simply recreates it.
        self.in_flight.lock().await.remove(&worker_id);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::types::Provider;
    use fleet_drivers::{FakeDriver, InMemoryVault, KaggleCredentials};
    use fleet_store::Store;

    fn make_activator() -> (Activator, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let gateway = Gateway::default();
        let drivers = Arc::new(DriverSet::new(
            Arc::new(FakeDriver::new(Provider::C)),
            Arc::new(FakeDriver::new(Provider::K)),
        ));
        let vault = Arc::new(
            InMemoryVault::new().with_kaggle(
                "kaggle-1",
                KaggleCredentials {
                    username: "u".into(),
                    key: "k".into(),
                },
            ),
        );
        let activator = Activator::new(store.clone(), gateway, drivers, vault);
        (activator, store)
    }

    fn offline_worker(account_id: &str) -> fleet_core::types::Worker {
        let now = Utc::now();
        fleet_core::types::Worker {
            id: 0,
            provider: Provider::K,
            account_id: account_id.to_string(),
            tunnel_url: None,
            status: WorkerStatus::Offline,
            capabilities: Default::default(),
            auto_managed: true,
            last_used_at: None,
            session_started_at: None,
            session_duration_seconds: 0,
            max_session_duration_seconds: 0,
            weekly_usage_seconds: 0,
            max_weekly_seconds: Some(fleet_core::quota::K_WEEKLY_HARD_MAX_SECS),
            week_started_at: None,
            cooldown_until: None,
            scheduled_stop_at: None,
            provider_limits: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn reuse_is_preferred_over_starting() {
        let (activator, store) = make_activator();
        let mut hot = offline_worker("kaggle-1");
        hot.status = WorkerStatus::Healthy;
        hot.tunnel_url = Some("https://real-tunnel".to_string());
        hot.session_started_at = Some(Utc::now());
        store.insert_worker(&hot).unwrap();

        let outcome = activator.activate().await.unwrap();
        assert_eq!(outcome.kind, "reused");
    }

    #[tokio::test]
    async fn no_workers_yields_no_capacity() {
        let (activator, _store) = make_activator();
        let result = activator.activate().await;
        assert!(matches!(result, Err(e) if e.kind == "no_capacity"));
    }

    #[tokio::test]
    async fn concurrent_activation_single_flights_onto_one_worker() {
        let (activator, store) = make_activator();
        store.insert_worker(&offline_worker("kaggle-1")).unwrap();

        let a1 = activator.clone();
        let a2 = activator.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a1.activate().await }),
            tokio::spawn(async move { a2.activate().await }),
        );
        let o1 = r1.unwrap().unwrap();
        let o2 = r2.unwrap().unwrap();
        assert_eq!(o1.worker_id, o2.worker_id);
    }
}
