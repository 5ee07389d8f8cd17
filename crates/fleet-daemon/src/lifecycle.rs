//! `StartGPU`/`StopGPU`.
//!
//! Each numbered step in the doc comments below is kept in the same order
//! as the contract it implements, so a reviewer can check this function
//! against it line by line. Every suspension point (store, vault, driver)
//! is a rollback point: a failure partway through undoes the ledger-side
//! effects already applied.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use fleet_core::quota;
use fleet_core::session_fsm::is_valid_transition;
use fleet_core::types::{ActivationOutcome, SessionStatus, ShutdownReason, Worker};
use fleet_gateway::{FleetEvent, Gateway};
use fleet_drivers::CredentialsVault;
use fleet_store::{InsertOutcome, Store};

use crate::drivers::{fetch_credentials, DriverSet};
use crate::error::ControllerError;

/// `StartGPU(worker)`.
pub async fn start_gpu(
    store: &Store,
    gateway: &Gateway,
    drivers: &DriverSet,
    vault: &dyn CredentialsVault,
    worker_id: i64,
    now: DateTime<Utc>,
    allow_alternation_override: bool,
) -> Result<ActivationOutcome, ControllerError> {
    // Step 1: lookup worker; refuse if already running.
    let worker = store.get_worker(worker_id)?;
    if worker.session_started_at.is_some() {
        return Err(
            ControllerError::new("conflict", "already running").with_worker(worker_id, worker.provider)
        );
    }

    // Step 2: Quota Ledger CanStart.
    let status = quota::get_status(&worker, now);
    if !status.can_start {
        return Err(ControllerError::new("quota_denied", status.reason)
            .with_worker(worker_id, worker.provider));
    }

    // Step 3: Alternation Gate canStart, unless an override is in effect.
    let alt_state = store.load_alternation_state()?;
    let alternation_ok = alt_state.can_start(worker.provider) || allow_alternation_override;
    if !alternation_ok {
        return Err(ControllerError::new(
            "alternation_denied",
            format!(
                "next provider is {}, not {}",
                alt_state.next_provider(),
                worker.provider
            ),
        )
        .with_worker(worker_id, worker.provider));
    }

    // Step 4: credentials from the vault.
    let credentials = match fetch_credentials(vault, worker.provider, &worker.account_id).await {
        Ok(c) => c,
        Err(e) => {
            warn!(worker_id, provider = %worker.provider, "start_gpu: credentials missing, refusing");
            return Err(ControllerError::from(e).with_worker(worker_id, worker.provider));
        }
    };

    // Step 5: QuotaLedger.StartSession(worker), persisted before the driver
    // call so a crash mid-flight leaves a recoverable durable state rather
    // than a dangling in-memory transform.
    let pre_start = worker.clone();
    let started_worker = quota::start_session(worker.clone(), now);
    store.save_worker(&started_worker)?;

    // Step 6: Driver.StartSession. On failure, roll the ledger back.
    let driver = drivers.get(worker.provider);
    let start_outcome = match driver.start_session(&worker.account_id, credentials).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(worker_id, provider = %worker.provider, error = %e, "start_gpu: driver start failed, rolling back");
            let rolled_back = quota::stop_session(pre_start, now);
            store.save_worker(&rolled_back)?;
            return Err(ControllerError::from(e).with_worker(worker_id, worker.provider));
        }
    };

    // Step 7: insert Session row; partial-uniqueness conflict => "already active".
    let session_id_str = format!("{}-{}", worker.account_id, now.timestamp_millis());
    let expires_at = started_worker
        .scheduled_stop_at
        .unwrap_or(now + chrono::Duration::seconds(quota::SESSION_SAFE_CAP_SECS));
    let insert = store.insert_session(worker_id, &session_id_str, worker.provider, now, expires_at)?;
    let session_row_id = match insert {
        InsertOutcome::Inserted(id) => id,
        InsertOutcome::AlreadyActive => {
            warn!(worker_id, "start_gpu: partial-uniqueness conflict, rolling back driver+ledger");
            let _ = driver.stop_session(&worker.account_id).await;
            let rolled_back = quota::stop_session(pre_start, now);
            store.save_worker(&rolled_back)?;
            return Err(
                ControllerError::new("conflict", "already active").with_worker(worker_id, worker.provider)
            );
        }
    };

    // Step 8: starting -> active, guarded by CAS.
    let guard_held = store.transition_session(
        session_row_id,
        SessionStatus::Starting,
        SessionStatus::Active,
        now,
        Some(&start_outcome.tunnel_url),
        None,
    )?;
    if !guard_held {
        warn!(worker_id, session_row_id, "start_gpu: concurrent terminate beat us to active, closing driver");
        let _ = driver.stop_session(&worker.account_id).await;
        let rolled_back = quota::stop_session(pre_start, now);
        store.save_worker(&rolled_back)?;
        return Err(ControllerError::new(
            "transient",
            "session was concurrently terminated before reaching active",
        )
        .with_worker(worker_id, worker.provider));
    }

    // Step 9: update Worker row with the confirmed tunnel and lastUsedAt.
    let mut final_worker = started_worker;
    final_worker.tunnel_url = Some(start_outcome.tunnel_url);
    final_worker.last_used_at = Some(now);
    final_worker.updated_at = now;
    store.save_worker(&final_worker)?;

    // Step 10: AlternationGate.recordProviderStarted. Ordering guarantee
    // (a): only recorded once the session reached active.
    let alt_state = if allow_alternation_override && !alt_state.can_start(worker.provider) {
        alt_state.override_fallback(worker.provider, now)
    } else {
        alt_state.record_started(worker.provider, now)
    };
    store.save_alternation_state(&alt_state)?;

    gateway
        .publish(FleetEvent::SessionStarted {
            worker_id,
            session_id: session_row_id,
            provider: worker.provider,
        })
        .await;

    info!(worker_id, provider = %worker.provider, "start_gpu: session started");

    Ok(ActivationOutcome {
        kind: "started".to_string(),
        reason: "ok".to_string(),
        worker_id: Some(worker_id),
        provider: Some(worker.provider),
    })
}

/// `StopGPU(worker)`: best-effort stop. The driver call may fail; ledger
/// cleanup and alternation bookkeeping proceed regardless so state never
/// desyncs from the intent to stop (ordering guarantee (b)).
pub async fn stop_gpu(
    store: &Store,
    gateway: &Gateway,
    drivers: &DriverSet,
    worker_id: i64,
    reason: ShutdownReason,
    now: DateTime<Utc>,
) -> Result<(), ControllerError> {
    let worker = store.get_worker(worker_id)?;
    let provider = worker.provider;

    if let Err(e) = drivers.get(provider).stop_session(&worker.account_id).await {
        warn!(worker_id, provider = %provider, error = %e, "stop_gpu: driver stop failed, proceeding with ledger cleanup regardless");
    }

    let stopped_worker = quota::stop_session(worker, now);
    store.save_worker(&stopped_worker)?;

    let alt_state = store.load_alternation_state()?;
    let alt_state = alt_state.record_stopped(provider, now);
    store.save_alternation_state(&alt_state)?;

    if let Some(session) = store.live_session_for_worker(worker_id)? {
        if is_valid_transition(session.status, SessionStatus::Terminated) {
            store.transition_session(
                session.id,
                session.status,
                SessionStatus::Terminated,
                now,
                None,
                Some(reason),
            )?;
            gateway
                .publish(FleetEvent::SessionTerminated {
                    worker_id,
                    session_id: session.id,
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    info!(worker_id, provider = %provider, reason = %reason, "stop_gpu: worker stopped");
    Ok(())
}

/// Invariant violation helper: mark a worker `unhealthy` and log at error
/// level. Invariant violations are logged, the affected worker is marked
/// `unhealthy`, and the controller continues with the rest of the fleet.
pub fn mark_unhealthy(mut worker: Worker, reason: &str, now: DateTime<Utc>) -> Worker {
    error!(worker_id = worker.id, reason, "invariant violation, marking worker unhealthy");
    worker.status = fleet_core::types::WorkerStatus::Unhealthy;
    worker.updated_at = now;
    worker
}
