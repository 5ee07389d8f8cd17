//! Quota monitor.
//!
//! Stops every family-K worker `GetGPUsToStop()` names, then attempts a
//! single replacement start following `nextProvider()` with a fallback to
//! the alternative pool under an explicit alternation override — the
//! dual-exhaustion scenario where both families are simultaneously out of
//! runway.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_core::quota;
use fleet_core::types::ShutdownReason;
use fleet_gateway::FleetEvent;

use crate::ctx::RotationCtx;
use crate::error::ControllerError;
use crate::jitter::quota_monitor_stop_delay;
use crate::lifecycle::{start_gpu, stop_gpu};

/// `QUOTA_WARNING` fires once a running worker's utilization crosses this
/// percentage of the *true* provider maximum but before `ShouldStop` trips
/// at [`quota::UTILIZATION_REJECT_PERCENT`] — early operator visibility
/// into a worker approaching its safe cap.
const QUOTA_WARNING_PERCENT: f64 = 60.0;

pub async fn run_quota_monitor(ctx: RotationCtx, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
        if let Err(e) = quota_monitor_tick(&ctx).await {
            warn!(error = %e, "quota monitor: tick failed");
        }
    }
}

async fn quota_monitor_tick(ctx: &RotationCtx) -> Result<(), ControllerError> {
    let now = Utc::now();
    let workers = ctx.store.list_workers()?;

    emit_warnings(ctx, &workers, now).await;

    let to_stop: Vec<i64> = quota::gpus_to_stop(&workers, now).into_iter().map(|w| w.id).collect();

    for (index, worker_id) in to_stop.iter().enumerate() {
        if let Err(e) = stop_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, *worker_id, ShutdownReason::WeeklyQuota, now).await {
            warn!(worker_id = *worker_id, error = %e, "quota monitor: stop failed");
        } else {
            info!(worker_id = *worker_id, "quota monitor: stopped quota-exhausted worker");
            ctx.gateway
                .publish(FleetEvent::QuotaExhausted {
                    worker_id: *worker_id,
                    provider: fleet_core::types::Provider::K,
                })
                .await;
        }
        if index + 1 < to_stop.len() {
            tokio::time::sleep(quota_monitor_stop_delay()).await;
        }
    }

    if to_stop.is_empty() {
        return Ok(());
    }

    attempt_replacement_start(ctx, now).await
}

/// Publish `QUOTA_WARNING{percent}` for every worker with a live session
/// whose utilization has crossed [`QUOTA_WARNING_PERCENT`] but hasn't yet
/// tripped `ShouldStop`. Advisory only, like `ScrapeQuota` — never feeds
/// back into a ledger decision.
async fn emit_warnings(ctx: &RotationCtx, workers: &[fleet_core::types::Worker], now: chrono::DateTime<Utc>) {
    for worker in workers.iter().filter(|w| w.session_started_at.is_some()) {
        let status = quota::get_status(worker, now);
        if status.should_stop {
            continue;
        }
        let weekly_percent = match (worker.provider, status.weekly_used_seconds) {
            (fleet_core::types::Provider::K, Some(used)) => {
                Some((used as f64 / quota::K_WEEKLY_HARD_MAX_SECS as f64) * 100.0)
            }
            _ => None,
        };
        let percent = weekly_percent
            .into_iter()
            .chain(std::iter::once(status.utilization_percent))
            .fold(0.0_f64, f64::max);

        if percent >= QUOTA_WARNING_PERCENT {
            ctx.gateway
                .publish(FleetEvent::QuotaWarning {
                    worker_id: worker.id,
                    percent,
                })
                .await;
        }
    }
}

async fn attempt_replacement_start(ctx: &RotationCtx, now: chrono::DateTime<Utc>) -> Result<(), ControllerError> {
    let alt_state = ctx.store.load_alternation_state()?;
    let next = alt_state.next_provider();
    let workers = ctx.store.list_workers()?;

    let primary_candidate = workers
        .iter()
        .filter(|w| w.provider == next && w.session_started_at.is_none())
        .find(|w| quota::can_start(w, now));

    if let Some(w) = primary_candidate {
        start_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, ctx.vault.as_ref(), w.id, now, false).await?;
        return Ok(());
    }

    let alternative = next.opposite();
    let alternative_candidate = workers
        .iter()
        .filter(|w| w.provider == alternative && w.session_started_at.is_none())
        .find(|w| quota::can_start(w, now));

    match alternative_candidate {
        Some(w) => {
            warn!(worker_id = w.id, provider = %alternative, "quota monitor: both primary pool exhausted, overriding alternation");
            start_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, ctx.vault.as_ref(), w.id, now, true).await?;
            Ok(())
        }
        None => {
            warn!("quota monitor: dual exhaustion, both pools exhausted, waiting for next tick");
            Ok(())
        }
    }
}
