//! Idle-shutdown watcher: the fourth cooperating control loop.
//!
//! Every five minutes, scans healthy family-K workers and stops any whose
//! durable `lastUsedAt` has gone quiet for more than the idle timeout.
//! Applies only to K by policy — C follows the fixed rotation schedule and
//! is never stopped early by activity. A failed stop leaves `lastUsedAt`
//! untouched so the next tick simply retries.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_core::types::{Provider, ShutdownReason, WorkerStatus};

use crate::ctx::RotationCtx;
use crate::lifecycle::stop_gpu;

/// Workers idle longer than this are stopped.
pub const IDLE_TIMEOUT_SECS: i64 = 10 * 60;

pub async fn run_idle_watcher(
    ctx: RotationCtx,
    interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }
        if let Err(e) = idle_watcher_tick(&ctx, idle_timeout).await {
            warn!(error = %e, "idle watcher: tick failed");
        }
    }
}

async fn idle_watcher_tick(ctx: &RotationCtx, idle_timeout: Duration) -> Result<(), crate::error::ControllerError> {
    let now = Utc::now();
    let idle_timeout = chrono::Duration::from_std(idle_timeout).unwrap_or_else(|_| chrono::Duration::seconds(IDLE_TIMEOUT_SECS));

    let workers = ctx.store.list_workers()?;
    for worker in workers
        .iter()
        .filter(|w| w.provider == Provider::K)
        .filter(|w| matches!(w.status, WorkerStatus::Healthy | WorkerStatus::Online))
    {
        let Some(last_used) = worker.last_used_at else {
            continue;
        };
        if now - last_used <= idle_timeout {
            continue;
        }

        match stop_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, worker.id, ShutdownReason::IdleTimeout, now).await {
            Ok(()) => info!(worker_id = worker.id, "idle watcher: stopped idle worker"),
            Err(e) => warn!(worker_id = worker.id, error = %e, "idle watcher: stop failed, lastUsedAt left untouched for retry"),
        }
    }

    Ok(())
}
