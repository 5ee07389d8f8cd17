//! Rotation executor.
//!
//! Each [`fleet_planner::Group`] runs as its own independent cycle task:
//! sleep until the group's offset, start it, sleep the remaining duration,
//! stop it, sleep the rest of the 24h cycle, repeat. One group's failure
//! to start a worker never blocks another group or another worker in the
//! same group.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_core::types::ShutdownReason;
use fleet_planner::{Group, Schedule};

use crate::ctx::RotationCtx;
use crate::jitter::progressive_start_delay;
use crate::lifecycle::{start_gpu, stop_gpu};

const CYCLE: Duration = Duration::from_secs(24 * 3600);

/// Spawn one cycling task per group in `schedule` and wait for all of them
/// to wind down (only happens on cancellation).
pub async fn run_rotation_executor(ctx: RotationCtx, schedule: Schedule, cancel: CancellationToken) {
    if schedule.groups.is_empty() {
        info!("rotation executor: empty schedule, nothing to run");
        return;
    }
    let mut handles = Vec::with_capacity(schedule.groups.len());
    for group in schedule.groups {
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(run_group_cycle(ctx, group, cancel)));
    }
    for h in handles {
        let _ = h.await;
    }
}

async fn run_group_cycle(ctx: RotationCtx, group: Group, cancel: CancellationToken) {
    let start_offset = Duration::from_secs_f64((group.start_offset_hours * 3600.0).max(0.0));
    let duration = Duration::from_secs_f64((group.duration_hours * 3600.0).max(0.0));
    let rest = CYCLE.saturating_sub(duration);

    tokio::select! {
        _ = tokio::time::sleep(start_offset) => {}
        _ = cancel.cancelled() => return,
    }

    loop {
        start_group(&ctx, &group).await;

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = cancel.cancelled() => {
                stop_group(&ctx, &group).await;
                return;
            }
        }

        stop_group(&ctx, &group).await;

        tokio::select! {
            _ = tokio::time::sleep(rest) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

async fn start_group(ctx: &RotationCtx, group: &Group) {
    info!(group_id = %group.group_id, workers = group.workers.len(), "rotation executor: starting group");
    for (index, worker_id) in group.workers.iter().enumerate() {
        let now = Utc::now();
        match start_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, ctx.vault.as_ref(), *worker_id, now, false).await {
            Ok(_) => info!(worker_id, group_id = %group.group_id, "rotation executor: worker started"),
            Err(e) => warn!(worker_id, group_id = %group.group_id, error = %e, "rotation executor: worker start failed, continuing with the rest of the group"),
        }
        if index + 1 < group.workers.len() {
            tokio::time::sleep(progressive_start_delay(index)).await;
        }
    }
}

async fn stop_group(ctx: &RotationCtx, group: &Group) {
    info!(group_id = %group.group_id, "rotation executor: stopping group");
    for worker_id in &group.workers {
        let now = Utc::now();
        if let Err(e) = stop_gpu(&ctx.store, &ctx.gateway, &ctx.drivers, *worker_id, ShutdownReason::SessionLimit, now).await {
            warn!(worker_id = *worker_id, group_id = %group.group_id, error = %e, "rotation executor: worker stop failed");
        }
    }
}
