//! Pool monitor.
//!
//! Diffs the auto-managed inventory count against the last-known size.
//! On change (including the very first tick, which always "changes" from
//! no known size): cancel the running rotation executor, replan, and
//! restart it under a fresh child cancellation token. Reentrant-safe: a
//! monitor tick that sees no change is a no-op.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ctx::RotationCtx;
use crate::rotation::run_rotation_executor;

pub async fn run_pool_monitor(ctx: RotationCtx, interval: Duration, cancel: CancellationToken) {
    let mut last_count: Option<usize> = None;
    let mut current_cancel: Option<CancellationToken> = None;
    let mut current_handle: Option<tokio::task::JoinHandle<()>> = None;
    let mut first_tick = true;

    loop {
        if !first_tick {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {
                    if let Some(c) = current_cancel.take() {
                        c.cancel();
                    }
                    if let Some(h) = current_handle.take() {
                        let _ = h.await;
                    }
                    return;
                }
            }
        }
        first_tick = false;

        let workers = match ctx.store.list_auto_managed_workers() {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "pool monitor: failed to list inventory, skipping tick");
                continue;
            }
        };
        let count = workers.len();

        if last_count != Some(count) {
            info!(previous = ?last_count, current = count, "pool monitor: inventory size changed, replanning");

            if let Some(c) = current_cancel.take() {
                c.cancel();
            }
            if let Some(h) = current_handle.take() {
                let _ = h.await;
            }

            let schedule = fleet_planner::plan(&workers);
            let child_cancel = cancel.child_token();
            let handle = tokio::spawn(run_rotation_executor(ctx.clone(), schedule, child_cancel.clone()));
            current_cancel = Some(child_cancel);
            current_handle = Some(handle);
            last_count = Some(count);
        }
    }
}
