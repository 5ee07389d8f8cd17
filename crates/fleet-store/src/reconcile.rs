//! Startup reconciliation.
//!
//! Runs once when the Lifecycle Controller boots, before any control loop
//! starts: orphaned `starting` rows left by a crashed process are timed
//! out, expired `{active, idle}` rows are closed, and whatever remains
//! live is handed back to the controller as "adopted" — no in-process
//! driver handle exists for these, so the idle watcher / session watchdog
//! will be the ones to eventually stop them.

use chrono::{Duration, Utc};
use rusqlite::params;

use fleet_core::session_fsm::STARTUP_TIMEOUT_SECS;
use fleet_core::types::{Session, ShutdownReason};

use crate::error::Result;
use crate::Store;

#[derive(Debug, Default, Clone)]
pub struct ReconciliationReport {
    pub timed_out_starting: usize,
    pub expired_quota: usize,
    pub adopted: Vec<Session>,
}

impl Store {
    /// Three steps, run in that order on process boot.
    pub fn reconcile_on_boot(&self) -> Result<ReconciliationReport> {
        let now = Utc::now();
        let mut report = ReconciliationReport::default();

        // Step 1: starting rows older than 10 minutes -> terminated(startup_timeout).
        let cutoff = now - Duration::seconds(STARTUP_TIMEOUT_SECS);
        {
            let conn = self.conn.lock().expect("store mutex poisoned");
            report.timed_out_starting = conn.execute(
                "UPDATE sessions SET status = 'terminated', terminated_at = ?1,
                     shutdown_reason = ?2, last_activity = ?1
                 WHERE status = 'starting' AND started_at < ?3",
                params![
                    now.to_rfc3339(),
                    ShutdownReason::StartupTimeout.as_str(),
                    cutoff.to_rfc3339(),
                ],
            )?;
        }

        // Step 2: {active, idle} rows with expiresAt < now -> terminated(quota_expired).
        {
            let conn = self.conn.lock().expect("store mutex poisoned");
            report.expired_quota = conn.execute(
                "UPDATE sessions SET status = 'terminated', terminated_at = ?1,
                     shutdown_reason = ?2, last_activity = ?1
                 WHERE status IN ('active', 'idle') AND expires_at < ?1",
                params![now.to_rfc3339(), ShutdownReason::QuotaExpired.as_str()],
            )?;
        }

        // Step 3: whatever remains live is reported as "adopted".
        report.adopted = self.list_live_sessions()?;

        Ok(report)
    }
}
