//! Async subprocess executor shared by the two concrete drivers.
//!
//! Spawns one child process per call, no persistent handle kept around,
//! but async and timeout-bounded since browser automation against a
//! remote notebook can hang indefinitely on a bad page load.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::error::DriverError;

/// Spawns `bin` with `args`, feeds `stdin_json` on stdin, and returns
/// parsed stdout JSON. Applies `timeout_secs` around the whole child
/// lifecycle — on timeout the child is killed and `DriverError::Timeout`
/// is returned.
pub struct AutomationExecutor {
    bin: String,
}

impl AutomationExecutor {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub async fn run_json(
        &self,
        args: &[&str],
        stdin_json: &serde_json::Value,
        timeout_secs: u64,
    ) -> Result<serde_json::Value, DriverError> {
        let fut = self.run_json_inner(args, stdin_json);
        match timeout(Duration::from_secs(timeout_secs), fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(bin = %self.bin, timeout_secs, "automation executor timed out");
                Err(DriverError::Timeout(timeout_secs))
            }
        }
    }

    /// Same as [`Self::run_json`] but runs the child to completion with no
    /// deadline. For calls where the caller's contract is best-effort —
    /// stop automation must not itself gate ledger cleanup on a timeout.
    pub async fn run_json_no_deadline(
        &self,
        args: &[&str],
        stdin_json: &serde_json::Value,
    ) -> Result<serde_json::Value, DriverError> {
        self.run_json_inner(args, stdin_json).await
    }

    async fn run_json_inner(
        &self,
        args: &[&str],
        stdin_json: &serde_json::Value,
    ) -> Result<serde_json::Value, DriverError> {
        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Io(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(stdin_json).map_err(|e| DriverError::Io(e.to_string()))?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| DriverError::Io(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DriverError::Io(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::AutomationFailed(stderr.trim().to_string()));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| DriverError::AutomationFailed(format!("bad json from driver: {e}")))
    }
}
