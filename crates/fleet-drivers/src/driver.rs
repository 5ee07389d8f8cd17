//! Provider Drivers — collaborator contract.
//!
//! `ProviderDriver` is the seam the Lifecycle Controller calls through; it
//! specifies pre/post conditions only, not internals — concrete
//! implementations live in `colab.rs`/`kaggle.rs` and shell out to an
//! external browser-automation binary, one process spawned per call.
//! Drivers expose no implicit retry: the controller decides retries.

use async_trait::async_trait;

use fleet_core::types::Provider;

use crate::error::DriverError;

/// Driver-specific soft timeout for `StartSession`.
pub const START_SESSION_TIMEOUT_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub tunnel_url: String,
}

/// Advisory snapshot from `ScrapeQuota`. Never mutates `CanStart`/
/// `ShouldStop`: the local ledger wins, this is surfaced for operator
/// visibility only.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaSnapshot {
    pub provider: Provider,
    pub compute_units_remaining: Option<f64>,
    pub raw: serde_json::Value,
}

/// Credentials passed to `StartSession`. Kept provider-agnostic at the
/// trait boundary; concrete drivers downcast/construct their own shape
/// internally via the `CredentialsVault` lookups performed by the caller.
#[derive(Debug, Clone)]
pub enum DriverCredentials {
    Kaggle(crate::vault::KaggleCredentials),
    Google(crate::vault::GoogleCredentials),
}

#[async_trait]
pub trait ProviderDriver: Send + Sync {
    fn provider(&self) -> Provider;

    /// Launches the remote notebook, executes the worker bootstrap, waits
    /// up to [`START_SESSION_TIMEOUT_SECS`] for the remote worker to
    /// publish a tunnel URL. Safe to call concurrently for different
    /// workers. MUST NOT be called twice for the same worker while a
    /// session is live — the Lifecycle Controller holds that invariant,
    /// not this trait.
    async fn start_session(
        &self,
        account_id: &str,
        credentials: DriverCredentials,
    ) -> Result<StartOutcome, DriverError>;

    /// Graceful stop: instructs the remote to stop, closes local
    /// resources, and always leaves the worker available for a future
    /// start. Best-effort — no deadline.
    async fn stop_session(&self, account_id: &str) -> Result<(), DriverError>;

    /// Optional reconciliation signal. Advisory only.
    async fn scrape_quota(&self, account_id: &str) -> Result<QuotaSnapshot, DriverError>;
}
