//! Family K concrete driver (accelerator notebooks). Shells out to a
//! configurable automation binary (default `kaggle-notebook-driver`, an
//! external browser-automation process not part of this crate). Any
//! mechanism satisfying the `ProviderDriver` contract may be substituted
//! by pointing the binary path at something else.

use async_trait::async_trait;
use serde_json::json;

use fleet_core::types::Provider;

use crate::driver::{DriverCredentials, ProviderDriver, QuotaSnapshot, StartOutcome, START_SESSION_TIMEOUT_SECS};
use crate::error::DriverError;
use crate::executor::AutomationExecutor;

pub struct KaggleDriver {
    executor: AutomationExecutor,
}

impl KaggleDriver {
    pub fn new() -> Self {
        Self::with_bin("kaggle-notebook-driver")
    }

    pub fn with_bin(bin: impl Into<String>) -> Self {
        Self {
            executor: AutomationExecutor::new(bin),
        }
    }
}

impl Default for KaggleDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderDriver for KaggleDriver {
    fn provider(&self) -> Provider {
        Provider::K
    }

    async fn start_session(
        &self,
        account_id: &str,
        credentials: DriverCredentials,
    ) -> Result<StartOutcome, DriverError> {
        let DriverCredentials::Kaggle(creds) = credentials else {
            return Err(DriverError::CredentialsMissing(account_id.to_string()));
        };
        let payload = json!({
            "account_id": account_id,
            "username": creds.username,
            "key": creds.key,
        });
        let result = self
            .executor
            .run_json(&["start"], &payload, START_SESSION_TIMEOUT_SECS)
            .await?;
        let tunnel_url = result
            .get("tunnel_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::AutomationFailed("missing tunnel_url in response".into()))?
            .to_string();
        Ok(StartOutcome { tunnel_url })
    }

    async fn stop_session(&self, account_id: &str) -> Result<(), DriverError> {
        let payload = json!({ "account_id": account_id });
        self.executor.run_json_no_deadline(&["stop"], &payload).await?;
        Ok(())
    }

    async fn scrape_quota(&self, account_id: &str) -> Result<QuotaSnapshot, DriverError> {
        let payload = json!({ "account_id": account_id });
        let result = self
            .executor
            .run_json(&["scrape-quota"], &payload, 60)
            .await?;
        let compute_units_remaining = result.get("compute_units_remaining").and_then(|v| v.as_f64());
        Ok(QuotaSnapshot {
            provider: Provider::K,
            compute_units_remaining,
            raw: result,
        })
    }
}
