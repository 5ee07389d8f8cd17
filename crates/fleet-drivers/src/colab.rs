//! Family C concrete driver (Colab-style, no weekly quota, 36h cooldown).
//! Same shelled-out-automation shape as [`crate::kaggle::KaggleDriver`].

use async_trait::async_trait;
use serde_json::json;

use fleet_core::types::Provider;

use crate::driver::{DriverCredentials, ProviderDriver, QuotaSnapshot, StartOutcome, START_SESSION_TIMEOUT_SECS};
use crate::error::DriverError;
use crate::executor::AutomationExecutor;

pub struct ColabDriver {
    executor: AutomationExecutor,
}

impl ColabDriver {
    pub fn new() -> Self {
        Self::with_bin("colab-notebook-driver")
    }

    pub fn with_bin(bin: impl Into<String>) -> Self {
        Self {
            executor: AutomationExecutor::new(bin),
        }
    }
}

impl Default for ColabDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderDriver for ColabDriver {
    fn provider(&self) -> Provider {
        Provider::C
    }

    async fn start_session(
        &self,
        account_id: &str,
        credentials: DriverCredentials,
    ) -> Result<StartOutcome, DriverError> {
        let DriverCredentials::Google(creds) = credentials else {
            return Err(DriverError::CredentialsMissing(account_id.to_string()));
        };
        let payload = json!({
            "account_id": account_id,
            "email": creds.email,
            "password": creds.password,
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
        Ok(QuotaSnapshot {
            provider: Provider::C,
            compute_units_remaining: None,
            raw: result,
        })
    }
}
