//! In-memory fake driver for `fleet-daemon` integration tests and
//! `fleet-runtime --fake-drivers` dev mode. Never compiled into a release
//! build's default driver set.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use fleet_core::types::Provider;

use crate::driver::{DriverCredentials, ProviderDriver, QuotaSnapshot, StartOutcome};
use crate::error::DriverError;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Start(String),
    Stop(String),
    ScrapeQuota(String),
}

pub struct FakeDriver {
    provider: Provider,
    fail_start: bool,
    calls: Mutex<Vec<FakeCall>>,
    start_count: AtomicUsize,
}

impl FakeDriver {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            fail_start: false,
            calls: Mutex::new(Vec::new()),
            start_count: AtomicUsize::new(0),
        }
    }

    pub fn failing(provider: Provider) -> Self {
        Self {
            fail_start: true,
            ..Self::new(provider)
        }
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().expect("fake driver mutex poisoned").clone()
    }

    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderDriver for FakeDriver {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn start_session(
        &self,
        account_id: &str,
        _credentials: DriverCredentials,
    ) -> Result<StartOutcome, DriverError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .expect("fake driver mutex poisoned")
            .push(FakeCall::Start(account_id.to_string()));
        if self.fail_start {
            return Err(DriverError::AutomationFailed("fake start failure".into()));
        }
        Ok(StartOutcome {
            tunnel_url: format!("https://fake-tunnel/{account_id}"),
        })
    }

    async fn stop_session(&self, account_id: &str) -> Result<(), DriverError> {
        self.calls
            .lock()
            .expect("fake driver mutex poisoned")
            .push(FakeCall::Stop(account_id.to_string()));
        Ok(())
    }

    async fn scrape_quota(&self, account_id: &str) -> Result<QuotaSnapshot, DriverError> {
        self.calls
            .lock()
            .expect("fake driver mutex poisoned")
            .push(FakeCall::ScrapeQuota(account_id.to_string()));
        Ok(QuotaSnapshot {
            provider: self.provider,
            compute_units_remaining: None,
            raw: serde_json::Value::Null,
        })
    }
}
