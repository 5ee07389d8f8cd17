//! Structured controller outcome: user-visible failures surface structured
//! objects `{kind, reason, workerId?, provider?}` rather than bare strings.
//!
//! Every fallible operation in this crate (`StartGPU`, `StopGPU`, the
//! activator) returns `ControllerError` rather than a bare `String`, so
//! `fleet-runtime` can render the same shape the API collaborator expects
//! without re-deriving it.

use fleet_core::types::{ActivationOutcome, Provider};

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerError {
    pub kind: String,
    pub reason: String,
    pub worker_id: Option<i64>,
    pub provider: Option<Provider>,
}

impl ControllerError {
    pub fn new(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            reason: reason.into(),
            worker_id: None,
            provider: None,
        }
    }

    pub fn with_worker(mut self, worker_id: i64, provider: Provider) -> Self {
        self.worker_id = Some(worker_id);
        self.provider = Some(provider);
        self
    }

    pub fn into_outcome(self) -> ActivationOutcome {
        ActivationOutcome {
            kind: self.kind,
            reason: self.reason,
            worker_id: self.worker_id,
            provider: self.provider,
        }
    }
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

impl std::error::Error for ControllerError {}

impl From<fleet_core::FleetError> for ControllerError {
    fn from(err: fleet_core::FleetError) -> Self {
        Self::new(err.kind(), err.reason())
    }
}

impl From<fleet_store::StoreError> for ControllerError {
    fn from(err: fleet_store::StoreError) -> Self {
        fleet_core::FleetError::from(err).into()
    }
}

impl From<fleet_drivers::DriverError> for ControllerError {
    fn from(err: fleet_drivers::DriverError) -> Self {
        fleet_core::FleetError::from(err).into()
    }
}
