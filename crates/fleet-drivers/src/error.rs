use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("driver timed out after {0}s waiting for tunnel URL")]
    Timeout(u64),

    #[error("automation process failed: {0}")]
    AutomationFailed(String),

    #[error("io error launching driver: {0}")]
    Io(String),

    #[error("credentials missing for account {0}")]
    CredentialsMissing(String),
}

impl From<DriverError> for fleet_core::FleetError {
    fn from(err: DriverError) -> Self {
        fleet_core::FleetError::Transient(err.to_string())
    }
}
