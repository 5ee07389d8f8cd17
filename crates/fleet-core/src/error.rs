//! The closed error vocabulary shared by every crate in the workspace.
//!
//! `Configuration` and quota/alternation denials are normal outcomes —
//! callers match on them and return a reason, they are not exceptional.
//! `Invariant` is the one variant that should never fire in a correct
//! system; when it does, the caller logs at error level and marks the
//! affected worker `unhealthy` rather than panicking.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("quota denied: {0}")]
    QuotaDenied(String),

    #[error("alternation denied: {0}")]
    AlternationDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl FleetError {
    /// The `kind` discriminant surfaced in `ActivationOutcome`/`ControllerError`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Transient(_) => "transient",
            Self::QuotaDenied(_) => "quota_denied",
            Self::AlternationDenied(_) => "alternation_denied",
            Self::Conflict(_) => "conflict",
            Self::Invariant(_) => "invariant",
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Self::Configuration(r)
            | Self::Transient(r)
            | Self::QuotaDenied(r)
            | Self::AlternationDenied(r)
            | Self::Conflict(r)
            | Self::Invariant(r) => r.clone(),
        }
    }
}
