//! Wire/domain types shared by every crate in the workspace.
//!
//! Every type here derives `Serialize`/`Deserialize` — these values cross
//! process boundaries (sqlite rows, the status CLI, the event bus) and are
//! never kept behind a private representation the way a single-process
//! cache might be.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two supported free-tier notebook provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Family "C" — Colab-style, no weekly quota, 36h mandatory cooldown.
    C,
    /// Family "K" — Kaggle-style accelerator notebooks, weekly quota, no cooldown.
    K,
}

impl Provider {
    pub const ALL: [Self; 2] = [Self::C, Self::K];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::K => "k",
        }
    }

    /// The other family. Alternation always flips between exactly these two.
    pub fn opposite(self) -> Self {
        match self {
            Self::C => Self::K,
            Self::K => Self::C,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = crate::FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(Self::C),
            "k" => Ok(Self::K),
            other => Err(crate::FleetError::Configuration(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// Worker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Offline,
    Pending,
    Starting,
    Healthy,
    Online,
    Unhealthy,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Online => "online",
            Self::Unhealthy => "unhealthy",
        }
    }

    /// Invariant I1: a worker has a live `sessionStartedAt` iff its status is
    /// one of these three.
    pub fn implies_session_started(self) -> bool {
        matches!(self, Self::Starting | Self::Healthy | Self::Online)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerStatus {
    type Err = crate::FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Self::Offline),
            "pending" => Ok(Self::Pending),
            "starting" => Ok(Self::Starting),
            "healthy" => Ok(Self::Healthy),
            "online" => Ok(Self::Online),
            "unhealthy" => Ok(Self::Unhealthy),
            other => Err(crate::FleetError::Configuration(format!(
                "unknown worker status: {other}"
            ))),
        }
    }
}

/// Capabilities reported by the provider bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub model_family: String,
    pub has_accelerator: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            model_family: String::new(),
            has_accelerator: false,
        }
    }
}

/// One externally-hosted notebook identity under our control.
///
/// Identity is `(provider, account_id)`, enforced as a unique constraint by
/// `fleet-store`, never recomputed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub provider: Provider,
    pub account_id: String,
    pub tunnel_url: Option<String>,
    pub status: WorkerStatus,
    pub capabilities: Capabilities,
    pub auto_managed: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub session_duration_seconds: i64,
    pub max_session_duration_seconds: i64,
    pub weekly_usage_seconds: i64,
    pub max_weekly_seconds: Option<i64>,
    pub week_started_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub scheduled_stop_at: Option<DateTime<Utc>>,
    pub provider_limits: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// A placeholder tunnel is never a real reachable endpoint; On-Demand
    /// Activator treats it the same as "no tunnel yet".
    pub fn placeholder_tunnel(provider: Provider, account_id: &str) -> String {
        format!("pending://{provider}/{account_id}")
    }

    pub fn has_real_tunnel(&self) -> bool {
        self.tunnel_url
            .as_deref()
            .is_some_and(|url| !url.starts_with("pending://"))
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Active,
    Idle,
    Terminated,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Terminated => "terminated",
        }
    }

    /// The partial-uniqueness window: at most one row in this set is
    /// allowed per worker at a time.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Active | Self::Idle)
    }

    /// Terminal state is absorbing — never re-opened.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = crate::FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "active" => Ok(Self::Active),
            "idle" => Ok(Self::Idle),
            "terminated" => Ok(Self::Terminated),
            other => Err(crate::FleetError::Configuration(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Closed vocabulary of shutdown reasons. The UI collaborator displays
/// these values as-is — never rename a variant casually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    ManualStop,
    SessionLimit,
    WeeklyQuota,
    QuotaExpired,
    StartupTimeout,
    IdleTimeout,
    StartupError,
    QuotaServiceError,
    ProviderError,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualStop => "manual_stop",
            Self::SessionLimit => "session_limit",
            Self::WeeklyQuota => "weekly_quota",
            Self::QuotaExpired => "quota_expired",
            Self::StartupTimeout => "startup_timeout",
            Self::IdleTimeout => "idle_timeout",
            Self::StartupError => "startup_error",
            Self::QuotaServiceError => "quota_service_error",
            Self::ProviderError => "provider_error",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShutdownReason {
    type Err = crate::FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual_stop" => Ok(Self::ManualStop),
            "session_limit" => Ok(Self::SessionLimit),
            "weekly_quota" => Ok(Self::WeeklyQuota),
            "quota_expired" => Ok(Self::QuotaExpired),
            "startup_timeout" => Ok(Self::StartupTimeout),
            "idle_timeout" => Ok(Self::IdleTimeout),
            "startup_error" => Ok(Self::StartupError),
            "quota_service_error" => Ok(Self::QuotaServiceError),
            "provider_error" => Ok(Self::ProviderError),
            other => Err(crate::FleetError::Configuration(format!(
                "unknown shutdown reason: {other}"
            ))),
        }
    }
}

/// A single continuous run of a worker, bounded by the safe session cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub worker_id: i64,
    pub session_id: String,
    pub provider: Provider,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub shutdown_reason: Option<ShutdownReason>,
    pub tunnel_url: Option<String>,
}

/// `{kind, reason, workerId?, provider?}`, surfaced to the
/// API collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationOutcome {
    pub kind: String,
    pub reason: String,
    pub worker_id: Option<i64>,
    pub provider: Option<Provider>,
}
