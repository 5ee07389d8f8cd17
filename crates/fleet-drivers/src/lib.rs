//! Provider Drivers — collaborator contract and two concrete
//! implementations.

pub mod colab;
pub mod driver;
pub mod error;
pub mod executor;
pub mod fake;
pub mod kaggle;
pub mod vault;

pub use colab::ColabDriver;
pub use driver::{DriverCredentials, ProviderDriver, QuotaSnapshot, StartOutcome, START_SESSION_TIMEOUT_SECS};
pub use error::DriverError;
pub use fake::FakeDriver;
pub use kaggle::KaggleDriver;
pub use vault::{CredentialsVault, EnvVault, GoogleCredentials, InMemoryVault, KaggleCredentials};
