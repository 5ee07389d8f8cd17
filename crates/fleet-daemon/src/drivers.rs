//! Wiring between the two concrete [`ProviderDriver`]s and the
//! [`CredentialsVault`], keyed by [`Provider`].

use std::sync::Arc;

use fleet_core::types::Provider;
use fleet_drivers::{CredentialsVault, DriverCredentials, DriverError, ProviderDriver};

/// The pair of drivers the controller dispatches through, one per family.
#[derive(Clone)]
pub struct DriverSet {
    pub c: Arc<dyn ProviderDriver>,
    pub k: Arc<dyn ProviderDriver>,
}

impl DriverSet {
    pub fn new(c: Arc<dyn ProviderDriver>, k: Arc<dyn ProviderDriver>) -> Self {
        Self { c, k }
    }

    pub fn get(&self, provider: Provider) -> &Arc<dyn ProviderDriver> {
        match provider {
            Provider::C => &self.c,
            Provider::K => &self.k,
        }
    }
}

/// Fetch the credentials appropriate to `provider` from the vault,
/// returning `DriverError::CredentialsMissing` when the vault has nothing
/// for this account; the caller logs and refuses rather than starting
/// without credentials.
pub async fn fetch_credentials(
    vault: &dyn CredentialsVault,
    provider: Provider,
    account_id: &str,
) -> Result<DriverCredentials, DriverError> {
    match provider {
        Provider::K => vault
            .retrieve_kaggle(account_id)
            .await
            .map(DriverCredentials::Kaggle)
            .ok_or_else(|| DriverError::CredentialsMissing(account_id.to_string())),
        Provider::C => vault
            .retrieve_google(account_id)
            .await
            .map(DriverCredentials::Google)
            .ok_or_else(|| DriverError::CredentialsMissing(account_id.to_string())),
    }
}
