//! Credentials vault — read-only collaborator. Modeled as a trait so
//! `fleet-runtime` can wire a real secret-manager-backed implementation
//! while tests use an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCredentials {
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait CredentialsVault: Send + Sync {
    async fn retrieve_kaggle(&self, account_id: &str) -> Option<KaggleCredentials>;
    async fn retrieve_google(&self, account_id: &str) -> Option<GoogleCredentials>;
}

/// In-memory vault used by tests and the `fleet-runtime` `--fake-drivers`
/// dev mode.
#[derive(Debug, Default, Clone)]
pub struct InMemoryVault {
    kaggle: HashMap<String, KaggleCredentials>,
    google: HashMap<String, GoogleCredentials>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kaggle(mut self, account_id: impl Into<String>, creds: KaggleCredentials) -> Self {
        self.kaggle.insert(account_id.into(), creds);
        self
    }

    pub fn with_google(mut self, account_id: impl Into<String>, creds: GoogleCredentials) -> Self {
        self.google.insert(account_id.into(), creds);
        self
    }
}

#[async_trait]
impl CredentialsVault for InMemoryVault {
    async fn retrieve_kaggle(&self, account_id: &str) -> Option<KaggleCredentials> {
        self.kaggle.get(account_id).cloned()
    }

    async fn retrieve_google(&self, account_id: &str) -> Option<GoogleCredentials> {
        self.google.get(account_id).cloned()
    }
}

/// Reads credentials straight from the process environment, keyed the same
/// way the secret surface names them (`KAGGLE_USERNAME_<n>`/`KAGGLE_KEY_<n>`,
/// `COLAB_EMAIL_<n>`/`COLAB_PASSWORD_<n>`). `account_id` is expected in the
/// `kaggle-<n>`/`colab-<n>` shape Auto-Discovery assigns.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvVault;

fn trailing_index(account_id: &str, prefix: &str) -> Option<&str> {
    account_id.strip_prefix(prefix)
}

#[async_trait]
impl CredentialsVault for EnvVault {
    async fn retrieve_kaggle(&self, account_id: &str) -> Option<KaggleCredentials> {
        let n = trailing_index(account_id, "kaggle-")?;
        let username = std::env::var(format!("KAGGLE_USERNAME_{n}")).ok()?;
        let key = std::env::var(format!("KAGGLE_KEY_{n}")).ok()?;
        Some(KaggleCredentials { username, key })
    }

    async fn retrieve_google(&self, account_id: &str) -> Option<GoogleCredentials> {
        let n = trailing_index(account_id, "colab-")?;
        let email = std::env::var(format!("COLAB_EMAIL_{n}")).ok()?;
        let password = std::env::var(format!("COLAB_PASSWORD_{n}")).ok()?;
        Some(GoogleCredentials { email, password })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_return_none() {
        let vault = InMemoryVault::new();
        assert!(vault.retrieve_kaggle("kaggle-1").await.is_none());
        assert!(vault.retrieve_google("colab-1").await.is_none());
    }

    #[tokio::test]
    async fn present_credentials_are_returned() {
        let vault = InMemoryVault::new().with_kaggle(
            "kaggle-1",
            KaggleCredentials {
                username: "u".into(),
                key: "k".into(),
            },
        );
        let creds = vault.retrieve_kaggle("kaggle-1").await.unwrap();
        assert_eq!(creds.username, "u");
    }
}
