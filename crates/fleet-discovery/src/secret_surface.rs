//! Secret surface: a string→string map indexed by environment-style keys.
//! Modeled as a trait so `fleet-runtime` can wire a real `std::env`-backed
//! implementation while tests use a plain map.

use std::collections::HashMap;
use std::env;

pub trait SecretSurface: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Real implementation: reads from the process environment.
pub struct EnvSecretSurface;

impl SecretSurface for EnvSecretSurface {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// In-memory fake used by tests and `--fake-drivers` dev mode.
#[derive(Debug, Default, Clone)]
pub struct MapSecretSurface(pub HashMap<String, String>);

impl MapSecretSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl SecretSurface for MapSecretSurface {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}
