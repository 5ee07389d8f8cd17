//! Shared handles passed to every control loop. In-process singletons
//! become explicit dependencies passed to the controller rather than
//! global mutable state; this struct is that dependency bundle.

use std::sync::Arc;

use fleet_drivers::CredentialsVault;
use fleet_gateway::Gateway;
use fleet_store::Store;

use crate::drivers::DriverSet;

#[derive(Clone)]
pub struct RotationCtx {
    pub store: Arc<Store>,
    pub gateway: Gateway,
    pub drivers: Arc<DriverSet>,
    pub vault: Arc<dyn CredentialsVault>,
}
