//! The four cooperating control loops plus the on-demand activator.
//!
//! `fleet-core` supplies the pure quota/alternation transforms, `fleet-store`
//! the durable rows, `fleet-drivers` the provider automation, `fleet-planner`
//! the rotation schedule; this crate wires them into long-running tasks
//! using `tokio::task`, `tokio_util::sync::CancellationToken`, and
//! `tracing`, and exposes `StartGPU`/`StopGPU` as the two primitives every
//! loop and the activator share.

pub mod activator;
pub mod ctx;
pub mod drivers;
pub mod error;
pub mod idle_watcher;
pub mod jitter;
pub mod lifecycle;
pub mod pool_monitor;
pub mod quota_monitor;
pub mod rotation;

pub use activator::Activator;
pub use ctx::RotationCtx;
pub use drivers::DriverSet;
pub use error::ControllerError;
pub use idle_watcher::run_idle_watcher;
pub use lifecycle::{mark_unhealthy, start_gpu, stop_gpu};
pub use pool_monitor::run_pool_monitor;
pub use quota_monitor::run_quota_monitor;
pub use rotation::run_rotation_executor;
