//! Pure, side-effect-free core of the GPU fleet lifecycle controller.
//!
//! No tokio, no rusqlite, no I/O: every state machine here is a free
//! function over immutable inputs that returns a new state (and, where
//! the caller needs one, a decision). Durable persistence, provider
//! automation, and scheduling live in sibling crates that depend on
//! this one.

pub mod alternation;
pub mod error;
pub mod quota;
pub mod session_fsm;
pub mod types;

pub use error::FleetError;
pub use types::{Provider, Session, SessionStatus, ShutdownReason, Worker, WorkerStatus};
