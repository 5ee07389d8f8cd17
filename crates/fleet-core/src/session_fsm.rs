//! Session status state machine.
//!
//! `fleet-store` enforces at most one live session per worker with a SQL
//! index, and never updates `expiresAt` or re-opens a terminated row; this
//! module is the pure "is this transition legal" predicate both
//! `fleet-store`'s CAS guards and `fleet-daemon`'s orchestration logic
//! consult before attempting a write.

use crate::types::SessionStatus;

/// Legal transitions: `starting -> active -> idle? -> terminated`, with a
/// direct `active -> terminated` and `starting -> terminated` escape path
/// for startup failures/timeouts. `terminated` is absorbing.
pub fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    match (from, to) {
        (Starting, Active) => true,
        (Starting, Terminated) => true,
        (Active, Idle) => true,
        (Active, Terminated) => true,
        (Idle, Active) => true,
        (Idle, Terminated) => true,
        (a, b) if a == b => false, // no-op transitions are not writes
        (Terminated, _) => false,  // absorbing
        _ => false,
    }
}

/// `starting` rows older than this are presumed orphaned by a crashed
/// controller.
pub const STARTUP_TIMEOUT_SECS: i64 = 10 * 60;

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn happy_path_is_valid() {
        assert!(is_valid_transition(Starting, Active));
        assert!(is_valid_transition(Active, Idle));
        assert!(is_valid_transition(Idle, Active));
        assert!(is_valid_transition(Active, Terminated));
        assert!(is_valid_transition(Idle, Terminated));
        assert!(is_valid_transition(Starting, Terminated));
    }

    #[test]
    fn terminal_state_is_absorbing() {
        assert!(!is_valid_transition(Terminated, Starting));
        assert!(!is_valid_transition(Terminated, Active));
        assert!(!is_valid_transition(Terminated, Idle));
        assert!(!is_valid_transition(Terminated, Terminated));
    }

    #[test]
    fn cannot_skip_backwards_to_starting() {
        assert!(!is_valid_transition(Active, Starting));
        assert!(!is_valid_transition(Idle, Starting));
    }

    #[test]
    fn no_op_is_not_a_valid_write() {
        assert!(!is_valid_transition(Active, Active));
        assert!(!is_valid_transition(Starting, Starting));
    }
}
