/// Capture driver state machine.
///
/// State transitions:
/// ```text
/// idle → armed → streaming ⇄ swamped
///          ↓         ↓          ↓
///          └──────→ stopped ←───┘
/// ```
///
/// `Swamped` is terminal for the session: the driver stops writing and
/// closes its backend, the owner is expected to disarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Armed,
    Streaming,
    Swamped,
    Stopped,
}

impl DriverState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_is_idle() {
        assert!(DriverState::Idle.is_idle());
        assert!(!DriverState::Armed.is_idle());
        assert!(!DriverState::Stopped.is_idle());
    }
}
