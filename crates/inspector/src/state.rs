use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Connecting,
    Running,
    Reconnecting,
    Draining,
    Stopped,
}

impl LoopState {
    /// Whether the loop may move from `self` to `next`.
    ///
    /// Every live state can drain; only draining can stop.
    pub fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (Idle, Connecting) => true,
            (Connecting, Running) | (Connecting, Reconnecting) => true,
            (Running, Reconnecting) => true,
            (Reconnecting, Running) => true,
            (Draining, Stopped) => true,
            (Stopped, _) | (Draining, _) => false,
            (_, Draining) => true,
            _ => false,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(
            self,
            LoopState::Connecting | LoopState::Running | LoopState::Reconnecting
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Connecting => "connecting",
            LoopState::Running => "running",
            LoopState::Reconnecting => "reconnecting",
            LoopState::Draining => "draining",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a run ended without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    Exhausted,
    MaxCaptures,
    MaxDuration,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::Interrupted => "interrupted",
            StopReason::Exhausted => "source exhausted",
            StopReason::MaxCaptures => "capture limit reached",
            StopReason::MaxDuration => "duration limit reached",
        };
        f.write_str(reason)
    }
}

/// How a run ended: a clean stop, or the fatal error that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(StopReason),
    Failed(String),
}

impl RunOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(reason) => write!(f, "{}", reason),
            RunOutcome::Failed(cause) => write!(f, "failed: {}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LoopState::*;
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [Idle, Connecting, Running, Reconnecting, Running, Draining, Stopped];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn every_live_state_can_drain() {
        for state in [Idle, Connecting, Running, Reconnecting] {
            assert!(state.can_transition_to(Draining), "{state}");
        }
    }

    #[test]
    fn stopped_is_terminal() {
        for next in [Idle, Connecting, Running, Reconnecting, Draining, Stopped] {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn shortcuts_are_rejected() {
        assert!(!Idle.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
        assert!(!Reconnecting.can_transition_to(Stopped));
        assert!(!Draining.can_transition_to(Running));
        assert!(!Running.can_transition_to(Connecting));
    }

    #[test]
    fn outcome_display() {
        assert_eq!(
            RunOutcome::Completed(StopReason::Exhausted).to_string(),
            "source exhausted"
        );
        assert!(!RunOutcome::Failed("camera lost".into()).is_clean());
    }
}
