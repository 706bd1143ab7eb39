//! Reader link state machine.
//!
//! # Valid Transitions
//!
//! - Disconnected → Connecting → Connected → Disconnected
//! - Connecting → Failed → Disconnected (timeout or driver error)
//! - Connected → Failed → Disconnected (driver fault)
//!
//! # Examples
//!
//! ```
//! use taglink_pipeline::{ReaderState, ReaderStateMachine};
//!
//! let mut machine = ReaderStateMachine::new();
//! machine.transition_to(ReaderState::Connecting).unwrap();
//! machine.transition_to(ReaderState::Connected).unwrap();
//!
//! assert!(machine.transition_to(ReaderState::Connecting).is_err());
//! assert_eq!(machine.history().len(), 2);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use taglink_core::{Error, Result};

/// Maximum number of transitions kept for status reporting.
pub const MAX_HISTORY_SIZE: usize = 100;

/// Link state of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderState {
    /// No session. The only state accepting a connect request.
    Disconnected,

    /// A driver connect is in flight.
    Connecting,

    /// A session is live and batches flow into the pipeline.
    Connected,

    /// The last connect or session ended in error. Always followed by
    /// `Disconnected`.
    Failed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ReaderState::Disconnected => "Disconnected",
            ReaderState::Connecting => "Connecting",
            ReaderState::Connected => "Connected",
            ReaderState::Failed => "Failed",
        };
        write!(f, "{}", state_str)
    }
}

impl ReaderState {
    /// Whether `target` is reachable in one step.
    ///
    /// ```
    /// use taglink_pipeline::ReaderState;
    ///
    /// assert!(ReaderState::Disconnected.can_transition_to(&ReaderState::Connecting));
    /// assert!(!ReaderState::Disconnected.can_transition_to(&ReaderState::Connected));
    /// ```
    pub fn can_transition_to(&self, target: &ReaderState) -> bool {
        matches!(
            (self, target),
            (ReaderState::Disconnected, ReaderState::Connecting)
                | (ReaderState::Connecting, ReaderState::Connected | ReaderState::Failed)
                | (ReaderState::Connected, ReaderState::Disconnected | ReaderState::Failed)
                | (ReaderState::Failed, ReaderState::Disconnected)
        )
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub from: ReaderState,
    pub to: ReaderState,
    pub timestamp: DateTime<Utc>,

    /// Failure description for transitions into `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StateTransition {
    pub fn new(from: ReaderState, to: ReaderState, reason: Option<String>) -> Self {
        Self {
            from,
            to,
            timestamp: Utc::now(),
            reason,
        }
    }
}

/// Current state plus a bounded transition history.
#[derive(Debug)]
pub struct ReaderStateMachine {
    current: ReaderState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
}

impl ReaderStateMachine {
    pub fn new() -> Self {
        Self {
            current: ReaderState::Disconnected,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn current_state(&self) -> ReaderState {
        self.current
    }

    /// Time spent in the current state.
    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    /// Move to `target`, or fail with `InvalidStateTransition`.
    pub fn transition_to(&mut self, target: ReaderState) -> Result<()> {
        self.transition_with_reason(target, None)
    }

    /// Move to `target`, recording why.
    pub fn transition_with_reason(
        &mut self,
        target: ReaderState,
        reason: Option<String>,
    ) -> Result<()> {
        if !self.current.can_transition_to(&target) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }

        self.add_to_history(StateTransition::new(self.current, target, reason));
        self.current = target;
        self.entered_at = Instant::now();
        Ok(())
    }

    /// Full history, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(count);
        self.history.iter().skip(skip).cloned().collect()
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

impl Default for ReaderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ReaderState::Disconnected, ReaderState::Connecting, true)]
    #[case(ReaderState::Connecting, ReaderState::Connected, true)]
    #[case(ReaderState::Connecting, ReaderState::Failed, true)]
    #[case(ReaderState::Connected, ReaderState::Disconnected, true)]
    #[case(ReaderState::Connected, ReaderState::Failed, true)]
    #[case(ReaderState::Failed, ReaderState::Disconnected, true)]
    #[case(ReaderState::Disconnected, ReaderState::Connected, false)]
    #[case(ReaderState::Connecting, ReaderState::Disconnected, false)]
    #[case(ReaderState::Connected, ReaderState::Connecting, false)]
    #[case(ReaderState::Failed, ReaderState::Connecting, false)]
    #[case(ReaderState::Disconnected, ReaderState::Disconnected, false)]
    fn test_transition_table(
        #[case] from: ReaderState,
        #[case] to: ReaderState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut machine = ReaderStateMachine::new();
        let err = machine.transition_to(ReaderState::Connected).unwrap_err();

        assert!(matches!(err, Error::InvalidStateTransition { .. }));
        assert_eq!(machine.current_state(), ReaderState::Disconnected);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_failure_reason_recorded() {
        let mut machine = ReaderStateMachine::new();
        machine.transition_to(ReaderState::Connecting).unwrap();
        machine
            .transition_with_reason(ReaderState::Failed, Some("refused".to_string()))
            .unwrap();
        machine.transition_to(ReaderState::Disconnected).unwrap();

        let last = machine.last_transitions(2);
        assert_eq!(last[0].to, ReaderState::Failed);
        assert_eq!(last[0].reason.as_deref(), Some("refused"));
        assert_eq!(last[1].to, ReaderState::Disconnected);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut machine = ReaderStateMachine::new();
        for _ in 0..60 {
            machine.transition_to(ReaderState::Connecting).unwrap();
            machine.transition_to(ReaderState::Connected).unwrap();
            machine.transition_to(ReaderState::Disconnected).unwrap();
        }

        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.last_transitions(1)[0].to, ReaderState::Disconnected);
        assert_eq!(machine.last_transitions(500).len(), MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&ReaderState::Connecting).unwrap();
        assert_eq!(json, "\"connecting\"");
    }
}
