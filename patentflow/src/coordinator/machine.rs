//! The coordinator's state machine.
//!
//! `Idle -> Planning -> Delegating(i) -> Validating(i)`, then either the next
//! stage, a retry of the same stage, `Completed` or `Failed`. The machine owns
//! the per-stage attempt counters and the total delegation count; it never
//! lets a counter pass the ceiling. Alongside each counter it keeps the
//! outcome of the stage's current attempt.

use crate::core::AttemptOutcome;
use crate::errors::PipelineError;
use serde::Serialize;
use std::fmt;

/// Where the coordinator is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// The project skeleton and task list are being prepared.
    Planning,
    /// A stage worker is being invoked.
    Delegating {
        /// Stage index in registry order.
        stage: usize,
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// A stage's outputs are being checked.
    Validating {
        /// Stage index in registry order.
        stage: usize,
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// Every stage passed validation.
    Completed,
    /// The run stopped early.
    Failed,
}

impl Phase {
    /// Returns true for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Planning => write!(f, "planning"),
            Self::Delegating { stage, attempt } => write!(f, "delegating({stage}, #{attempt})"),
            Self::Validating { stage, attempt } => write!(f, "validating({stage}, #{attempt})"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of a failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Delegate the same stage again with this attempt number.
    Retry(u32),
    /// The ceiling was reached after this many attempts.
    Exhausted(u32),
}

/// Attempt accounting and phase transitions for one run.
#[derive(Debug, Clone)]
pub struct StageMachine {
    phase: Phase,
    max_attempts: u32,
    attempts: Vec<u32>,
    outcomes: Vec<AttemptOutcome>,
    delegations: u32,
}

impl StageMachine {
    /// Creates a machine for `stage_count` stages.
    #[must_use]
    pub fn new(stage_count: usize, max_attempts: u32) -> Self {
        Self {
            phase: Phase::Idle,
            max_attempts: max_attempts.max(1),
            attempts: vec![0; stage_count],
            outcomes: vec![AttemptOutcome::Pending; stage_count],
            delegations: 0,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The retry ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts made so far for a stage.
    #[must_use]
    pub fn attempts(&self, stage: usize) -> u32 {
        self.attempts.get(stage).copied().unwrap_or(0)
    }

    /// Attempt counts for every stage, in order.
    #[must_use]
    pub fn attempt_counts(&self) -> &[u32] {
        &self.attempts
    }

    /// Outcome of a stage's current attempt.
    #[must_use]
    pub fn outcome(&self, stage: usize) -> AttemptOutcome {
        self.outcomes.get(stage).copied().unwrap_or_default()
    }

    /// Current-attempt outcomes for every stage, in order.
    #[must_use]
    pub fn outcomes(&self) -> &[AttemptOutcome] {
        &self.outcomes
    }

    /// Total worker invocations so far.
    #[must_use]
    pub fn delegations(&self) -> u32 {
        self.delegations
    }

    /// `Idle -> Planning`.
    pub fn plan(&mut self) -> Result<Phase, PipelineError> {
        match self.phase {
            Phase::Idle => self.enter(Phase::Planning),
            other => Err(Self::invalid("plan", other)),
        }
    }

    /// `Planning -> Delegating(0)`, or `Completed` when there are no stages.
    pub fn start(&mut self) -> Result<Phase, PipelineError> {
        match self.phase {
            Phase::Planning if self.attempts.is_empty() => self.enter(Phase::Completed),
            Phase::Planning => self.delegate(0),
            other => Err(Self::invalid("start", other)),
        }
    }

    /// `Delegating(i) -> Validating(i)` once the worker returned.
    pub fn delegated(&mut self) -> Result<Phase, PipelineError> {
        match self.phase {
            Phase::Delegating { stage, attempt } => {
                self.enter(Phase::Validating { stage, attempt })
            }
            other => Err(Self::invalid("delegated", other)),
        }
    }

    /// `Validating(i) -> Delegating(i + 1)`, or `Completed` after the last stage.
    pub fn passed(&mut self) -> Result<Phase, PipelineError> {
        match self.phase {
            Phase::Validating { stage, .. } => {
                self.set_outcome(stage, AttemptOutcome::Success);
                if stage + 1 < self.attempts.len() {
                    self.delegate(stage + 1)
                } else {
                    self.enter(Phase::Completed)
                }
            }
            other => Err(Self::invalid("passed", other)),
        }
    }

    /// Records a failed validation: retry the stage or fail the run.
    pub fn rejected(&mut self) -> Result<RetryDecision, PipelineError> {
        match self.phase {
            Phase::Validating { stage, attempt } if attempt < self.max_attempts => {
                self.set_outcome(stage, AttemptOutcome::FailedValidation);
                self.delegate(stage)?;
                Ok(RetryDecision::Retry(attempt + 1))
            }
            Phase::Validating { stage, attempt } => {
                self.set_outcome(stage, AttemptOutcome::FailedValidation);
                self.enter(Phase::Failed)?;
                Ok(RetryDecision::Exhausted(attempt))
            }
            other => Err(Self::invalid("rejected", other)),
        }
    }

    /// Moves to `Failed` from any phase. Used for upstream faults and cancellation.
    ///
    /// An attempt still in flight is marked [`AttemptOutcome::FailedError`].
    pub fn abort(&mut self) {
        if let Phase::Delegating { stage, .. } | Phase::Validating { stage, .. } = self.phase {
            self.set_outcome(stage, AttemptOutcome::FailedError);
        }
        self.phase = Phase::Failed;
    }

    fn delegate(&mut self, stage: usize) -> Result<Phase, PipelineError> {
        let count = self
            .attempts
            .get_mut(stage)
            .ok_or_else(|| PipelineError::Internal(format!("no stage at index {stage}")))?;
        if *count >= self.max_attempts {
            return Err(PipelineError::Internal(format!(
                "stage {stage} already used {count} attempts"
            )));
        }
        *count += 1;
        self.delegations += 1;
        let attempt = *count;
        self.set_outcome(stage, AttemptOutcome::Pending);
        self.enter(Phase::Delegating { stage, attempt })
    }

    fn set_outcome(&mut self, stage: usize, outcome: AttemptOutcome) {
        if let Some(slot) = self.outcomes.get_mut(stage) {
            *slot = outcome;
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<Phase, PipelineError> {
        tracing::debug!(from = %self.phase, to = %phase, "coordinator transition");
        self.phase = phase;
        Ok(phase)
    }

    fn invalid(action: &str, phase: Phase) -> PipelineError {
        PipelineError::Internal(format!("cannot {action} while {phase}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_first_stage(stages: usize, max: u32) -> StageMachine {
        let mut machine = StageMachine::new(stages, max);
        machine.plan().unwrap();
        machine.start().unwrap();
        machine
    }

    #[test]
    fn test_happy_path() {
        let mut machine = at_first_stage(2, 5);
        assert_eq!(machine.phase(), Phase::Delegating { stage: 0, attempt: 1 });

        machine.delegated().unwrap();
        assert_eq!(machine.passed().unwrap(), Phase::Delegating { stage: 1, attempt: 1 });
        machine.delegated().unwrap();
        assert_eq!(machine.passed().unwrap(), Phase::Completed);
        assert_eq!(machine.delegations(), 2);
        assert!(machine.phase().is_terminal());
    }

    #[test]
    fn test_retry_until_ceiling() {
        let mut machine = at_first_stage(3, 5);

        for expected in 2..=5 {
            machine.delegated().unwrap();
            assert_eq!(machine.rejected().unwrap(), RetryDecision::Retry(expected));
        }
        machine.delegated().unwrap();
        assert_eq!(machine.rejected().unwrap(), RetryDecision::Exhausted(5));

        assert_eq!(machine.phase(), Phase::Failed);
        assert_eq!(machine.attempts(0), 5);
        assert_eq!(machine.attempts(1), 0);
        assert_eq!(machine.delegations(), 5);
        assert_eq!(machine.outcome(0), AttemptOutcome::FailedValidation);
        assert_eq!(machine.outcome(1), AttemptOutcome::Pending);
    }

    #[test]
    fn test_retry_then_pass() {
        let mut machine = at_first_stage(2, 5);
        machine.delegated().unwrap();
        machine.rejected().unwrap();
        machine.delegated().unwrap();
        machine.passed().unwrap();

        assert_eq!(machine.attempt_counts(), &[2, 1]);
        assert_eq!(
            machine.outcomes(),
            &[AttemptOutcome::Success, AttemptOutcome::Pending]
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let mut machine = StageMachine::new(1, 5);
        assert!(machine.start().is_err());
        assert!(machine.delegated().is_err());

        machine.plan().unwrap();
        assert!(machine.plan().is_err());
        machine.start().unwrap();
        assert!(machine.passed().is_err());
        assert!(machine.rejected().is_err());
    }

    #[test]
    fn test_abort_from_delegating() {
        let mut machine = at_first_stage(2, 5);
        machine.abort();
        assert_eq!(machine.phase(), Phase::Failed);
        assert_eq!(machine.outcome(0), AttemptOutcome::FailedError);
        assert!(machine.delegated().is_err());

        machine.abort();
        assert_eq!(machine.outcome(0), AttemptOutcome::FailedError);
    }

    #[test]
    fn test_zero_ceiling_is_one_attempt() {
        let mut machine = at_first_stage(1, 0);
        machine.delegated().unwrap();
        assert_eq!(machine.rejected().unwrap(), RetryDecision::Exhausted(1));
    }
}
