//! The coalescing state machine.
//!
//! Transitions here are pure: no IO, no clock, no tasks. The driver in
//! [`Coalescer`](crate::Coalescer) applies them atomically and then performs
//! whatever the returned decision asks for (arming a timer, spawning a
//! follow-up run).

use serde::Serialize;

/// Snapshot of a coalescer's bookkeeping.
///
/// `in_progress == 0 && !pending` is the idle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CoalesceState {
    pending: bool,
    in_progress: u32,
}

/// Which branch a trigger took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The coalescer was idle; a delay timer has been armed.
    Armed,
    /// A timer or follow-up run was already scheduled and will cover this trigger.
    Absorbed,
    /// A run is executing; exactly one more run will follow it.
    FollowUpRequested,
}

impl TriggerOutcome {
    /// Whether this outcome mutated the state.
    pub fn changes_state(self) -> bool {
        matches!(self, Self::Armed | Self::FollowUpRequested)
    }
}

impl CoalesceState {
    /// The rest state.
    pub const IDLE: Self = Self {
        pending: false,
        in_progress: 0,
    };

    /// No timer armed, no run executing, no follow-up owed.
    pub fn is_idle(&self) -> bool {
        !self.pending && self.in_progress == 0
    }

    /// A timer is armed (or a follow-up is scheduled) and has not started yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// A run of the operation is executing.
    pub fn is_running(&self) -> bool {
        self.in_progress > 0
    }

    /// Raw in-progress counter: 1 while running, plus one per trigger received
    /// during the run.
    pub fn in_progress(&self) -> u32 {
        self.in_progress
    }

    /// Whether the current run owes a follow-up.
    pub fn follow_up_owed(&self) -> bool {
        self.in_progress > 1
    }

    /// Apply a trigger.
    pub fn on_trigger(&mut self) -> TriggerOutcome {
        if self.in_progress > 0 {
            self.in_progress = self.in_progress.saturating_add(1);
            return TriggerOutcome::FollowUpRequested;
        }

        if self.pending {
            return TriggerOutcome::Absorbed;
        }

        self.pending = true;
        TriggerOutcome::Armed
    }

    /// The armed timer (or a scheduled follow-up) fired and a run begins.
    pub fn on_fire(&mut self) {
        self.pending = false;
        self.in_progress = 1;
    }

    /// The run finished, successfully or not.
    ///
    /// Returns `true` when a follow-up run must be spawned; `pending` is
    /// already set to reflect it.
    pub fn on_complete(&mut self) -> bool {
        let follow_up = self.in_progress > 1;
        if follow_up {
            self.pending = true;
        }
        self.in_progress = 0;
        follow_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_trigger_arms() {
        let mut state = CoalesceState::IDLE;

        assert_eq!(state.on_trigger(), TriggerOutcome::Armed);
        assert!(state.is_pending());
        assert!(!state.is_running());
        assert!(!state.is_idle());
    }

    #[test]
    fn pending_trigger_is_absorbed_without_change() {
        let mut state = CoalesceState::IDLE;
        state.on_trigger();
        let before = state;

        for _ in 0..10 {
            assert_eq!(state.on_trigger(), TriggerOutcome::Absorbed);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn fire_clears_pending_and_starts_run() {
        let mut state = CoalesceState::IDLE;
        state.on_trigger();
        state.on_fire();

        assert!(!state.is_pending());
        assert!(state.is_running());
        assert_eq!(state.in_progress(), 1);
        assert!(!state.follow_up_owed());
    }

    #[test]
    fn triggers_during_run_collapse_to_one_follow_up() {
        for extra in [1u32, 2, 5] {
            let mut state = CoalesceState::IDLE;
            state.on_trigger();
            state.on_fire();

            for _ in 0..extra {
                assert_eq!(state.on_trigger(), TriggerOutcome::FollowUpRequested);
            }
            assert_eq!(state.in_progress(), 1 + extra);
            assert!(!state.is_pending(), "no timer is armed during a run");

            assert!(state.on_complete());
            assert!(state.is_pending());
            assert_eq!(state.in_progress(), 0);

            // The follow-up runs and finishes quietly.
            state.on_fire();
            assert!(!state.on_complete());
            assert!(state.is_idle(), "extra={extra}");
        }
    }

    #[test]
    fn completion_without_triggers_returns_to_idle() {
        let mut state = CoalesceState::IDLE;
        state.on_trigger();
        state.on_fire();

        assert!(!state.on_complete());
        assert_eq!(state, CoalesceState::IDLE);
        assert_eq!(state.on_trigger(), TriggerOutcome::Armed);
    }

    #[test]
    fn follow_up_scheduled_absorbs_new_triggers() {
        let mut state = CoalesceState::IDLE;
        state.on_trigger();
        state.on_fire();
        state.on_trigger();
        state.on_complete();

        assert_eq!(state.on_trigger(), TriggerOutcome::Absorbed);
    }

    #[test]
    fn every_idle_trigger_arms() {
        let mut state = CoalesceState::IDLE;
        for _ in 0..3 {
            assert_eq!(state.on_trigger(), TriggerOutcome::Armed);
            state.on_fire();
            assert!(!state.on_complete());
            assert!(state.is_idle());
        }
    }

    #[test]
    fn only_mutating_outcomes_report_changes() {
        assert!(TriggerOutcome::Armed.changes_state());
        assert!(TriggerOutcome::FollowUpRequested.changes_state());
        assert!(!TriggerOutcome::Absorbed.changes_state());
    }
}
