use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::TriggerOutcome;

/// Counters for a coalescer, as of the moment [`Coalescer::stats`] was called.
///
/// [`Coalescer::stats`]: crate::Coalescer::stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoalescerStats {
    pub triggers: u64,
    pub armed: u64,
    pub absorbed: u64,
    pub follow_ups_requested: u64,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub faults: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    triggers: AtomicU64,
    armed: AtomicU64,
    absorbed: AtomicU64,
    follow_ups_requested: AtomicU64,
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    faults: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_trigger(&self, outcome: TriggerOutcome) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            TriggerOutcome::Armed => &self.armed,
            TriggerOutcome::Absorbed => &self.absorbed,
            TriggerOutcome::FollowUpRequested => &self.follow_ups_requested,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the 1-based number of the run that is starting.
    pub(crate) fn record_run_started(&self) -> u64 {
        self.runs_started.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CoalescerStats {
        CoalescerStats {
            triggers: self.triggers.load(Ordering::Relaxed),
            armed: self.armed.load(Ordering::Relaxed),
            absorbed: self.absorbed.load(Ordering::Relaxed),
            follow_ups_requested: self.follow_ups_requested.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}
