//! Phase counter.
//!
//! Advancing a phase is collective in the sense that every node's
//! program calls it at the same logical point in its SPMD control flow
//! (typically right after an epoch completes) — there is no additional
//! wire protocol here, since the epoch that preceded it already acted as
//! the barrier.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PhaseTracker {
    completed: AtomicU64,
}

impl PhaseTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { completed: AtomicU64::new(0) }
    }

    #[must_use]
    pub fn num_completed_phases(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Advance to the next phase, returning its (1-based) number.
    pub fn next_phase_collective(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_monotonically() {
        let tracker = PhaseTracker::new();
        assert_eq!(tracker.num_completed_phases(), 0);
        assert_eq!(tracker.next_phase_collective(), 1);
        assert_eq!(tracker.next_phase_collective(), 2);
        assert_eq!(tracker.num_completed_phases(), 2);
    }
}
