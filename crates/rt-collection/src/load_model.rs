//! Load model contract: an external load-balancing subsystem
//! reads per-phase, per-element load through an interface
//! `get_modeled_load(element, phase_offset) → duration`, iteration
//! `begin()/end()` over elements, and metadata `num_subphases()`,
//! `num_completed_phases()`. The core collection manager calls
//! [`crate::phase::PhaseTracker::next_phase_collective`] at phase
//! boundaries; this trait is the read side a future load-balancing
//! policy (out of scope for this runtime) would consult.
//!
//! `begin()/end()` is a C++-iterator-pair shape; the
//! idiomatic Rust rendition is a single `begin()` that returns an
//! `Iterator`, since a Rust iterator's own exhaustion already plays the
//! role of `end()` — there is no separate sentinel type to expose.

use rt_types::Index;
use std::time::Duration;

/// Per-phase, per-element load history a balancing policy reads.
/// Generic over the element-id iterator so a collection with few
/// locally-owned indices doesn't need to box or allocate to implement
/// it.
pub trait LoadModel {
    type Iter: Iterator<Item = Index>;

    /// Locally-owned element ids, in the original's "begin()" sense.
    fn begin(&self) -> Self::Iter;

    /// Modeled duration of `element`'s work at `phase_offset` phases
    /// relative to the current one (`0` = current phase, negative =
    /// history). Panics on an `element` this model has no record for,
    /// or a `phase_offset` whose phase hasn't completed yet — both
    /// programming errors in a caller that didn't check
    /// [`Self::num_completed_phases`] first.
    fn get_modeled_load(&self, element: Index, phase_offset: i64) -> Duration;

    /// How many subphases each phase is broken into for finer-grained
    /// load attribution (e.g. separate communication/computation
    /// subphases). `1` when the model does not distinguish subphases.
    fn num_subphases(&self) -> u64 {
        1
    }

    /// How many phases have completed and therefore have recorded load
    /// history available to [`Self::get_modeled_load`].
    fn num_completed_phases(&self) -> u64;
}

/// Every locally-owned element costs the same fixed duration in every
/// completed phase: the default when no model is supplied, grounded on
/// the same "trivial default" role `UnitLoadModel` played before this
/// contract was filled in.
#[derive(Debug, Clone)]
pub struct UniformLoadModel {
    elements: Vec<Index>,
    per_element: Duration,
    completed_phases: u64,
}

impl UniformLoadModel {
    #[must_use]
    pub fn new(elements: Vec<Index>, per_element: Duration, completed_phases: u64) -> Self {
        Self { elements, per_element, completed_phases }
    }
}

impl LoadModel for UniformLoadModel {
    type Iter = std::vec::IntoIter<Index>;

    fn begin(&self) -> Self::Iter {
        self.elements.clone().into_iter()
    }

    /// # Panics
    ///
    /// Panics if `element` is not locally owned, or `phase_offset`
    /// refers to a phase that hasn't completed.
    fn get_modeled_load(&self, element: Index, phase_offset: i64) -> Duration {
        assert!(self.elements.contains(&element), "element {element} is not locally owned by this load model");
        assert!(
            phase_offset <= 0 && phase_offset.unsigned_abs() < self.completed_phases.max(1),
            "phase offset {phase_offset} has no recorded history ({} phases completed)",
            self.completed_phases
        );
        self.per_element
    }

    fn num_completed_phases(&self) -> u64 {
        self.completed_phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_types::Index;

    #[test]
    fn uniform_model_reports_the_same_cost_for_every_element() {
        let model = UniformLoadModel::new(vec![Index::one(0), Index::one(1)], Duration::from_millis(5), 3);
        assert_eq!(model.begin().count(), 2);
        assert_eq!(model.get_modeled_load(Index::one(0), 0), Duration::from_millis(5));
        assert_eq!(model.get_modeled_load(Index::one(1), -1), Duration::from_millis(5));
        assert_eq!(model.num_completed_phases(), 3);
        assert_eq!(model.num_subphases(), 1);
    }

    #[test]
    #[should_panic(expected = "is not locally owned")]
    fn unknown_element_panics() {
        let model = UniformLoadModel::new(vec![Index::one(0)], Duration::from_millis(1), 1);
        model.get_modeled_load(Index::one(9), 0);
    }
}
