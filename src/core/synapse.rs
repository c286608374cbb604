#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a unit in its simulation's arena. Stable for the lifetime of a run.
pub type UnitId = usize;

/// Discrete simulation time. Signed because a fresh unit's last firing sits at
/// `-REFRACTORY_PERIOD`.
pub type Step = i64;

pub const STRENGTH_MIN: f64 = 0.1;
pub const STRENGTH_MAX: f64 = 1.0;
pub const LEARNING_RATE: f64 = 0.05;
pub const DECAY_RATE: f64 = 0.01;
/// Steps a synapse may go unused before it is pruned.
pub const INACTIVITY_THRESHOLD: Step = 50;

/// Directed weighted edge, owned by its source unit.
///
/// Synapses are never removed from their owner's list. Pruning only clears
/// `active`, after which the synapse is skipped by propagation and snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Synapse {
    pub target: UnitId,
    pub(crate) strength: f64,
    pub(crate) last_used: Step,
    pub(crate) active: bool,
}

impl Synapse {
    pub fn new(target: UnitId, strength: f64, now: Step) -> Self {
        Self {
            target,
            strength,
            last_used: now,
            active: true,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn last_used(&self) -> Step {
        self.last_used
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn strengthen(&mut self) {
        self.strength = (self.strength + LEARNING_RATE).min(STRENGTH_MAX);
    }

    pub fn decay(&mut self) {
        self.strength = (self.strength - DECAY_RATE).max(STRENGTH_MIN);
    }

    /// One-way: nothing in the step pipeline brings a pruned synapse back.
    pub fn check_inactivity(&mut self, now: Step) {
        if now.saturating_sub(self.last_used) > INACTIVITY_THRESHOLD {
            self.active = false;
        }
    }

    /// Refresh recency and reactivate. Available to drivers; the step pipeline
    /// never calls it.
    pub fn mark_used(&mut self, now: Step) {
        self.last_used = now;
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strengthen_saturates_at_max() {
        let mut s = Synapse::new(1, 0.98, 0);
        s.strengthen();
        assert_eq!(s.strength(), STRENGTH_MAX);
        s.strengthen();
        assert_eq!(s.strength(), STRENGTH_MAX);
    }

    #[test]
    fn decay_floors_at_min() {
        let mut s = Synapse::new(1, 0.105, 0);
        s.decay();
        assert_eq!(s.strength(), STRENGTH_MIN);
        for _ in 0..100 {
            s.decay();
        }
        assert_eq!(s.strength(), STRENGTH_MIN);
    }

    #[test]
    fn inactivity_boundary_is_strict() {
        let mut s = Synapse::new(3, 0.5, 10);
        s.check_inactivity(10 + INACTIVITY_THRESHOLD);
        assert!(s.is_active());
        s.check_inactivity(10 + INACTIVITY_THRESHOLD + 1);
        assert!(!s.is_active());

        // Staying unused does not flip it back.
        s.check_inactivity(10);
        assert!(!s.is_active());
    }

    #[test]
    fn inactivity_check_survives_extreme_steps() {
        let mut s = Synapse::new(3, 0.5, Step::MIN);
        s.check_inactivity(1);
        assert!(!s.is_active());

        let mut s = Synapse::new(3, 0.5, Step::MAX);
        s.check_inactivity(Step::MIN);
        assert!(s.is_active());
    }

    #[test]
    fn mark_used_reactivates() {
        let mut s = Synapse::new(3, 0.5, 0);
        s.check_inactivity(INACTIVITY_THRESHOLD + 1);
        assert!(!s.is_active());

        s.mark_used(200);
        assert!(s.is_active());
        assert_eq!(s.last_used(), 200);
    }
}
