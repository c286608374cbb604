#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prng::Prng;
use crate::synapse::{Step, Synapse, UnitId};

pub const RESTING_POTENTIAL: f64 = -70.0;
pub const THRESHOLD_POTENTIAL: f64 = -55.0;
pub const REFRACTORY_PERIOD: Step = 5;
pub const ACTIVATION_DECAY: f64 = 0.95;

/// Incoming signals are scaled by this before being added to the membrane potential.
pub const SIGNAL_GAIN: f64 = 10.0;

pub const SPEED_MIN: f64 = 0.1;
pub const SPEED_MAX: f64 = 0.5;

/// Standard deviation of the per-step heading perturbation.
pub const HEADING_NOISE: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f64 {
        Vec2::new(self.x - other.x, self.y - other.y).length()
    }

    /// Unit vector in the same direction. A zero vector is returned unchanged.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self::new(self.x / len, self.y / len)
        } else {
            self
        }
    }
}

impl core::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl core::ops::Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// A mobile spiking unit.
///
/// Owns its outgoing synapses; their targets are indices into the owning
/// simulation's unit arena.
#[derive(Debug, Clone)]
pub struct Neuron {
    pub(crate) position: Vec2,
    pub(crate) heading: Vec2,
    pub(crate) speed: f64,
    pub(crate) potential: f64,
    pub(crate) firing: bool,
    pub(crate) last_fired: Step,
    pub(crate) activation: f64,
    pub(crate) activation_decay: f64,
    pub(crate) synapses: Vec<Synapse>,
}

impl Neuron {
    /// A resting unit at `position` with a random heading and speed.
    pub fn spawn(position: Vec2, rng: &mut Prng) -> Self {
        let heading = Vec2::new(rng.gen_range_f64(-1.0, 1.0), rng.gen_range_f64(-1.0, 1.0));
        let speed = rng.gen_range_f64(SPEED_MIN, SPEED_MAX);
        Self::with_motion(position, heading.normalized(), speed)
    }

    pub fn with_motion(position: Vec2, heading: Vec2, speed: f64) -> Self {
        Self {
            position,
            heading,
            speed,
            potential: RESTING_POTENTIAL,
            firing: false,
            last_fired: -REFRACTORY_PERIOD,
            activation: 0.0,
            activation_decay: ACTIVATION_DECAY,
            synapses: Vec::new(),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn heading(&self) -> Vec2 {
        self.heading
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn potential(&self) -> f64 {
        self.potential
    }

    pub fn is_firing(&self) -> bool {
        self.firing
    }

    pub fn last_fired(&self) -> Step {
        self.last_fired
    }

    pub fn activation_level(&self) -> f64 {
        self.activation
    }

    pub fn activation_decay(&self) -> f64 {
        self.activation_decay
    }

    /// Every outgoing synapse, pruned ones included, in creation order.
    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn active_synapses(&self) -> impl Iterator<Item = &Synapse> + '_ {
        self.synapses.iter().filter(|s| s.active)
    }

    pub fn active_synapse_count(&self) -> usize {
        self.active_synapses().count()
    }

    /// Advance along the heading, reflect off the field edges, then jitter the heading.
    pub fn step_motion(&mut self, width: f64, height: f64, rng: &mut Prng) {
        self.position = self.position + self.heading * self.speed;

        if self.position.x < 0.0 || self.position.x > width {
            self.heading.x = -self.heading.x;
            self.position.x = self.position.x.clamp(0.0, width);
        }
        if self.position.y < 0.0 || self.position.y > height {
            self.heading.y = -self.heading.y;
            self.position.y = self.position.y.clamp(0.0, height);
        }

        self.heading.x += rng.gen_normal(0.0, HEADING_NOISE);
        self.heading.y += rng.gen_normal(0.0, HEADING_NOISE);
        self.heading = self.heading.normalized();
    }

    /// Append a synapse to `target` unless an active one already exists.
    ///
    /// Pruned synapses are ignored by the scan, so a pair that drifts back into
    /// range after pruning gets a second, fresh synapse.
    pub fn connect_to(&mut self, target: UnitId, strength: f64, now: Step) -> bool {
        if self.synapses.iter().any(|s| s.target == target && s.active) {
            return false;
        }
        self.synapses.push(Synapse::new(target, strength, now));
        true
    }

    pub fn is_close_enough(&self, other: &Neuron, threshold: f64) -> bool {
        self.position.distance(other.position) < threshold
    }

    pub fn in_refractory(&self, now: Step) -> bool {
        now.saturating_sub(self.last_fired) < REFRACTORY_PERIOD
    }

    /// Integrate an incoming signal. Returns true if it pushed the unit over threshold.
    pub fn receive_signal(&mut self, signal: f64, now: Step) -> bool {
        if self.in_refractory(now) {
            return false;
        }

        self.potential += signal * SIGNAL_GAIN;
        if self.potential >= THRESHOLD_POTENTIAL {
            self.fire(now);
            return true;
        }
        false
    }

    pub fn fire(&mut self, now: Step) {
        self.firing = true;
        self.last_fired = now;
        self.activation = 1.0;
        self.potential = RESTING_POTENTIAL;
    }

    /// End-of-step bookkeeping: activation decay, potential leak, firing reset and
    /// synapse plasticity.
    pub fn update(&mut self, now: Step) {
        self.activation *= self.activation_decay;

        if !self.firing && !self.in_refractory(now) && self.potential > RESTING_POTENTIAL {
            self.potential = (self.potential - 1.0).max(RESTING_POTENTIAL);
        }

        self.firing = false;

        let fired_now = now.saturating_sub(self.last_fired) < 1;
        for syn in self.synapses.iter_mut().filter(|s| s.active) {
            syn.decay();
            if fired_now {
                syn.strengthen();
            }
            syn.check_inactivity(now);
        }
    }
}
