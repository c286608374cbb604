use std::io::{self, Read, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::neuron::{Neuron, Vec2, REFRACTORY_PERIOD};
use crate::prng::Prng;
use crate::storage;
use crate::synapse::{Step, Synapse, UnitId, STRENGTH_MAX, STRENGTH_MIN};

/// Probability that any given unit fires spontaneously in a step.
pub const ACTIVATION_CHANCE: f64 = 0.05;

/// Largest step accepted from a record or image. Exactly representable as `f64`.
pub const MAX_PERSISTED_STEP: Step = 1 << 52;

/// Steps read back from disk must lie in `-REFRACTORY_PERIOD..=MAX_PERSISTED_STEP`.
pub(crate) fn is_persisted_step(step: Step) -> bool {
    (-REFRACTORY_PERIOD..=MAX_PERSISTED_STEP).contains(&step)
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimConfig {
    pub unit_count: usize,
    pub width: f64,
    pub height: f64,
    /// Units closer than this (strictly) grow a synapse toward each other.
    pub connection_threshold: f64,
    /// Per-unit, per-step spontaneous firing probability.
    pub activation_chance: f64,
    /// If set, makes a run reproducible.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            unit_count: 200,
            width: 800.0,
            height: 600.0,
            connection_threshold: 80.0,
            activation_chance: ACTIVATION_CHANCE,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Maximum allowed unit count. Connection discovery is quadratic.
    pub const MAX_UNITS: usize = 1 << 16;

    /// # Panics
    /// Panics if the field or threshold are not positive, or the unit count is too large.
    pub fn new(unit_count: usize, width: f64, height: f64, connection_threshold: f64) -> Self {
        assert!(
            unit_count <= Self::MAX_UNITS,
            "unit_count must be <= {}",
            Self::MAX_UNITS
        );
        assert!(width > 0.0 && height > 0.0, "field must have positive size");
        assert!(
            connection_threshold > 0.0,
            "connection_threshold must be > 0"
        );

        Self {
            unit_count,
            width,
            height,
            connection_threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> core::result::Result<(), &'static str> {
        if self.unit_count > Self::MAX_UNITS {
            return Err("unit_count too large");
        }
        if !self.width.is_finite() || self.width <= 0.0 {
            return Err("width must be finite and > 0");
        }
        if !self.height.is_finite() || self.height <= 0.0 {
            return Err("height must be finite and > 0");
        }
        if !self.connection_threshold.is_finite() || self.connection_threshold <= 0.0 {
            return Err("connection_threshold must be finite and > 0");
        }
        if !(0.0..=1.0).contains(&self.activation_chance) {
            return Err("activation_chance must be in [0, 1]");
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_activation_chance(mut self, chance: f64) -> Self {
        self.activation_chance = chance;
        self
    }

    pub fn with_unit_count(mut self, unit_count: usize) -> Self {
        self.unit_count = unit_count;
        self
    }
}

/// Runtime diagnostics about the simulation's current state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub step: Step,
    pub unit_count: usize,
    pub active_synapses: usize,
    /// Pruned synapses still held in storage.
    pub inactive_synapses: usize,
    /// Units whose firing flag is currently set.
    pub firing_count: usize,
    pub avg_activation: f64,
    pub avg_potential: f64,
}

/// A field of mobile spiking units that wire themselves by proximity.
///
/// The unit vector is an arena: a unit's index is its identity, and synapses refer
/// to their targets by that index. Units are never added or removed after
/// construction.
pub struct Simulation {
    cfg: SimConfig,
    units: Vec<Neuron>,
    rng: Prng,
    current_step: Step,

    // Scratch for the firing snapshot; reused across steps.
    firing_scratch: Vec<UnitId>,
    positions_scratch: Vec<Vec2>,
}

impl Simulation {
    /// Scatter `cfg.unit_count` units uniformly over the field with random headings
    /// and speeds.
    pub fn new(cfg: SimConfig) -> Self {
        let mut rng = match cfg.seed {
            Some(seed) => Prng::new(seed),
            None => Prng::from_entropy(),
        };

        let mut units = Vec::with_capacity(cfg.unit_count);
        for _ in 0..cfg.unit_count {
            let x = rng.gen_range_f64(0.0, cfg.width);
            let y = rng.gen_range_f64(0.0, cfg.height);
            units.push(Neuron::spawn(Vec2::new(x, y), &mut rng));
        }

        Self::from_parts(cfg, units, rng, 0)
    }

    /// Validating constructor for configs that come from outside the program.
    pub fn try_new(cfg: SimConfig) -> Result<Self> {
        cfg.validate().map_err(SimError::InvalidConfig)?;
        Ok(Self::new(cfg))
    }

    /// Place units explicitly. Used by tests and by drivers that lay out fixed arrangements.
    pub fn with_units(cfg: SimConfig, units: Vec<Neuron>) -> Self {
        let rng = match cfg.seed {
            Some(seed) => Prng::new(seed),
            None => Prng::from_entropy(),
        };
        let cfg = SimConfig {
            unit_count: units.len(),
            ..cfg
        };
        Self::from_parts(cfg, units, rng, 0)
    }

    fn from_parts(cfg: SimConfig, units: Vec<Neuron>, rng: Prng, current_step: Step) -> Self {
        let n = units.len();
        Self {
            cfg,
            units,
            rng,
            current_step,
            firing_scratch: Vec::with_capacity(n),
            positions_scratch: Vec::with_capacity(n),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn width(&self) -> f64 {
        self.cfg.width
    }

    pub fn height(&self) -> f64 {
        self.cfg.height
    }

    pub fn connection_threshold(&self) -> f64 {
        self.cfg.connection_threshold
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn units(&self) -> &[Neuron] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> Option<&Neuron> {
        self.units.get(id)
    }

    pub fn total_active_synapses(&self) -> usize {
        self.units.iter().map(Neuron::active_synapse_count).sum()
    }

    pub fn firing_count(&self) -> usize {
        self.units.iter().filter(|u| u.is_firing()).count()
    }

    /// The trailing `n` units (fewer if the population is smaller), in index order.
    pub fn tail_units(&self, n: usize) -> &[Neuron] {
        let start = self.units.len().saturating_sub(n);
        &self.units[start..]
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut active = 0usize;
        let mut total = 0usize;
        let mut firing = 0usize;
        let mut act_sum = 0.0;
        let mut pot_sum = 0.0;

        for u in &self.units {
            total += u.synapses().len();
            active += u.active_synapse_count();
            firing += u.is_firing() as usize;
            act_sum += u.activation_level();
            pot_sum += u.potential();
        }

        let n = self.units.len().max(1) as f64;
        Diagnostics {
            step: self.current_step,
            unit_count: self.units.len(),
            active_synapses: active,
            inactive_synapses: total - active,
            firing_count: firing,
            avg_activation: act_sum / n,
            avg_potential: pot_sum / n,
        }
    }

    /// Make a unit fire as if it crossed threshold at `at_step`.
    ///
    /// This is the injection hook for training and recognition. The unit propagates on
    /// the next `step()` call.
    pub fn force_fire(&mut self, id: UnitId, at_step: Step) -> Result<()> {
        let count = self.units.len();
        let unit = self
            .units
            .get_mut(id)
            .ok_or(SimError::UnitOutOfRange { index: id, count })?;
        unit.fire(at_step);
        Ok(())
    }

    /// Grow a synapse from `source` to `target` unless an active one exists.
    /// Returns whether a synapse was added.
    pub fn connect(
        &mut self,
        source: UnitId,
        target: UnitId,
        strength: f64,
        now: Step,
    ) -> Result<bool> {
        let count = self.units.len();
        if target >= count {
            return Err(SimError::UnitOutOfRange {
                index: target,
                count,
            });
        }
        let unit = self
            .units
            .get_mut(source)
            .ok_or(SimError::UnitOutOfRange {
                index: source,
                count,
            })?;
        Ok(unit.connect_to(target, strength, now))
    }

    /// Advance the simulation by one step.
    ///
    /// Phase order is fixed: move, connect, snapshot firing units, propagate,
    /// update, spontaneous activation.
    pub fn step(&mut self) {
        self.current_step += 1;
        let now = self.current_step;

        self.move_units();
        self.discover_connections(now);

        self.firing_scratch.clear();
        self.firing_scratch.extend(
            self.units
                .iter()
                .enumerate()
                .filter(|(_, u)| u.is_firing())
                .map(|(i, _)| i),
        );
        self.propagate(now);

        for u in &mut self.units {
            u.update(now);
        }

        self.spontaneous_activation(now);
    }

    /// Run `n` steps.
    pub fn run(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    fn move_units(&mut self) {
        let (w, h) = (self.cfg.width, self.cfg.height);
        for u in &mut self.units {
            u.step_motion(w, h, &mut self.rng);
        }
    }

    fn discover_connections(&mut self, now: Step) {
        let threshold = self.cfg.connection_threshold;

        // Positions are frozen for this phase; copy them so each unit can be borrowed
        // mutably while its neighbours are read.
        self.positions_scratch.clear();
        self.positions_scratch
            .extend(self.units.iter().map(Neuron::position));

        for (i, unit) in self.units.iter_mut().enumerate() {
            let pi = self.positions_scratch[i];
            for (j, &pj) in self.positions_scratch.iter().enumerate() {
                if i == j {
                    continue;
                }
                let dist = pi.distance(pj);
                if dist < threshold {
                    let strength = 0.5 + 0.5 * (1.0 - dist / threshold);
                    unit.connect_to(j, strength, now);
                }
            }
        }
    }

    fn propagate(&mut self, now: Step) {
        // Only units in the snapshot propagate; anything that crosses threshold here
        // waits for the next step.
        for k in 0..self.firing_scratch.len() {
            let source = self.firing_scratch[k];
            for s in 0..self.units[source].synapses.len() {
                let syn: Synapse = self.units[source].synapses[s];
                if !syn.is_active() {
                    continue;
                }
                let signal = syn.strength() * self.units[source].activation_level();
                self.units[syn.target].receive_signal(signal, now);
            }
        }
    }

    fn spontaneous_activation(&mut self, now: Step) {
        let chance = self.cfg.activation_chance;
        for u in &mut self.units {
            if self.rng.gen_bool(chance) {
                u.fire(now);
            }
        }
    }

    // =====================================================================
    // Image persistence
    // =====================================================================

    /// Serialize a versioned, chunked image of the full simulation state.
    ///
    /// A loaded image continues exactly where the saved one left off, PRNG included.
    pub fn save_image_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(storage::MAGIC)?;
        storage::write_u32_le(w, storage::VERSION_CURRENT)?;

        self.write_cfg_chunk(w)?;

        let mut prng = Vec::with_capacity(8);
        storage::write_u64_le(&mut prng, self.rng.state())?;
        storage::write_chunk(w, *b"PRNG", &prng)?;

        let mut stat = Vec::with_capacity(8);
        storage::write_i64_le(&mut stat, self.current_step)?;
        storage::write_chunk(w, *b"STAT", &stat)?;

        self.write_unit_chunk(w)?;
        Ok(())
    }

    /// Size in bytes of the image `save_image_to` would write right now.
    pub fn image_size_bytes(&self) -> io::Result<usize> {
        let mut counter = storage::CountingWriter::new();
        self.save_image_to(&mut counter)?;
        Ok(counter.written())
    }

    /// Load an image written by [`Simulation::save_image_to`].
    ///
    /// Unknown chunks are skipped for forward-compatibility.
    pub fn load_image_from<R: Read>(r: &mut R) -> Result<Self> {
        let magic = storage::read_exact::<8, _>(r)?;
        if &magic != storage::MAGIC {
            return Err(SimError::MalformedImage("bad image magic"));
        }
        let version = storage::read_u32_le(r)?;
        if version != storage::VERSION_V1 {
            return Err(SimError::MalformedImage("unsupported image version"));
        }

        let mut cfg: Option<SimConfig> = None;
        let mut rng_state: Option<u64> = None;
        let mut current_step: Option<Step> = None;
        let mut units: Option<Vec<Neuron>> = None;

        while let Some((tag, len)) = storage::read_chunk_header(r)? {

            let mut take = r.take(len as u64);
            match &tag {
                b"CFG0" => cfg = Some(Self::read_cfg_payload(&mut take)?),
                b"PRNG" => rng_state = Some(storage::read_u64_le(&mut take)?),
                b"STAT" => current_step = Some(storage::read_i64_le(&mut take)?),
                b"UNIT" => {
                    let payload = storage::read_chunk_lz4_payload(&mut take, len)?;
                    units = Some(Self::read_unit_payload(&mut payload.as_slice())?);
                }
                _ => {
                    // Unknown chunk: skip.
                }
            }

            // Drain any remaining payload bytes for unknown or partially-read chunks.
            io::copy(&mut take, &mut io::sink())?;
            if take.limit() != 0 {
                return Err(SimError::MalformedImage("truncated chunk"));
            }
        }

        let cfg = cfg.ok_or(SimError::MalformedImage("missing CFG0"))?;
        let units = units.ok_or(SimError::MalformedImage("missing UNIT"))?;
        let rng_state = rng_state.ok_or(SimError::MalformedImage("missing PRNG"))?;
        let current_step = current_step.unwrap_or(0);
        if !(0..=MAX_PERSISTED_STEP).contains(&current_step) {
            return Err(SimError::MalformedImage("step counter out of range"));
        }

        if units.len() != cfg.unit_count {
            return Err(SimError::MalformedImage("UNIT count mismatch"));
        }
        Self::validate_units(&units, &cfg)?;

        Ok(Self::from_parts(
            cfg,
            units,
            Prng::from_state(rng_state),
            current_step,
        ))
    }

    /// Reject unit state that `step()` could not carry forward within its invariants.
    fn validate_units(units: &[Neuron], cfg: &SimConfig) -> Result<()> {
        let count = units.len();
        for u in units {
            let p = u.position;
            if !(0.0..=cfg.width).contains(&p.x) || !(0.0..=cfg.height).contains(&p.y) {
                return Err(SimError::MalformedImage("unit position outside the field"));
            }
            if !u.heading.x.is_finite() || !u.heading.y.is_finite() || !u.speed.is_finite() {
                return Err(SimError::MalformedImage("non-finite unit motion"));
            }
            if !u.potential.is_finite() || !u.activation.is_finite() {
                return Err(SimError::MalformedImage("non-finite unit potential"));
            }
            if !(0.0..=1.0).contains(&u.activation_decay) {
                return Err(SimError::MalformedImage("activation decay outside [0, 1]"));
            }
            if !is_persisted_step(u.last_fired) {
                return Err(SimError::MalformedImage("last-fired step out of range"));
            }

            for s in &u.synapses {
                if s.target >= count {
                    return Err(SimError::MalformedImage("synapse target out of range"));
                }
                if !(STRENGTH_MIN..=STRENGTH_MAX).contains(&s.strength) {
                    return Err(SimError::MalformedImage("synapse strength out of range"));
                }
                if !is_persisted_step(s.last_used) {
                    return Err(SimError::MalformedImage("synapse last-used step out of range"));
                }
            }
        }
        Ok(())
    }

    fn write_cfg_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let c = &self.cfg;
        let mut p = Vec::with_capacity(64);
        storage::write_u64_le(&mut p, c.unit_count as u64)?;
        storage::write_f64_le(&mut p, c.width)?;
        storage::write_f64_le(&mut p, c.height)?;
        storage::write_f64_le(&mut p, c.connection_threshold)?;
        storage::write_f64_le(&mut p, c.activation_chance)?;
        storage::write_u8(&mut p, c.seed.is_some() as u8)?;
        storage::write_u64_le(&mut p, c.seed.unwrap_or(0))?;
        storage::write_chunk(w, *b"CFG0", &p)
    }

    fn read_cfg_payload<R: Read>(r: &mut R) -> Result<SimConfig> {
        let unit_count = storage::read_u64_le(r)? as usize;
        let width = storage::read_f64_le(r)?;
        let height = storage::read_f64_le(r)?;
        let connection_threshold = storage::read_f64_le(r)?;
        let activation_chance = storage::read_f64_le(r)?;
        let has_seed = storage::read_u8(r)? != 0;
        let seed = storage::read_u64_le(r)?;

        let cfg = SimConfig {
            unit_count,
            width,
            height,
            connection_threshold,
            activation_chance,
            seed: has_seed.then_some(seed),
        };
        cfg.validate().map_err(SimError::InvalidConfig)?;
        Ok(cfg)
    }

    fn write_unit_chunk<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut p = Vec::with_capacity(self.units.len() * 96);
        storage::write_u64_le(&mut p, self.units.len() as u64)?;
        for u in &self.units {
            storage::write_f64_le(&mut p, u.position.x)?;
            storage::write_f64_le(&mut p, u.position.y)?;
            storage::write_f64_le(&mut p, u.heading.x)?;
            storage::write_f64_le(&mut p, u.heading.y)?;
            storage::write_f64_le(&mut p, u.speed)?;
            storage::write_f64_le(&mut p, u.potential)?;
            storage::write_u8(&mut p, u.firing as u8)?;
            storage::write_i64_le(&mut p, u.last_fired)?;
            storage::write_f64_le(&mut p, u.activation)?;
            storage::write_f64_le(&mut p, u.activation_decay)?;

            storage::write_u64_le(&mut p, u.synapses.len() as u64)?;
            for s in &u.synapses {
                storage::write_u64_le(&mut p, s.target as u64)?;
                storage::write_f64_le(&mut p, s.strength)?;
                storage::write_i64_le(&mut p, s.last_used)?;
                storage::write_u8(&mut p, s.active as u8)?;
            }
        }
        storage::write_chunk_lz4(w, *b"UNIT", &p)
    }

    fn read_unit_payload<R: Read>(r: &mut R) -> io::Result<Vec<Neuron>> {
        let n = storage::read_u64_le(r)? as usize;
        let mut units = Vec::with_capacity(n.min(SimConfig::MAX_UNITS));
        for _ in 0..n {
            let position = Vec2::new(storage::read_f64_le(r)?, storage::read_f64_le(r)?);
            let heading = Vec2::new(storage::read_f64_le(r)?, storage::read_f64_le(r)?);
            let speed = storage::read_f64_le(r)?;
            let mut u = Neuron::with_motion(position, heading, speed);
            u.potential = storage::read_f64_le(r)?;
            u.firing = storage::read_u8(r)? != 0;
            u.last_fired = storage::read_i64_le(r)?;
            u.activation = storage::read_f64_le(r)?;
            u.activation_decay = storage::read_f64_le(r)?;

            let syn_count = storage::read_u64_le(r)? as usize;
            u.synapses.reserve(syn_count.min(SimConfig::MAX_UNITS));
            for _ in 0..syn_count {
                let target = storage::read_u64_le(r)? as usize;
                let strength = storage::read_f64_le(r)?;
                let last_used = storage::read_i64_le(r)?;
                let active = storage::read_u8(r)? != 0;
                u.synapses.push(Synapse {
                    target,
                    strength,
                    last_used,
                    active,
                });
            }
            units.push(u);
        }
        Ok(units)
    }
}
