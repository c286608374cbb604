use crate::neuron::Vec2;
use crate::simulation::{Diagnostics, Simulation};
use crate::synapse::{Step, UnitId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A read-only snapshot of what the simulation is doing.
///
/// Design intent:
/// - Observers cannot mutate or steer the simulation.
/// - Snapshotting is *on-demand* and allocates; `step()` stays unchanged.
/// - Snapshots are taken between steps, so they never show a half-applied step.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationSnapshot {
    pub step: Step,
    pub width: f64,
    pub height: f64,
    pub diagnostics: Diagnostics,
    pub units: Vec<UnitView>,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnitView {
    pub id: UnitId,
    pub x: f64,
    pub y: f64,
    pub firing: bool,
    pub activation: f64,
    pub potential: f64,
    /// Active synapses only, in the unit's list order.
    pub synapses: Vec<SynapseView>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseView {
    pub target: UnitId,
    pub strength: f64,
    pub last_used: Step,
}

/// What a tooltip shows for a hovered synapse.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseHit {
    pub source: UnitId,
    pub target: UnitId,
    pub strength: f64,
    pub last_used: Step,
    pub distance: f64,
}

pub struct SimulationAdapter<'a> {
    sim: &'a Simulation,
}

impl<'a> SimulationAdapter<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let units = self
            .sim
            .units()
            .iter()
            .enumerate()
            .map(|(id, u)| {
                let p = u.position();
                UnitView {
                    id,
                    x: p.x,
                    y: p.y,
                    firing: u.is_firing(),
                    activation: u.activation_level(),
                    potential: u.potential(),
                    synapses: u
                        .active_synapses()
                        .map(|s| SynapseView {
                            target: s.target,
                            strength: s.strength(),
                            last_used: s.last_used(),
                        })
                        .collect(),
                }
            })
            .collect();

        SimulationSnapshot {
            step: self.sim.current_step(),
            width: self.sim.width(),
            height: self.sim.height(),
            diagnostics: self.sim.diagnostics(),
            units,
        }
    }
}

/// Receives snapshots from a driver loop.
///
/// Renderers and loggers implement this; the simulation never calls it directly.
pub trait Observer {
    fn on_step(&mut self, snapshot: &SimulationSnapshot);
}

impl<F: FnMut(&SimulationSnapshot)> Observer for F {
    fn on_step(&mut self, snapshot: &SimulationSnapshot) {
        self(snapshot)
    }
}

/// Step `sim` `steps` times, handing a snapshot to `observer` after every `every`th step.
pub fn run_observed<O: Observer + ?Sized>(
    sim: &mut Simulation,
    steps: usize,
    every: usize,
    observer: &mut O,
) {
    let every = every.max(1);
    for i in 1..=steps {
        sim.step();
        if i % every == 0 {
            observer.on_step(&SimulationAdapter::new(sim).snapshot());
        }
    }
}

/// Find the active synapse drawn closest to `(x, y)`, if any lies within `radius`.
///
/// Synapses are treated as straight segments from source to target position. On ties the
/// first synapse in unit/list order wins.
pub fn hit_test_synapse(
    snapshot: &SimulationSnapshot,
    x: f64,
    y: f64,
    radius: f64,
) -> Option<SynapseHit> {
    let p = Vec2::new(x, y);
    let mut best: Option<SynapseHit> = None;

    for unit in &snapshot.units {
        let a = Vec2::new(unit.x, unit.y);
        for syn in &unit.synapses {
            let Some(target) = snapshot.units.get(syn.target) else {
                continue;
            };
            let b = Vec2::new(target.x, target.y);
            let d = point_segment_distance(p, a, b);
            if d <= radius && best.map_or(true, |h| d < h.distance) {
                best = Some(SynapseHit {
                    source: unit.id,
                    target: syn.target,
                    strength: syn.strength,
                    last_used: syn.last_used,
                    distance: d,
                });
            }
        }
    }

    best
}

fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = Vec2::new(b.x - a.x, b.y - a.y);
    let ap = Vec2::new(p.x - a.x, p.y - a.y);
    let len_sq = ab.x * ab.x + ab.y * ab.y;

    // Degenerate segment: distance to the endpoint.
    let t = if len_sq == 0.0 {
        0.0
    } else {
        ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0)
    };

    p.distance(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neuron::Neuron;
    use crate::simulation::SimConfig;

    fn parked(x: f64, y: f64) -> Neuron {
        Neuron::with_motion(Vec2::new(x, y), Vec2::new(1.0, 0.0), 0.0)
    }

    fn two_unit_sim() -> Simulation {
        let cfg = SimConfig::new(2, 100.0, 100.0, 1.0)
            .with_seed(1)
            .with_activation_chance(0.0);
        let mut sim = Simulation::with_units(cfg, vec![parked(10.0, 50.0), parked(90.0, 50.0)]);
        sim.connect(0, 1, 0.8, 0).unwrap();
        sim
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut sim = two_unit_sim();
        sim.force_fire(1, 0).unwrap();

        let snap = SimulationAdapter::new(&sim).snapshot();
        assert_eq!(snap.units.len(), 2);
        assert_eq!(snap.units[0].synapses.len(), 1);
        assert_eq!(snap.units[0].synapses[0].target, 1);
        assert!(snap.units[1].firing);
        assert_eq!(snap.diagnostics.active_synapses, 1);
    }

    #[test]
    fn run_observed_calls_back_on_schedule() {
        let mut sim = two_unit_sim();
        let mut seen: Vec<Step> = Vec::new();
        let mut obs = |s: &SimulationSnapshot| seen.push(s.step);

        run_observed(&mut sim, 10, 3, &mut obs);

        assert_eq!(seen, vec![3, 6, 9]);
    }

    #[test]
    fn hit_test_finds_hovered_synapse() {
        let sim = two_unit_sim();
        let snap = SimulationAdapter::new(&sim).snapshot();

        let hit = hit_test_synapse(&snap, 50.0, 53.0, 8.0).expect("synapse under cursor");
        assert_eq!(hit.source, 0);
        assert_eq!(hit.target, 1);
        assert!((hit.distance - 3.0).abs() < 1e-9);
        assert_eq!(hit.strength, 0.8);

        assert!(hit_test_synapse(&snap, 50.0, 70.0, 8.0).is_none());
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!((point_segment_distance(Vec2::new(-3.0, 4.0), a, b) - 5.0).abs() < 1e-12);
        assert!((point_segment_distance(Vec2::new(5.0, 2.0), a, b) - 2.0).abs() < 1e-12);
        assert!((point_segment_distance(Vec2::new(1.0, 1.0), a, a) - 2f64.sqrt()).abs() < 1e-12);
    }
}
