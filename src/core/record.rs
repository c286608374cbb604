//! Synapse record: the weight file exchanged with the training and recognition drivers.
//!
//! Layout, all fields in host byte order:
//!
//! ```text
//! usize                  unit count
//! per unit:
//!   usize                active synapse count
//!   per synapse:
//!     i32                target index
//!     f64                strength
//!     f64                last-used step
//! ```
//!
//! Only active synapses are written. Positions, potentials and pruned synapses are
//! not part of the record; use the simulation image for a full snapshot.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, SimError};
use crate::simulation::{is_persisted_step, SimConfig, Simulation};
use crate::storage;
use crate::synapse::{Step, STRENGTH_MAX, STRENGTH_MIN};

pub fn save_to<W: Write>(sim: &Simulation, w: &mut W) -> Result<()> {
    storage::write_usize_ne(w, sim.unit_count())?;

    for unit in sim.units() {
        storage::write_usize_ne(w, unit.active_synapse_count())?;
        for syn in unit.active_synapses() {
            let target = i32::try_from(syn.target).map_err(|_| {
                SimError::MalformedRecord(format!("target {} does not fit in i32", syn.target))
            })?;
            storage::write_i32_ne(w, target)?;
            storage::write_f64_ne(w, syn.strength())?;
            storage::write_f64_ne(w, syn.last_used() as f64)?;
        }
    }
    Ok(())
}

/// Rebuild a simulation from a record.
///
/// The unit count comes from the record; field size, threshold and seed come from
/// `cfg`. Every persisted synapse is re-grown with `connect` using its stored
/// last-used step as the creation time. On any error nothing is returned.
pub fn load_from<R: Read>(r: &mut R, cfg: SimConfig) -> Result<Simulation> {
    let unit_count = storage::read_usize_ne(r)?;
    if unit_count > SimConfig::MAX_UNITS {
        return Err(SimError::MalformedRecord(format!(
            "unit count {unit_count} exceeds {}",
            SimConfig::MAX_UNITS
        )));
    }

    let mut sim = Simulation::try_new(cfg.with_unit_count(unit_count))?;

    for source in 0..unit_count {
        let syn_count = storage::read_usize_ne(r)?;
        for _ in 0..syn_count {
            let target = storage::read_i32_ne(r)?;
            let strength = storage::read_f64_ne(r)?;
            let last_used = storage::read_f64_ne(r)?;

            let target = usize::try_from(target)
                .ok()
                .filter(|&t| t < unit_count)
                .ok_or_else(|| {
                    SimError::MalformedRecord(format!(
                        "unit {source}: target {target} outside 0..{unit_count}"
                    ))
                })?;
            if !(STRENGTH_MIN..=STRENGTH_MAX).contains(&strength) {
                return Err(SimError::MalformedRecord(format!(
                    "unit {source}: strength {strength} outside [{STRENGTH_MIN}, {STRENGTH_MAX}]"
                )));
            }
            // Whole steps only, within the range a run can reach.
            let step = last_used as Step;
            if last_used.fract() != 0.0 || !is_persisted_step(step) {
                return Err(SimError::MalformedRecord(format!(
                    "unit {source}: last-used step {last_used} is not a valid step"
                )));
            }

            sim.connect(source, target, strength, step)?;
        }
    }

    debug!(
        units = unit_count,
        synapses = sim.total_active_synapses(),
        "synapse record decoded"
    );
    Ok(sim)
}

pub fn save_file(sim: &Simulation, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    save_to(sim, &mut w)?;
    w.flush()?;
    info!(
        path = %path.display(),
        units = sim.unit_count(),
        synapses = sim.total_active_synapses(),
        "saved synapse record"
    );
    Ok(())
}

pub fn load_file(path: impl AsRef<Path>, cfg: SimConfig) -> Result<Simulation> {
    let path = path.as_ref();
    let mut r = BufReader::new(File::open(path)?);
    let sim = load_from(&mut r, cfg)?;
    info!(path = %path.display(), units = sim.unit_count(), "loaded synapse record");
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse::Synapse;

    fn tuples(sim: &Simulation) -> Vec<Vec<(usize, f64, Step)>> {
        sim.units()
            .iter()
            .map(|u| {
                u.active_synapses()
                    .map(|s: &Synapse| (s.target, s.strength(), s.last_used()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn record_roundtrip_preserves_active_synapses() {
        let cfg = SimConfig::new(30, 150.0, 150.0, 50.0).with_seed(21);
        let mut sim = Simulation::new(cfg);
        sim.run(120);
        assert!(sim.total_active_synapses() > 0);

        let mut bytes = Vec::new();
        save_to(&sim, &mut bytes).unwrap();
        let loaded = load_from(&mut std::io::Cursor::new(bytes), cfg).unwrap();

        assert_eq!(loaded.unit_count(), sim.unit_count());
        assert_eq!(tuples(&loaded), tuples(&sim));
    }

    #[test]
    fn record_layout_matches_field_widths() {
        let cfg = SimConfig::new(2, 10.0, 10.0, 1.0).with_seed(1);
        let mut sim = Simulation::new(cfg);
        sim.connect(0, 1, 0.75, 4).unwrap();

        let mut bytes = Vec::new();
        save_to(&sim, &mut bytes).unwrap();

        let usize_len = core::mem::size_of::<usize>();
        assert_eq!(bytes.len(), usize_len * 3 + 4 + 8 + 8);
        assert_eq!(&bytes[..usize_len], &2usize.to_ne_bytes());
    }

    #[test]
    fn unit_count_comes_from_record() {
        let sim = Simulation::new(SimConfig::new(7, 10.0, 10.0, 1.0).with_seed(2));
        let mut bytes = Vec::new();
        save_to(&sim, &mut bytes).unwrap();

        let other = SimConfig::new(3, 10.0, 10.0, 1.0);
        let loaded = load_from(&mut std::io::Cursor::new(bytes), other).unwrap();
        assert_eq!(loaded.unit_count(), 7);
    }

    #[test]
    fn truncated_record_fails() {
        let cfg = SimConfig::new(4, 10.0, 10.0, 20.0).with_seed(3);
        let mut sim = Simulation::new(cfg);
        sim.step();
        let mut bytes = Vec::new();
        save_to(&sim, &mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        assert!(matches!(
            load_from(&mut std::io::Cursor::new(bytes), cfg),
            Err(SimError::Io(_))
        ));
    }

    #[test]
    fn out_of_range_target_is_rejected() {
        let mut bytes = Vec::new();
        storage::write_usize_ne(&mut bytes, 2).unwrap();
        storage::write_usize_ne(&mut bytes, 1).unwrap();
        storage::write_i32_ne(&mut bytes, 5).unwrap();
        storage::write_f64_ne(&mut bytes, 0.5).unwrap();
        storage::write_f64_ne(&mut bytes, 1.0).unwrap();
        storage::write_usize_ne(&mut bytes, 0).unwrap();

        let cfg = SimConfig::new(2, 10.0, 10.0, 1.0);
        assert!(matches!(
            load_from(&mut std::io::Cursor::new(bytes), cfg),
            Err(SimError::MalformedRecord(_))
        ));
    }

    fn single_synapse_record(last_used: f64) -> Vec<u8> {
        let mut bytes = Vec::new();
        storage::write_usize_ne(&mut bytes, 2).unwrap();
        storage::write_usize_ne(&mut bytes, 1).unwrap();
        storage::write_i32_ne(&mut bytes, 1).unwrap();
        storage::write_f64_ne(&mut bytes, 0.5).unwrap();
        storage::write_f64_ne(&mut bytes, last_used).unwrap();
        storage::write_usize_ne(&mut bytes, 0).unwrap();
        bytes
    }

    #[test]
    fn unreachable_last_used_steps_are_rejected() {
        let cfg = SimConfig::new(2, 10.0, 10.0, 1.0);
        for bad in [-1e300, 1e300, 2.5, f64::NAN, f64::NEG_INFINITY] {
            assert!(
                matches!(
                    load_from(&mut std::io::Cursor::new(single_synapse_record(bad)), cfg),
                    Err(SimError::MalformedRecord(_))
                ),
                "last_used={bad}"
            );
        }
    }

    #[test]
    fn loaded_record_keeps_stepping() {
        let cfg = SimConfig::new(2, 10.0, 10.0, 1.0).with_seed(8);
        let mut sim = load_from(&mut std::io::Cursor::new(single_synapse_record(40.0)), cfg).unwrap();
        assert_eq!(sim.units()[0].synapses()[0].last_used(), 40);
        sim.run(5);
        assert_eq!(sim.current_step(), 5);
    }

    #[test]
    fn duplicate_persisted_synapses_collapse() {
        let mut bytes = Vec::new();
        storage::write_usize_ne(&mut bytes, 2).unwrap();
        storage::write_usize_ne(&mut bytes, 2).unwrap();
        for strength in [0.6, 0.9] {
            storage::write_i32_ne(&mut bytes, 1).unwrap();
            storage::write_f64_ne(&mut bytes, strength).unwrap();
            storage::write_f64_ne(&mut bytes, 3.0).unwrap();
        }
        storage::write_usize_ne(&mut bytes, 0).unwrap();

        let cfg = SimConfig::new(2, 10.0, 10.0, 1.0);
        let sim = load_from(&mut std::io::Cursor::new(bytes), cfg).unwrap();
        let syns: Vec<_> = sim.units()[0].active_synapses().collect();
        assert_eq!(syns.len(), 1);
        assert_eq!(syns[0].strength(), 0.6);
        assert_eq!(syns[0].last_used(), 3);
    }
}
