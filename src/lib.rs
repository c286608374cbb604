//! # neuroswarm
//!
//! A field of mobile spiking units that wire themselves by proximity.
//!
//! Units drift across a bounded 2D field. Whenever two come within the connection
//! threshold they grow a directed synapse; firing units push signal along their
//! active synapses; synapses strengthen when their source fires, slowly decay
//! otherwise, and are pruned after a stretch of disuse.
//!
//! ## Quick Start
//!
//! ```
//! use neuroswarm::prelude::*;
//!
//! let cfg = SimConfig::new(50, 800.0, 600.0, 80.0).with_seed(42);
//! let mut sim = Simulation::new(cfg);
//!
//! // Inject activity, then let it spread.
//! sim.force_fire(0, sim.current_step()).unwrap();
//! sim.step();
//!
//! let diag = sim.diagnostics();
//! assert_eq!(diag.step, 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization of configs, snapshots and glyph files
//!
//! ## Modules
//!
//! - [`simulation`]: The step pipeline and its unit arena
//! - [`neuron`] / [`synapse`]: Unit dynamics and plasticity rules
//! - [`record`]: Synapse weight files
//! - [`observer`]: Read-only observation adapters
//! - [`digits`]: Digit training and recognition drivers

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/synapse.rs"]
pub mod synapse;

#[path = "core/neuron.rs"]
pub mod neuron;

#[path = "core/simulation.rs"]
pub mod simulation;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/record.rs"]
pub mod record;

pub mod digits;

pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use neuroswarm::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Result, SimError};
    pub use crate::neuron::{Neuron, Vec2};
    pub use crate::observer::{Observer, SimulationAdapter, SimulationSnapshot};
    pub use crate::simulation::{Diagnostics, SimConfig, Simulation};
    pub use crate::synapse::{Step, Synapse, UnitId};
}
