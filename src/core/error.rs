use std::io;

use thiserror::Error;

use crate::synapse::UnitId;

/// Errors reported by the collaborators around the simulation core.
///
/// `Simulation::step` itself never fails; these come from configuration checks,
/// driver injections, persistence and the digit drivers.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    #[error("unit {index} out of range (unit count {count})")]
    UnitOutOfRange { index: UnitId, count: usize },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("malformed image: {0}")]
    MalformedImage(&'static str),

    #[error("output layer needs {needed} units, network has {available}")]
    OutputLayerTooSmall { needed: usize, available: usize },

    #[error("digit label {0} out of range")]
    InvalidLabel(usize),

    #[error("glyph has no pixels")]
    EmptyGlyph,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = SimError> = core::result::Result<T, E>;
