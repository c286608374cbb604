use std::io;
use std::path::PathBuf;

use neuroswarm::error::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("could not determine data directory")]
    NoDataDir,

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("bad config file: {0}")]
    BadConfig(&'static str),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
