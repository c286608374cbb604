//! Cross-platform application paths

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self, DaemonError> {
        let base = dirs::data_dir().ok_or(DaemonError::NoDataDir)?;
        Self::at(base.join("neuroswarm"))
    }

    /// Use an explicit data directory, creating it if needed.
    pub fn at(data_dir: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Full-state image, written on stop, shutdown and Ctrl-C.
    pub fn image_file(&self) -> PathBuf {
        self.data_dir.join("swarm.nsi")
    }

    /// Synapse record exported on request.
    pub fn record_file(&self) -> PathBuf {
        self.data_dir.join("weights.bin")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}
