//! Error types for organism construction and simulator evaluation

use std::path::PathBuf;

use neatbots_voxcraft::{EncodeError, PaletteError, ReportError, SettingsError};
use neatbots_voxcraft::Point3;
use thiserror::Error;

/// The network produced something that cannot become a voxel
#[derive(Error, Debug)]
pub enum MorphologyError {
    #[error("network returned {got} outputs, material policy needs {expected}")]
    OutputCount { expected: usize, got: usize },

    #[error("network output {index} at {at} is outside [0, 1]: {value}")]
    InvalidOutput { index: usize, value: f32, at: Point3 },

    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Building one organism failed. Contained to that organism unless
/// [`is_fatal`](ConstructionError::is_fatal) says otherwise.
#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error(transparent)]
    Morphology(#[from] MorphologyError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl ConstructionError {
    /// Filesystem failures are not the organism's fault and stop the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConstructionError::Encode(EncodeError::Io { .. }))
    }
}

/// Failures preparing or evaluating a generation
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to start simulator {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("simulator failed: {detail}\n{stderr}")]
    SimulatorProcess { detail: String, stderr: String },

    #[error("results file {path} is unreadable: {source}")]
    Results {
        path: PathBuf,
        #[source]
        source: ReportError,
    },

    #[error("no fitness reported for organism {id}")]
    MissingResultEntry { id: String },
}
