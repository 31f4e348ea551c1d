//! Run configuration with layered loading
//!
//! Configuration is loaded from multiple sources (lowest to highest priority):
//! 1. Compiled defaults
//! 2. `neatbots.ron` in the working directory, or the file given explicitly
//! 3. Environment variables prefixed with `NEATBOTS_`
//!
//! Example environment variable: `NEATBOTS_EVOLUTION__GENERATIONS=50`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use neatbots_genome::PopulationConfig;
use neatbots_voxcraft::{Dims, SimSettings, StreamProtocol};
use serde::{Deserialize, Serialize};

use crate::morphology::MaterialPolicy;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NeatbotsConfig {
    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub physics: SimSettings,

    #[serde(default)]
    pub evolution: EvolutionConfig,

    #[serde(default)]
    pub neat: PopulationConfig,
}

/// Where the simulator lives and how to read what it prints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Voxcraft simulator binary
    pub executable: PathBuf,
    /// Worker binary passed with `-w`
    pub worker: PathBuf,
    /// Parent of the per-generation directories
    pub storage_root: PathBuf,
    /// Prefix of encoded file names and result tags
    pub label: String,
    pub history_delimiter: String,
    pub diverged_marker: String,
    /// VXA file holding a pre-built environment to spawn organisms into
    pub environment: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let protocol = StreamProtocol::default();
        Self {
            executable: PathBuf::from("./voxcraft-sim"),
            worker: PathBuf::from("./vx3_node_worker"),
            storage_root: PathBuf::from("neatbots_output/generations"),
            label: protocol.label,
            history_delimiter: protocol.history_delimiter,
            diverged_marker: protocol.diverged_marker,
            environment: None,
        }
    }
}

impl SimulatorConfig {
    pub fn protocol(&self) -> StreamProtocol {
        StreamProtocol {
            label: self.label.clone(),
            history_delimiter: self.history_delimiter.clone(),
            diverged_marker: self.diverged_marker.clone(),
        }
    }
}

/// Generational loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub generations: usize,
    pub population_size: usize,
    /// Organism grid extent
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    /// Percent difference under which two materials are merged
    pub diff_thresh: f64,
    pub material_policy: MaterialPolicy,
    /// Advance the control population as well as the morphology population
    pub evolve_control: bool,
    /// Re-simulate all elites with history recording after the run
    pub record_elites: bool,
    pub elite_record_step_size: u32,
    pub output_dir: PathBuf,
    /// Save the elite genomes every N generations (0 = only at the end)
    pub checkpoint_interval: usize,
    pub show_progress: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            generations: 10,
            population_size: 10,
            width: 4,
            height: 4,
            depth: 4,
            diff_thresh: 15.0,
            material_policy: MaterialPolicy::default(),
            evolve_control: false,
            record_elites: false,
            elite_record_step_size: 100,
            output_dir: PathBuf::from("neatbots_output"),
            checkpoint_interval: 10,
            show_progress: true,
        }
    }
}

impl EvolutionConfig {
    pub fn dims(&self) -> Dims {
        Dims::new(self.width, self.height, self.depth)
    }

    pub fn set_dims(&mut self, dims: Dims) {
        self.width = dims.x;
        self.height = dims.y;
        self.depth = dims.z;
    }

    pub fn validate(&self) -> Result<()> {
        if self.generations == 0 {
            bail!("evolution.generations must be at least 1");
        }
        if self.population_size == 0 {
            bail!("evolution.population_size must be at least 1");
        }
        if self.dims().volume() == 0 {
            bail!("organism dimensions must be positive, got {}", self.dims());
        }
        if !self.diff_thresh.is_finite() || self.diff_thresh < 0.0 {
            bail!("evolution.diff_thresh must be a non-negative number");
        }
        if self.record_elites && self.elite_record_step_size == 0 {
            bail!("evolution.elite_record_step_size must be nonzero to record elites");
        }
        Ok(())
    }
}

impl NeatbotsConfig {
    /// Load configuration with layered priority. An explicit `path` must
    /// exist; otherwise `neatbots.ron` is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&NeatbotsConfig::default())
            .context("Failed to build default configuration")?;

        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Ron).required(true),
            None => File::with_name("neatbots")
                .format(FileFormat::Ron)
                .required(false),
        };

        let config = Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                Environment::with_prefix("NEATBOTS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
