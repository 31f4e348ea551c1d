//! Neatbots: evolving voxel soft-body robots
//!
//! CPPN genomes are rendered into voxel grids ([`morphology`]), written as
//! Voxcraft input files and evaluated a generation at a time by the external
//! simulator ([`harness`]). [`evolution`] ties the two populations, the
//! harness and the run metrics ([`report`]) together.

pub mod config;
pub mod error;
pub mod evolution;
pub mod harness;
pub mod morphology;
pub mod organism;
pub mod report;

pub use config::{EvolutionConfig, NeatbotsConfig, SimulatorConfig};
pub use error::{ConstructionError, HarnessError, MorphologyError};
pub use evolution::{load_checkpoint, EvolutionLoop};
pub use harness::{
    FitnessRecord, GenerationResult, SimulationHarness, Simulator, SimulatorOutput,
    VoxcraftProcess,
};
pub use morphology::{MaterialPolicy, MorphologyBuilder};
pub use organism::{construct_organisms, Elite, Organism};
pub use report::{GenerationStats, RunMetrics};
