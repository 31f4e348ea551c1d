//! Genome engine for Neatbots
//!
//! [`traits`] is what evolution depends on; [`cppn`] and [`population`] are
//! the default CPPN-NEAT implementation.

pub mod cppn;
pub mod population;
pub mod traits;

pub use cppn::{ActivationFunction, CppnGenome, CppnNetwork, InnovationTracker, MutationConfig};
pub use population::{CppnPopulation, PopulationConfig};
pub use traits::{Genome, PhenotypeNetwork, Population};
