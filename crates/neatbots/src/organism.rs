//! Organisms: one morphology genome and one control genome scored together

use neatbots_genome::Genome;
use neatbots_voxcraft::Dims;
use serde::{Deserialize, Serialize};

/// Identifier used in file names and result tags, `<generation>-<index>`,
/// both counted from 1
pub fn organism_id(generation: usize, index: usize) -> String {
    format!("{}-{}", generation, index)
}

/// A pairing of genomes for exactly one generation. The genomes stay owned
/// by their populations; the organism only borrows them until the
/// populations advance.
#[derive(Debug)]
pub struct Organism<'a, M, C> {
    id: String,
    morphology: &'a mut M,
    control: &'a mut C,
    fitness: f64,
    dims: Dims,
}

impl<'a, M: Genome, C: Genome> Organism<'a, M, C> {
    pub fn new(id: String, morphology: &'a mut M, control: &'a mut C, dims: Dims) -> Self {
        Self {
            id,
            morphology,
            control,
            fitness: 0.0,
            dims,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn morphology(&self) -> &M {
        self.morphology
    }

    pub fn control(&self) -> &C {
        self.control
    }

    /// Record a score on the organism and both of its genomes
    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
        self.morphology.set_fitness(fitness);
        self.control.set_fitness(fitness);
    }

    /// Deep copy that outlives the populations' next advance
    pub fn to_elite(&self, generation: usize) -> Elite<M, C> {
        Elite {
            id: self.id.clone(),
            generation,
            fitness: self.fitness,
            dims: self.dims,
            morphology: self.morphology.clone(),
            control: self.control.clone(),
        }
    }
}

/// Pair the two genome lists by position for generation `generation`
/// (counted from 1). Extra genomes on the longer side sit the generation out.
pub fn construct_organisms<'a, M: Genome, C: Genome>(
    generation: usize,
    morphologies: &'a mut [M],
    controls: &'a mut [C],
    dims: Dims,
) -> Vec<Organism<'a, M, C>> {
    if morphologies.len() != controls.len() {
        log::warn!(
            "Generation {}: {} morphology genomes but {} control genomes, pairing {}",
            generation,
            morphologies.len(),
            controls.len(),
            morphologies.len().min(controls.len())
        );
    }
    morphologies
        .iter_mut()
        .zip(controls.iter_mut())
        .enumerate()
        .map(|(i, (morphology, control))| {
            Organism::new(organism_id(generation, i + 1), morphology, control, dims)
        })
        .collect()
}

/// The best organism of a generation, detached from its populations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elite<M, C> {
    pub id: String,
    pub generation: usize,
    pub fitness: f64,
    pub dims: Dims,
    pub morphology: M,
    pub control: C,
}
