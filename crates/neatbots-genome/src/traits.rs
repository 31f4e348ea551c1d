//! The seam between evolution and a genome engine
//!
//! Evolution only needs three things from an engine: a network it can query
//! at every voxel, somewhere to store fitness, and a way to breed the next
//! generation.

/// A decoded network. Queries do not depend on earlier queries.
pub trait PhenotypeNetwork {
    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    /// Evaluate the network once. Missing inputs read as 0, extra inputs are
    /// ignored; the result always has [`output_count`](Self::output_count)
    /// values.
    fn query(&self, inputs: &[f32]) -> Vec<f32>;
}

/// A heritable encoding. `Clone` must be a deep copy; elites are kept that
/// way after their population moves on.
pub trait Genome: Clone {
    type Network: PhenotypeNetwork;

    fn build_phenotype(&self) -> Self::Network;

    fn fitness(&self) -> f64;

    fn set_fitness(&mut self, fitness: f64);
}

/// An ordered set of genomes that breeds in place
pub trait Population {
    type Genome: Genome;

    fn genomes(&self) -> &[Self::Genome];

    fn genomes_mut(&mut self) -> &mut [Self::Genome];

    /// Replace the genomes with the next generation, bred from the current
    /// fitness values
    fn advance(&mut self);

    /// Number of completed `advance` calls
    fn generation(&self) -> usize;

    fn len(&self) -> usize {
        self.genomes().len()
    }

    fn is_empty(&self) -> bool {
        self.genomes().is_empty()
    }
}
