//! Generational CPPN-NEAT population

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::cppn::{CppnGenome, InnovationTracker, MutationConfig};
use crate::traits::{Genome, Population};

/// Breeding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub seed: u64,
    /// Best genomes copied unchanged into the next generation
    pub elitism: usize,
    pub tournament_size: usize,
    /// Probability that a child has two parents
    pub crossover_rate: f32,
    pub mutation: MutationConfig,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            elitism: 1,
            tournament_size: 3,
            crossover_rate: 0.5,
            mutation: MutationConfig::default(),
        }
    }
}

pub struct CppnPopulation {
    config: PopulationConfig,
    genomes: Vec<CppnGenome>,
    tracker: InnovationTracker,
    rng: Xoshiro256PlusPlus,
    generation: usize,
}

impl CppnPopulation {
    /// `size` minimal genomes mapping `inputs` values to `outputs` values
    pub fn new(size: usize, inputs: usize, outputs: usize, config: PopulationConfig) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let mut tracker = InnovationTracker::new(inputs, outputs);
        let genomes = (0..size)
            .map(|_| CppnGenome::minimal(inputs, outputs, &mut tracker, &mut rng))
            .collect();

        log::debug!(
            "Created population of {} genomes ({} inputs, {} outputs, seed {})",
            size,
            inputs,
            outputs,
            config.seed
        );

        Self {
            config,
            genomes,
            tracker,
            rng,
            generation: 0,
        }
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    /// Best of `tournament_size` random picks
    fn tournament(&mut self) -> usize {
        let n = self.genomes.len();
        let mut best = self.rng.random_range(0..n);
        for _ in 1..self.config.tournament_size.max(1) {
            let challenger = self.rng.random_range(0..n);
            if self.genomes[challenger].fitness() > self.genomes[best].fitness() {
                best = challenger;
            }
        }
        best
    }
}

impl Population for CppnPopulation {
    type Genome = CppnGenome;

    fn genomes(&self) -> &[CppnGenome] {
        &self.genomes
    }

    fn genomes_mut(&mut self) -> &mut [CppnGenome] {
        &mut self.genomes
    }

    fn advance(&mut self) {
        let n = self.genomes.len();
        if n == 0 {
            self.generation += 1;
            return;
        }

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| {
            self.genomes[b]
                .fitness()
                .total_cmp(&self.genomes[a].fitness())
        });

        let mut next = Vec::with_capacity(n);
        for &i in ranked.iter().take(self.config.elitism.min(n)) {
            let mut elite = self.genomes[i].clone();
            elite.set_fitness(0.0);
            next.push(elite);
        }

        while next.len() < n {
            let first = self.tournament();
            let mut child = if self.rng.random::<f32>() < self.config.crossover_rate {
                let second = self.tournament();
                self.genomes[first].crossover(&self.genomes[second], &mut self.rng)
            } else {
                let mut copy = self.genomes[first].clone();
                copy.set_fitness(0.0);
                copy
            };
            child.mutate(&self.config.mutation, &mut self.tracker, &mut self.rng);
            next.push(child);
        }

        let best = self.genomes[ranked[0]].fitness();
        self.genomes = next;
        self.generation += 1;
        log::debug!(
            "Population advanced to generation {} (parent best {:.4}, {} innovations)",
            self.generation,
            best,
            self.tracker.innovation_count()
        );
    }

    fn generation(&self) -> usize {
        self.generation
    }
}
