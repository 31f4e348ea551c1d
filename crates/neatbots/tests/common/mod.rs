//! Test doubles shared by the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use neatbots::{
    EvolutionConfig, HarnessError, NeatbotsConfig, SimulationHarness, Simulator, SimulatorOutput,
};
use neatbots_genome::{Genome, PhenotypeNetwork, Population};
use neatbots_voxcraft::{Dims, SimSettings, StreamProtocol};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// Stands in for the Voxcraft binary: scores every `bot_<id>.vxd` in the
/// directory and writes `results.xml`
pub struct CannedSimulator {
    score: Box<dyn Fn(&str) -> f64>,
    /// Reported as diverged when present in the batch
    pub diverged: Vec<String>,
    /// Left out of the results file
    pub omit: Vec<String>,
    /// Print a history block for organisms written with a nonzero step size
    pub histories: bool,
    /// Directory and `(id, fitness)` pairs of every invocation
    pub runs: Vec<(PathBuf, Vec<(String, f64)>)>,
}

impl CannedSimulator {
    pub fn new(score: impl Fn(&str) -> f64 + 'static) -> Self {
        Self {
            score: Box::new(score),
            diverged: Vec::new(),
            omit: Vec::new(),
            histories: false,
            runs: Vec::new(),
        }
    }

    /// Same score for everyone
    pub fn constant(fitness: f64) -> Self {
        Self::new(move |_| fitness)
    }

    /// Score `i` for organism `g-i`
    pub fn by_index() -> Self {
        Self::new(|id| {
            id.rsplit('-')
                .next()
                .and_then(|i| i.parse::<f64>().ok())
                .unwrap_or(0.0)
        })
    }
}

impl Simulator for CannedSimulator {
    fn simulate(&mut self, dir: &Path) -> Result<SimulatorOutput, HarnessError> {
        let mut ids: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| {
                let name = entry.unwrap().file_name().to_string_lossy().into_owned();
                name.strip_prefix("bot_")
                    .and_then(|rest| rest.strip_suffix(".vxd"))
                    .map(str::to_string)
            })
            .collect();
        ids.sort();

        let mut stdout = String::from("Voxcraft canned run\n");
        let mut results = String::from("<report><detail>");
        let mut scored = Vec::new();
        for id in &ids {
            stdout.push_str(&format!("Loaded bot_{}.vxd\n", id));
            if self.diverged.contains(id) {
                stdout.push_str(&format!("Simulation diverged: bot_{}.vxd\n", id));
            }
            if self.omit.contains(id) {
                continue;
            }
            let fitness = (self.score)(id);
            results.push_str(&format!(
                "<bot_{id}><fitness_score>{fitness}</fitness_score></bot_{id}>"
            ));
            scored.push((id.clone(), fitness));
        }
        results.push_str("</detail></report>");

        if self.histories {
            for id in &ids {
                let vxd = std::fs::read_to_string(dir.join(format!("bot_{}.vxd", id))).unwrap();
                if !vxd.contains(">0</RecordStepSize>") {
                    stdout.push_str(&format!("<<<history>>>\nbot_{}.vxd\nframe 0\nframe 1\n", id));
                }
            }
        }

        std::fs::write(dir.join("results.xml"), results).unwrap();
        self.runs.push((dir.to_path_buf(), scored));
        Ok(SimulatorOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Genome whose network returns the same value for every output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstGenome {
    pub value: f32,
    pub outputs: usize,
    pub fitness: f64,
}

pub struct ConstNetwork {
    value: f32,
    outputs: usize,
}

impl PhenotypeNetwork for ConstNetwork {
    fn input_count(&self) -> usize {
        5
    }

    fn output_count(&self) -> usize {
        self.outputs
    }

    fn query(&self, _inputs: &[f32]) -> Vec<f32> {
        vec![self.value; self.outputs]
    }
}

impl Genome for ConstGenome {
    type Network = ConstNetwork;

    fn build_phenotype(&self) -> ConstNetwork {
        ConstNetwork {
            value: self.value,
            outputs: self.outputs,
        }
    }

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }
}

/// Population that never changes its genomes but remembers the fitness
/// they had at every advance
pub struct ConstPopulation {
    genomes: Vec<ConstGenome>,
    pub history: Vec<Vec<f64>>,
}

impl ConstPopulation {
    pub fn new(values: &[f32], outputs: usize) -> Self {
        Self {
            genomes: values
                .iter()
                .map(|&value| ConstGenome {
                    value,
                    outputs,
                    fitness: 0.0,
                })
                .collect(),
            history: Vec::new(),
        }
    }
}

impl Population for ConstPopulation {
    type Genome = ConstGenome;

    fn genomes(&self) -> &[ConstGenome] {
        &self.genomes
    }

    fn genomes_mut(&mut self) -> &mut [ConstGenome] {
        &mut self.genomes
    }

    fn advance(&mut self) {
        self.history
            .push(self.genomes.iter().map(|g| g.fitness).collect());
    }

    fn generation(&self) -> usize {
        self.history.len()
    }
}

/// Quiet configuration writing everything below `tmp`
pub fn test_config(tmp: &TempDir, generations: usize, population: usize, dims: Dims) -> NeatbotsConfig {
    let mut config = NeatbotsConfig::default();
    config.simulator.storage_root = tmp.path().join("generations");
    config.evolution = EvolutionConfig {
        generations,
        population_size: population,
        output_dir: tmp.path().join("output"),
        show_progress: false,
        ..EvolutionConfig::default()
    };
    config.evolution.set_dims(dims);
    config
}

pub fn harness(tmp: &TempDir, simulator: CannedSimulator) -> SimulationHarness<CannedSimulator> {
    SimulationHarness::new(
        tmp.path().join("generations"),
        StreamProtocol::default(),
        SimSettings::default(),
        simulator,
    )
}
