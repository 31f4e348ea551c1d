//! Generational loop
//!
//! Each generation pairs the two populations into organisms, writes every
//! organism that can be built into one directory, simulates the batch once,
//! scores the organisms and advances the populations. After the last
//! generation the elites can be simulated again with history recording.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use neatbots_genome::{CppnPopulation, Genome, Population, PopulationConfig};
use neatbots_voxcraft::MaterialPalette;
use serde::Serialize;

use crate::config::{EvolutionConfig, NeatbotsConfig};
use crate::error::ConstructionError;
use crate::harness::{GenerationResult, SimulationHarness, Simulator};
use crate::morphology::{materials_used, MorphologyBuilder, MORPHOLOGY_INPUTS};
use crate::organism::{construct_organisms, Elite, Organism};
use crate::report::{GenerationStats, RunMetrics};

/// Outputs of a control network; nothing in the simulator reads them yet
pub const CONTROL_OUTPUTS: usize = 1;

type EliteOf<P, Q> = Elite<<P as Population>::Genome, <Q as Population>::Genome>;

pub struct EvolutionLoop<P: Population, Q: Population, S> {
    config: EvolutionConfig,
    morphology: P,
    control: Q,
    builder: MorphologyBuilder,
    harness: SimulationHarness<S>,
    elites: Vec<EliteOf<P, Q>>,
}

impl<S: Simulator> EvolutionLoop<CppnPopulation, CppnPopulation, S> {
    /// CPPN populations sized and seeded from `config`. The control
    /// population is seeded one past the morphology seed.
    pub fn from_config(config: &NeatbotsConfig, simulator: S) -> Self {
        let evolution = config.evolution.clone();
        let size = evolution.population_size;
        let morphology = CppnPopulation::new(
            size,
            MORPHOLOGY_INPUTS,
            evolution.material_policy.output_count(),
            config.neat.clone(),
        );
        let control = CppnPopulation::new(
            size,
            MORPHOLOGY_INPUTS,
            CONTROL_OUTPUTS,
            PopulationConfig {
                seed: config.neat.seed.wrapping_add(1),
                ..config.neat.clone()
            },
        );
        let harness = SimulationHarness::new(
            config.simulator.storage_root.clone(),
            config.simulator.protocol(),
            config.physics.clone(),
            simulator,
        );
        Self::new(evolution, morphology, control, harness)
    }
}

impl<P, Q, S> EvolutionLoop<P, Q, S>
where
    P: Population,
    Q: Population,
    P::Genome: Serialize,
    Q::Genome: Serialize,
    S: Simulator,
{
    pub fn new(
        config: EvolutionConfig,
        morphology: P,
        control: Q,
        harness: SimulationHarness<S>,
    ) -> Self {
        let builder =
            MorphologyBuilder::new(config.dims(), config.material_policy, config.diff_thresh);
        Self {
            config,
            morphology,
            control,
            builder,
            harness,
            elites: Vec::new(),
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn morphology(&self) -> &P {
        &self.morphology
    }

    pub fn control(&self) -> &Q {
        &self.control
    }

    pub fn harness(&self) -> &SimulationHarness<S> {
        &self.harness
    }

    /// One elite per completed generation, in order
    pub fn elites(&self) -> &[EliteOf<P, Q>] {
        &self.elites
    }

    fn progress_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} gen ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    /// Run every generation, optionally re-record the elites, and save the
    /// metrics and checkpoints to the output directory
    pub fn run(&mut self) -> Result<RunMetrics> {
        let gen_n = self.config.generations;
        let pb = if self.config.show_progress {
            let pb = ProgressBar::new(gen_n as u64);
            pb.set_style(Self::progress_style());
            pb
        } else {
            ProgressBar::hidden()
        };

        log::info!(
            "Starting evolution: {} generations, population {}, organism {}, {:?} materials",
            gen_n,
            self.config.population_size,
            self.config.dims(),
            self.config.material_policy
        );

        self.elites.clear();
        let mut generations = Vec::with_capacity(gen_n);
        for generation in 1..=gen_n {
            let (stats, elite) = self
                .step(generation)
                .with_context(|| format!("Generation {} failed", generation))?;

            let line = format!(
                "Generation {}/{}: avg {:.4}, max {:.4}, elite {}, {} failed, {} diverged, {} materials",
                generation,
                gen_n,
                stats.avg_fitness,
                stats.max_fitness,
                stats.elite_id,
                stats.failed,
                stats.diverged,
                stats.materials
            );
            if pb.is_hidden() {
                log::info!("{}", line);
            } else {
                pb.println(&line);
            }
            pb.set_message(format!("max {:.4}", stats.max_fitness));
            pb.inc(1);

            let interval = self.config.checkpoint_interval;
            if (interval > 0 && generation % interval == 0) || generation == gen_n {
                let path = self.save_checkpoint(&elite)?;
                log::debug!("Saved checkpoint {}", path.display());
            }

            self.elites.push(elite);
            generations.push(stats);

            self.morphology.advance();
            if self.config.evolve_control {
                self.control.advance();
            }
        }

        if self.config.record_elites {
            pb.set_message("recording elites");
            if let Some(result) = self.record_elites()? {
                log::info!(
                    "Recorded {} elite histories in {}",
                    result.histories.len(),
                    self.harness.storage_root().join(ELITES_DIR).display()
                );
            }
        }

        let metrics = RunMetrics::from_generations(generations);
        let (csv, _) = metrics.save(&self.config.output_dir)?;
        pb.finish_with_message("Evolution complete");

        log::info!(
            "Evolution complete: evo_speed {:.4}, evo_accel {:.4}, metrics in {}",
            metrics.evo_speed,
            metrics.evo_accel,
            csv.display()
        );
        Ok(metrics)
    }

    /// Construct, evaluate and score one generation, counted from 1
    fn step(&mut self, generation: usize) -> Result<(GenerationStats, EliteOf<P, Q>)> {
        let dir = self
            .harness
            .create_generation_directory(&format!("generation_{:04}", generation))?;
        let mut palette = self.harness.settings().base_palette();
        let record_step_size = self.harness.settings().record_step_size;

        let mut organisms = construct_organisms(
            generation,
            self.morphology.genomes_mut(),
            self.control.genomes_mut(),
            self.builder.dims(),
        );
        if organisms.is_empty() {
            anyhow::bail!("generation {} has no organisms", generation);
        }

        let mut built = Vec::with_capacity(organisms.len());
        let mut failed = 0;
        for (i, organism) in organisms.iter().enumerate() {
            let id = organism.id();
            let built_organism = build(
                &self.builder,
                &self.harness,
                &dir,
                organism.morphology(),
                id,
                &mut palette,
                record_step_size,
            );
            match built_organism {
                Ok(_) => built.push(i),
                Err(e) if e.is_fatal() => {
                    return Err(e).with_context(|| format!("Failed to write organism {}", id))
                }
                Err(e) => {
                    log::warn!("Organism {} could not be built, scoring 0: {}", id, e);
                    failed += 1;
                }
            }
        }

        let mut diverged = 0;
        if built.is_empty() {
            log::warn!(
                "Generation {}: no organism could be built, skipping simulation",
                generation
            );
        } else {
            self.harness.persist_settings(&dir, &palette)?;
            let result = self.harness.run(&dir)?;
            diverged = result.fitness.diverged().len();
            for &i in &built {
                let fitness = result.fitness.fitness_of(organisms[i].id())?;
                organisms[i].set_fitness(fitness);
            }
        }
        // Unsimulated organisms score 0
        for (i, organism) in organisms.iter_mut().enumerate() {
            if !built.contains(&i) {
                organism.set_fitness(0.0);
            }
        }

        let (elite_index, max_fitness) = elite_of(&organisms);
        let avg_fitness =
            organisms.iter().map(Organism::fitness).sum::<f64>() / organisms.len().max(1) as f64;
        let elite = organisms[elite_index].to_elite(generation);

        let stats = GenerationStats {
            generation,
            avg_fitness,
            max_fitness,
            elite_id: elite.id.clone(),
            failed,
            diverged,
            materials: palette.organism_materials().count(),
        };
        Ok((stats, elite))
    }

    /// Simulate every elite again with history recording. The fitness of
    /// this run is logged only.
    fn record_elites(&mut self) -> Result<Option<GenerationResult>> {
        let dir = self.harness.create_generation_directory(ELITES_DIR)?;
        let mut palette = self.harness.settings().base_palette();
        let step = self.config.elite_record_step_size;

        let mut written = 0;
        for elite in &self.elites {
            let built_elite = build(
                &self.builder,
                &self.harness,
                &dir,
                &elite.morphology,
                &elite.id,
                &mut palette,
                step,
            );
            match built_elite {
                Ok(_) => written += 1,
                Err(e) if e.is_fatal() => {
                    return Err(e).with_context(|| format!("Failed to write elite {}", elite.id))
                }
                Err(e) => log::warn!("Elite {} could not be rebuilt: {}", elite.id, e),
            }
        }
        if written == 0 {
            log::warn!("No elite could be rebuilt, skipping history recording");
            return Ok(None);
        }

        self.harness.persist_settings(&dir, &palette)?;
        let result = self.harness.run(&dir).context("Elite recording failed")?;
        for elite in &self.elites {
            if let Some(fitness) = result.fitness.get(&elite.id) {
                log::debug!(
                    "Elite {} re-scored {:.4} (original {:.4})",
                    elite.id,
                    fitness,
                    elite.fitness
                );
            }
        }
        Ok(Some(result))
    }

    /// `output_dir/checkpoints/gen_NNNN_elite_<id>.genome`
    fn save_checkpoint(&self, elite: &EliteOf<P, Q>) -> Result<PathBuf> {
        let checkpoint_dir = self.config.output_dir.join("checkpoints");
        std::fs::create_dir_all(&checkpoint_dir)
            .context("Failed to create checkpoint directory")?;

        let path = checkpoint_dir.join(format!(
            "gen_{:04}_elite_{}.genome",
            elite.generation, elite.id
        ));
        let data = bincode_next::serde::encode_to_vec(elite, bincode_next::config::standard())
            .context("Failed to serialize elite")?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))?;
        Ok(path)
    }
}

const ELITES_DIR: &str = "elites";

/// Synthesize and write one organism
fn build<G: Genome, S: Simulator>(
    builder: &MorphologyBuilder,
    harness: &SimulationHarness<S>,
    dir: &Path,
    morphology: &G,
    id: &str,
    palette: &mut MaterialPalette,
    record_step_size: u32,
) -> Result<PathBuf, ConstructionError> {
    let grid = builder.generate(morphology, palette)?;
    if log::log_enabled!(log::Level::Debug) {
        let names: Vec<&str> = materials_used(&grid, palette)
            .into_iter()
            .map(|m| m.name.as_str())
            .collect();
        log::debug!("Organism {} uses materials {:?}", id, names);
    }
    harness.write_organism(dir, id, &grid, record_step_size)
}

/// Index and fitness of the first organism with the highest fitness
fn elite_of<M: Genome, C: Genome>(organisms: &[Organism<'_, M, C>]) -> (usize, f64) {
    organisms
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, o)| {
            if o.fitness() > max {
                (i, o.fitness())
            } else {
                (best, max)
            }
        })
}

/// Read a checkpoint written by [`EvolutionLoop::run`]
pub fn load_checkpoint<M, C>(path: &Path) -> Result<Elite<M, C>>
where
    M: serde::de::DeserializeOwned,
    C: serde::de::DeserializeOwned,
{
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
    let (elite, _) =
        bincode_next::serde::decode_from_slice(&data, bincode_next::config::standard())
            .context("Failed to deserialize elite")?;
    Ok(elite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neatbots_genome::{CppnGenome, InnovationTracker};
    use neatbots_voxcraft::Dims;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_elite_is_first_maximum() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut tracker = InnovationTracker::new(5, 1);
        let mut morphologies: Vec<CppnGenome> = (0..4)
            .map(|_| CppnGenome::minimal(5, 1, &mut tracker, &mut rng))
            .collect();
        let mut controls = morphologies.clone();

        let mut organisms =
            construct_organisms(1, &mut morphologies, &mut controls, Dims::new(1, 1, 1));
        for (organism, fitness) in organisms.iter_mut().zip([0.2, 0.9, 0.9, -1.0]) {
            organism.set_fitness(fitness);
        }
        assert_eq!(elite_of(&organisms), (1, 0.9));
    }

    #[test]
    fn test_elite_of_zero_fitness() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let mut tracker = InnovationTracker::new(5, 1);
        let mut morphologies = vec![CppnGenome::minimal(5, 1, &mut tracker, &mut rng)];
        let mut controls = morphologies.clone();
        let organisms =
            construct_organisms(1, &mut morphologies, &mut controls, Dims::new(1, 1, 1));
        assert_eq!(elite_of(&organisms), (0, 0.0));
    }
}
