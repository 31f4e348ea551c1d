use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use neatbots::{EvolutionLoop, NeatbotsConfig, VoxcraftProcess};
use neatbots_voxcraft::{Dims, Environment};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RON configuration file (default: ./neatbots.ron if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of generations to evolve
    #[arg(long)]
    generations: Option<usize>,

    /// Organisms per generation
    #[arg(long)]
    population: Option<usize>,

    /// Organism grid size, e.g. 4x4x3
    #[arg(long)]
    dims: Option<Dims>,

    /// Output directory for metrics and checkpoints
    #[arg(long)]
    output: Option<PathBuf>,

    /// VXA file with an environment to spawn organisms into
    #[arg(long)]
    environment: Option<PathBuf>,

    /// Random seed for both populations
    #[arg(long)]
    seed: Option<u64>,

    /// Re-simulate the elites with history recording after the run
    #[arg(long)]
    record_elites: bool,

    /// Log generations instead of drawing a progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = NeatbotsConfig::load(args.config.as_deref())?;

    if let Some(generations) = args.generations {
        config.evolution.generations = generations;
    }
    if let Some(population) = args.population {
        config.evolution.population_size = population;
    }
    if let Some(dims) = args.dims {
        config.evolution.set_dims(dims);
    }
    if let Some(output) = args.output {
        config.evolution.output_dir = output;
    }
    if let Some(environment) = args.environment {
        config.simulator.environment = Some(environment);
    }
    if let Some(seed) = args.seed {
        config.neat.seed = seed;
    }
    if args.record_elites {
        config.evolution.record_elites = true;
    }
    if args.no_progress {
        config.evolution.show_progress = false;
    }
    config.evolution.validate()?;

    if let Some(path) = &config.simulator.environment {
        let environment = Environment::load(path)
            .with_context(|| format!("Failed to load environment {}", path.display()))?;
        log::info!("Spawning organisms into environment {}", environment.describe());
        config.physics.environment = Some(environment);
    }

    let simulator = VoxcraftProcess::new(&config.simulator.executable, &config.simulator.worker);
    log::info!(
        "Starting Neatbots with simulator {}",
        simulator.executable().display()
    );

    let mut evolution = EvolutionLoop::from_config(&config, simulator);
    let metrics = evolution.run()?;

    println!(
        "{} generations, evo_speed {:.4}, evo_accel {:.4}",
        metrics.gen_n, metrics.evo_speed, metrics.evo_accel
    );
    if let (Some(id), Some(fitness)) = (&metrics.best_elite_id, metrics.best_elite_fitness) {
        println!("Best elite {} with fitness {:.4}", id, fitness);
    }
    println!("Results in {}", config.evolution.output_dir.display());
    Ok(())
}
