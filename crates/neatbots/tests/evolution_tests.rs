//! Integration tests for the generational loop against a canned simulator

mod common;

use common::{harness, test_config, CannedSimulator, ConstGenome, ConstPopulation};
use neatbots::{
    construct_organisms, load_checkpoint, EvolutionConfig, EvolutionLoop, HarnessError,
    MaterialPolicy,
};
use neatbots_genome::{
    CppnGenome, CppnPopulation, Genome, PhenotypeNetwork, Population, PopulationConfig,
};
use neatbots_voxcraft::Dims;
use tempfile::TempDir;

fn const_config(tmp: &TempDir, generations: usize, population: usize) -> EvolutionConfig {
    let mut evolution = test_config(tmp, generations, population, Dims::new(2, 2, 2)).evolution;
    evolution.material_policy = MaterialPolicy::Classes;
    evolution
}

fn const_loop(
    tmp: &TempDir,
    evolution: EvolutionConfig,
    values: &[f32],
    simulator: CannedSimulator,
) -> EvolutionLoop<ConstPopulation, ConstPopulation, CannedSimulator> {
    EvolutionLoop::new(
        evolution,
        ConstPopulation::new(values, 1),
        ConstPopulation::new(values, 1),
        harness(tmp, simulator),
    )
}

// ============================================================================
// Pairing and end-to-end runs
// ============================================================================

#[test]
fn test_pairing_cardinality() {
    let mut morphology = CppnPopulation::new(5, 5, 19, PopulationConfig::default());
    let mut control = CppnPopulation::new(5, 5, 1, PopulationConfig::default());

    let organisms = construct_organisms(
        7,
        morphology.genomes_mut(),
        control.genomes_mut(),
        Dims::new(2, 2, 2),
    );
    let ids: Vec<&str> = organisms.iter().map(|o| o.id()).collect();
    assert_eq!(ids, ["7-1", "7-2", "7-3", "7-4", "7-5"]);
}

#[test]
fn test_two_generation_run() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 2, 1, Dims::new(1, 1, 1));

    let mut evolution = EvolutionLoop::from_config(&config, CannedSimulator::constant(0.5));
    let metrics = evolution.run().unwrap();

    assert_eq!(metrics.gen_n, 2);
    assert_eq!(metrics.generations.len(), 2);
    assert!(metrics.evo_speed.is_finite());
    assert!(metrics.evo_accel.is_finite());
    assert_eq!(evolution.elites().len(), 2);
    assert_eq!(evolution.morphology().generation(), 2);

    let output = tmp.path().join("output");
    let csv = std::fs::read_to_string(output.join("metrics.csv")).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(output.join("summary.json").exists());
    // The last generation is always checkpointed
    let checkpoints: Vec<_> = std::fs::read_dir(output.join("checkpoints"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(checkpoints.len(), 1);
    assert!(checkpoints[0].starts_with("gen_0002_elite_2-1"));
}

#[test]
fn test_elitism_invariant() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp, 3, 6, Dims::new(3, 3, 2));
    config.evolution.material_policy = MaterialPolicy::Classes;
    config.neat.seed = 11;

    let simulator = CannedSimulator::new(|id| {
        let (g, i) = id.split_once('-').unwrap();
        let g: f64 = g.parse().unwrap();
        let i: f64 = i.parse().unwrap();
        (g * 1.7 + i * 0.37).sin().abs()
    });
    let mut evolution = EvolutionLoop::from_config(&config, simulator);
    let metrics = evolution.run().unwrap();

    let runs = &evolution.harness().simulator().runs;
    for (stats, elite) in metrics.generations.iter().zip(evolution.elites()) {
        assert_eq!(elite.generation, stats.generation);
        assert_eq!(elite.id, stats.elite_id);
        assert_eq!(elite.fitness, stats.max_fitness);
        assert_eq!(elite.morphology.fitness(), stats.max_fitness);

        let prefix = format!("{}-", stats.generation);
        let mut best = if stats.failed > 0 { 0.0 } else { f64::NEG_INFINITY };
        for (_, scored) in runs {
            for (id, fitness) in scored {
                if id.starts_with(&prefix) {
                    best = f64::max(best, *fitness);
                }
            }
        }
        assert_eq!(stats.max_fitness, best);
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn test_divergence_zeroes_fitness() {
    let tmp = TempDir::new().unwrap();
    let mut simulator = CannedSimulator::constant(0.87);
    simulator.diverged = vec!["3-2".to_string()];

    let mut evolution = const_loop(&tmp, const_config(&tmp, 3, 2), &[1.0, 1.0], simulator);
    let metrics = evolution.run().unwrap();

    let history = &evolution.morphology().history;
    assert_eq!(history[1], vec![0.87, 0.87]);
    assert_eq!(history[2], vec![0.87, 0.0]);
    assert_eq!(metrics.generations[2].diverged, 1);
    assert_eq!(metrics.generations[2].elite_id, "3-1");
    // Control genomes are scored even though they are not advanced
    assert_eq!(evolution.control().genomes()[1].fitness(), 0.0);
    assert!(evolution.control().history.is_empty());
}

#[test]
fn test_non_finite_results_score_zero() {
    let tmp = TempDir::new().unwrap();
    let simulator = CannedSimulator::new(|id| if id.ends_with("-1") { f64::NAN } else { 0.4 });

    let mut evolution = const_loop(&tmp, const_config(&tmp, 2, 2), &[1.0, 1.0], simulator);
    let metrics = evolution.run().unwrap();

    assert_eq!(evolution.morphology().history[0], vec![0.0, 0.4]);
    for (stats, elite) in metrics.generations.iter().zip(evolution.elites()) {
        assert_eq!(stats.max_fitness, 0.4);
        assert_eq!(stats.diverged, 1);
        assert_eq!(elite.fitness, stats.max_fitness);
    }
    assert!(metrics.evo_speed.is_finite());
    assert!(metrics.evo_accel.is_finite());
}

#[test]
fn test_missing_result_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let mut simulator = CannedSimulator::constant(1.0);
    simulator.omit = vec!["1-2".to_string()];

    let mut evolution = const_loop(&tmp, const_config(&tmp, 2, 2), &[1.0, 1.0], simulator);
    let err = evolution.run().unwrap_err();

    let missing = err
        .chain()
        .find_map(|e| e.downcast_ref::<HarnessError>())
        .unwrap();
    assert!(matches!(missing, HarnessError::MissingResultEntry { id } if id == "1-2"));
    assert!(evolution.morphology().history.is_empty());
}

#[test]
fn test_construction_failures_are_contained() {
    let tmp = TempDir::new().unwrap();
    // A network that outputs 0 everywhere builds an empty organism
    let mut evolution = const_loop(
        &tmp,
        const_config(&tmp, 2, 3),
        &[1.0, 0.0, 0.5],
        CannedSimulator::constant(2.0),
    );
    let metrics = evolution.run().unwrap();

    for stats in &metrics.generations {
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.max_fitness, 2.0);
        assert!((stats.avg_fitness - 4.0 / 3.0).abs() < 1e-12);
    }
    let runs = &evolution.harness().simulator().runs;
    assert_eq!(runs.len(), 2);
    let ids: Vec<&str> = runs[0].1.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, ["1-1", "1-3"]);
    assert_eq!(evolution.morphology().history[0], vec![2.0, 0.0, 2.0]);
}

#[test]
fn test_wrong_output_count_is_contained() {
    let tmp = TempDir::new().unwrap();
    let mut evolution = EvolutionLoop::new(
        EvolutionConfig {
            material_policy: MaterialPolicy::Properties,
            ..const_config(&tmp, 1, 2)
        },
        ConstPopulation::new(&[0.2, 0.2], 3),
        ConstPopulation::new(&[0.2, 0.2], 1),
        harness(&tmp, CannedSimulator::constant(1.0)),
    );
    let metrics = evolution.run().unwrap();

    assert_eq!(metrics.generations[0].failed, 2);
    assert_eq!(metrics.generations[0].max_fitness, 0.0);
    // Nothing was built, so the simulator never ran
    assert!(evolution.harness().simulator().runs.is_empty());
}

#[test]
fn test_control_population_advances_when_enabled() {
    let tmp = TempDir::new().unwrap();
    let evolution_config = EvolutionConfig {
        evolve_control: true,
        ..const_config(&tmp, 2, 2)
    };
    let mut evolution = const_loop(&tmp, evolution_config, &[1.0, 1.0], CannedSimulator::by_index());
    evolution.run().unwrap();

    assert_eq!(evolution.control().history.len(), 2);
    assert_eq!(evolution.control().history[1], vec![1.0, 2.0]);
}

// ============================================================================
// Elites
// ============================================================================

#[test]
fn test_elite_recording_does_not_change_fitness() {
    let tmp = TempDir::new().unwrap();
    let mut simulator = CannedSimulator::by_index();
    simulator.histories = true;
    let evolution_config = EvolutionConfig {
        record_elites: true,
        ..const_config(&tmp, 2, 2)
    };

    let mut evolution = const_loop(&tmp, evolution_config, &[0.5, 1.0], simulator);
    let metrics = evolution.run().unwrap();

    let elite_ids: Vec<&str> = evolution.elites().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(elite_ids, ["1-2", "2-2"]);
    assert!(evolution.elites().iter().all(|e| e.fitness == 2.0));
    assert_eq!(metrics.generations[1].max_fitness, 2.0);

    let elites_dir = tmp.path().join("generations").join("elites");
    let vxd = std::fs::read_to_string(elites_dir.join("bot_2-2.vxd")).unwrap();
    assert!(vxd.contains(">100</RecordStepSize>"));
    assert!(elites_dir.join("1-2.history").exists());
    assert!(elites_dir.join("2-2.history").exists());

    // Regular generations record nothing
    let generation_dir = tmp.path().join("generations").join("generation_0001");
    assert!(!generation_dir.join("1-2.history").exists());
    assert!(generation_dir.join("simulation.log").exists());
    assert!(generation_dir.join("base.vxa").exists());

    // Three simulator invocations: two generations and the elites
    assert_eq!(evolution.harness().simulator().runs.len(), 3);
}

#[test]
fn test_checkpoints_round_trip() {
    let tmp = TempDir::new().unwrap();
    let evolution_config = EvolutionConfig {
        checkpoint_interval: 1,
        ..const_config(&tmp, 2, 2)
    };
    let mut evolution =
        const_loop(&tmp, evolution_config, &[1.0, 0.5], CannedSimulator::by_index());
    evolution.run().unwrap();

    let path = tmp
        .path()
        .join("output")
        .join("checkpoints")
        .join("gen_0001_elite_1-2.genome");
    let elite = load_checkpoint::<ConstGenome, ConstGenome>(&path).unwrap();
    assert_eq!(elite.id, "1-2");
    assert_eq!(elite.generation, 1);
    assert_eq!(elite.fitness, 2.0);
    assert_eq!(elite.morphology.value, 0.5);
    assert!(tmp
        .path()
        .join("output/checkpoints/gen_0002_elite_2-2.genome")
        .exists());
}

#[test]
fn test_cppn_checkpoint_restores_network() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp, 1, 3, Dims::new(2, 2, 2));
    config.neat.seed = 9;

    let mut evolution = EvolutionLoop::from_config(&config, CannedSimulator::by_index());
    evolution.run().unwrap();
    let elite = &evolution.elites()[0];

    let path = tmp
        .path()
        .join("output")
        .join("checkpoints")
        .join(format!("gen_0001_elite_{}.genome", elite.id));
    let loaded = load_checkpoint::<CppnGenome, CppnGenome>(&path).unwrap();

    assert_eq!(loaded.id, elite.id);
    assert_eq!(
        loaded.morphology.graph.edge_count(),
        elite.morphology.graph.edge_count()
    );
    let inputs = [0.5, 1.0, 0.0, 0.7, 1.0];
    for (original, restored) in [
        (&elite.morphology, &loaded.morphology),
        (&elite.control, &loaded.control),
    ] {
        let expected = original.build_phenotype().query(&inputs);
        assert!(expected.iter().any(|&v| v != 0.0));
        assert_eq!(restored.build_phenotype().query(&inputs), expected);
    }
}

#[test]
fn test_generation_directories_are_fresh() {
    let tmp = TempDir::new().unwrap();
    let stale = tmp.path().join("generations").join("generation_0001");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("bot_9-9.vxd"), "<VXD/>").unwrap();

    let mut evolution = const_loop(
        &tmp,
        const_config(&tmp, 1, 1),
        &[1.0],
        CannedSimulator::constant(1.0),
    );
    evolution.run().unwrap();

    let ids: Vec<&str> = evolution.harness().simulator().runs[0]
        .1
        .iter()
        .map(|(id, _)| id.as_str())
        .collect();
    assert_eq!(ids, ["1-1"]);
}
