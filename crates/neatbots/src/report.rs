//! Run metrics and the files they are saved to
//!
//! `metrics.csv` holds one row per generation, `summary.json` the whole run.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Statistics of one evaluated generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Counted from 1, matches the organism ids
    pub generation: usize,
    pub avg_fitness: f64,
    pub max_fitness: f64,
    pub elite_id: String,
    /// Organisms that could not be built
    pub failed: usize,
    pub diverged: usize,
    /// Organism materials in the generation's palette
    pub materials: usize,
}

/// Everything a run measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub gen_n: usize,
    pub evo_speed: f64,
    pub evo_accel: f64,
    pub best_elite_id: Option<String>,
    pub best_elite_fitness: Option<f64>,
    pub generations: Vec<GenerationStats>,
}

impl RunMetrics {
    pub fn from_generations(generations: Vec<GenerationStats>) -> Self {
        let avg: Vec<f64> = generations.iter().map(|g| g.avg_fitness).collect();
        let (evo_speed, evo_accel) = evolution_rates(&avg);
        let best = generations
            .iter()
            .fold(None, |best: Option<&GenerationStats>, g| match best {
                Some(b) if b.max_fitness >= g.max_fitness => Some(b),
                _ => Some(g),
            });

        Self {
            gen_n: generations.len(),
            evo_speed,
            evo_accel,
            best_elite_id: best.map(|g| g.elite_id.clone()),
            best_elite_fitness: best.map(|g| g.max_fitness),
            generations,
        }
    }

    /// One header line plus one line per generation
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("generation,avg_fitness,max_fitness,elite_id,failed\n");
        for g in &self.generations {
            // Writing to a String cannot fail
            let _ = writeln!(
                csv,
                "{},{},{},{},{}",
                g.generation, g.avg_fitness, g.max_fitness, g.elite_id, g.failed
            );
        }
        csv
    }

    /// Write `metrics.csv` and `summary.json` into `output_dir`
    pub fn save(&self, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory: {}", output_dir.display())
        })?;

        let csv_path = output_dir.join("metrics.csv");
        std::fs::write(&csv_path, self.to_csv())
            .with_context(|| format!("Failed to write metrics: {}", csv_path.display()))?;

        let summary = Summary {
            finished_at: chrono::Utc::now().to_rfc3339(),
            metrics: self,
        };
        let json =
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?;
        let json_path = output_dir.join("summary.json");
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write summary: {}", json_path.display()))?;

        Ok((csv_path, json_path))
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    finished_at: String,
    #[serde(flatten)]
    metrics: &'a RunMetrics,
}

/// `(evo_speed, evo_accel)` from the per-generation average fitness. Both
/// are 0 for fewer than two generations.
pub fn evolution_rates(avg_fitness: &[f64]) -> (f64, f64) {
    let n = avg_fitness.len();
    if n <= 1 {
        return (0.0, 0.0);
    }
    let gen_n = n as f64;
    let speed = (avg_fitness[n - 1] - avg_fitness[0]) / gen_n;
    let accel =
        ((avg_fitness[n - 1] - avg_fitness[n - 2]) - (avg_fitness[1] - avg_fitness[0])) / gen_n;
    (speed, accel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stats(generation: usize, avg: f64, max: f64) -> GenerationStats {
        GenerationStats {
            generation,
            avg_fitness: avg,
            max_fitness: max,
            elite_id: format!("{}-1", generation),
            failed: 0,
            diverged: 0,
            materials: 1,
        }
    }

    #[test]
    fn test_rates_need_two_generations() {
        assert_eq!(evolution_rates(&[]), (0.0, 0.0));
        assert_eq!(evolution_rates(&[3.0]), (0.0, 0.0));
    }

    #[test]
    fn test_rates() {
        let (speed, accel) = evolution_rates(&[1.0, 2.0, 4.0, 7.0]);
        assert_eq!(speed, 1.5);
        // (7 - 4) - (2 - 1) = 2, over 4 generations
        assert_eq!(accel, 0.5);

        // With two generations the two differences cancel
        let (speed, accel) = evolution_rates(&[1.0, 3.0]);
        assert_eq!(speed, 1.0);
        assert_eq!(accel, 0.0);
    }

    #[test]
    fn test_best_elite() {
        let metrics =
            RunMetrics::from_generations(vec![stats(1, 0.5, 1.0), stats(2, 0.6, 2.0), stats(3, 0.7, 2.0)]);
        assert_eq!(metrics.gen_n, 3);
        assert_eq!(metrics.best_elite_id.as_deref(), Some("2-1"));
        assert_eq!(metrics.best_elite_fitness, Some(2.0));
    }

    #[test]
    fn test_save() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("run");
        let metrics = RunMetrics::from_generations(vec![stats(1, 0.25, 0.5), stats(2, 0.75, 1.0)]);

        let (csv, json) = metrics.save(&out).unwrap();
        let csv = std::fs::read_to_string(csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "generation,avg_fitness,max_fitness,elite_id,failed");
        assert_eq!(lines[1], "1,0.25,0.5,1-1,0");
        assert_eq!(lines.len(), 3);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(summary["gen_n"], 2);
        assert_eq!(summary["evo_speed"], 0.25);
        assert_eq!(summary["generations"].as_array().unwrap().len(), 2);
        assert!(summary["finished_at"].is_string());
    }
}
