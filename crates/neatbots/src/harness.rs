//! Batch evaluation of one generation in the external simulator
//!
//! A generation directory holds `base.vxa` plus one `<label>_<id>.vxd` per
//! organism. The simulator is invoked once for the whole directory and
//! leaves `results.xml` behind; its standard output carries the execution
//! log followed by any recorded histories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use neatbots_voxcraft::{
    MaterialPalette, SimSettings, SimulationReport, StreamProtocol, VoxelGrid, Vxd,
};

use crate::error::{ConstructionError, HarnessError};

pub const SETTINGS_FILE: &str = "base.vxa";
pub const RESULTS_FILE: &str = "results.xml";
pub const EXECUTION_LOG_FILE: &str = "simulation.log";

/// What the simulator printed
#[derive(Debug, Clone, Default)]
pub struct SimulatorOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Evaluates every organism in a populated generation directory and leaves
/// `results.xml` in it
pub trait Simulator {
    fn simulate(&mut self, dir: &Path) -> Result<SimulatorOutput, HarnessError>;
}

/// The Voxcraft binary, run as
/// `<executable> -i <dir> -o <dir>/results.xml -w <worker> --force`
#[derive(Debug, Clone)]
pub struct VoxcraftProcess {
    executable: PathBuf,
    worker: PathBuf,
}

impl VoxcraftProcess {
    pub fn new(executable: impl Into<PathBuf>, worker: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            worker: worker.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl Simulator for VoxcraftProcess {
    fn simulate(&mut self, dir: &Path) -> Result<SimulatorOutput, HarnessError> {
        log::debug!(
            "Running {} on {}",
            self.executable.display(),
            dir.display()
        );
        let output = Command::new(&self.executable)
            .arg("-i")
            .arg(dir)
            .arg("-o")
            .arg(dir.join(RESULTS_FILE))
            .arg("-w")
            .arg(&self.worker)
            .arg("--force")
            .output()
            .map_err(|source| HarnessError::Spawn {
                executable: self.executable.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(HarnessError::SimulatorProcess {
                detail: format!("{} exited with {}", self.executable.display(), output.status),
                stderr,
            });
        }
        Ok(SimulatorOutput { stdout, stderr })
    }
}

/// Fitness per organism id for one batch, divergence overrides applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitnessRecord {
    scores: BTreeMap<String, f64>,
    diverged: Vec<String>,
}

impl FitnessRecord {
    /// Scores as reported, then every diverged organism forced to 0.0. A
    /// non-finite score counts as divergence even without the log marker.
    pub fn new(report: &SimulationReport, mut diverged: Vec<String>) -> Self {
        let mut scores: BTreeMap<String, f64> = BTreeMap::new();
        for (id, fitness) in report.iter() {
            if !fitness.is_finite() && !diverged.iter().any(|d| d == id) {
                log::warn!(
                    "Organism {} reported fitness {}, treating it as diverged",
                    id,
                    fitness
                );
                diverged.push(id.to_string());
            }
            scores.insert(id.to_string(), fitness);
        }
        for id in &diverged {
            match scores.insert(id.clone(), 0.0) {
                Some(reported) if reported.is_finite() => log::warn!(
                    "Organism {} diverged, overriding reported fitness {:.4} with 0",
                    id,
                    reported
                ),
                Some(_) => {}
                None => log::warn!("Organism {} diverged, fitness set to 0", id),
            }
        }
        Self { scores, diverged }
    }

    /// Fitness of an organism that was part of the batch
    pub fn fitness_of(&self, id: &str) -> Result<f64, HarnessError> {
        self.get(id)
            .ok_or_else(|| HarnessError::MissingResultEntry { id: id.to_string() })
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.scores.get(id).copied()
    }

    pub fn is_diverged(&self, id: &str) -> bool {
        self.diverged.iter().any(|d| d == id)
    }

    pub fn diverged(&self) -> &[String] {
        &self.diverged
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(id, f)| (id.as_str(), *f))
    }
}

/// Outcome of one simulator invocation
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub fitness: FitnessRecord,
    /// History files written, in stream order
    pub histories: Vec<PathBuf>,
    pub execution_log: PathBuf,
}

/// Owns the storage root and the simulator for a run
pub struct SimulationHarness<S> {
    storage_root: PathBuf,
    protocol: StreamProtocol,
    settings: SimSettings,
    simulator: S,
}

impl<S: Simulator> SimulationHarness<S> {
    pub fn new(
        storage_root: impl Into<PathBuf>,
        protocol: StreamProtocol,
        settings: SimSettings,
        simulator: S,
    ) -> Self {
        Self {
            storage_root: storage_root.into(),
            protocol,
            settings,
            simulator,
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn protocol(&self) -> &StreamProtocol {
        &self.protocol
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// An empty directory `<storage_root>/<name>`. Whatever was there before
    /// is removed, so stale organisms never reach the simulator.
    pub fn create_generation_directory(&self, name: &str) -> Result<PathBuf, HarnessError> {
        let dir = self.storage_root.join(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|source| HarnessError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&dir).map_err(|source| HarnessError::Io {
            path: dir.clone(),
            source,
        })?;
        log::debug!("Prepared generation directory {}", dir.display());
        Ok(dir)
    }

    /// Place, crop and write one organism as `<label>_<id>.vxd`
    pub fn write_organism(
        &self,
        dir: &Path,
        id: &str,
        grid: &VoxelGrid,
        record_step_size: u32,
    ) -> Result<PathBuf, ConstructionError> {
        let vxd = Vxd::encode(grid, self.settings.get_voxelspace(), record_step_size)?;
        let path = dir.join(self.protocol.encoded_file_name(id));
        vxd.write(&path)?;
        log::debug!(
            "Wrote organism {} ({} voxels, {})",
            id,
            vxd.structure.filled_count(),
            vxd.structure.dims()
        );
        Ok(path)
    }

    /// Write `base.vxa` with every material the generation's organisms use.
    /// Call after the last organism is encoded.
    pub fn persist_settings(
        &self,
        dir: &Path,
        palette: &MaterialPalette,
    ) -> Result<PathBuf, HarnessError> {
        let path = dir.join(SETTINGS_FILE);
        self.settings.write(&path, palette)?;
        log::debug!("Wrote {} with {} materials", path.display(), palette.len());
        Ok(path)
    }

    /// Simulate every organism in `dir` in one invocation
    pub fn run(&mut self, dir: &Path) -> Result<GenerationResult, HarnessError> {
        let output = self.simulator.simulate(dir)?;
        if !output.stderr.trim().is_empty() {
            log::debug!("Simulator stderr:\n{}", output.stderr.trim_end());
        }

        let demuxed = self.protocol.demultiplex(&output.stdout);
        let execution_log = dir.join(EXECUTION_LOG_FILE);
        write_file(&execution_log, &demuxed.execution_log)?;

        let mut histories = Vec::with_capacity(demuxed.histories.len());
        let mut unmatched = 0;
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for block in &demuxed.histories {
            let name = match &block.organism_id {
                Some(id) => {
                    let count = seen.entry(id.as_str()).or_insert(0);
                    *count += 1;
                    if *count == 1 {
                        format!("{}.history", id)
                    } else {
                        log::warn!(
                            "Organism {} recorded {} times, storing as {}_{}.history",
                            id,
                            count,
                            id,
                            count
                        );
                        format!("{}_{}.history", id, count)
                    }
                }
                None => {
                    unmatched += 1;
                    log::warn!(
                        "History block {} names no organism, storing as unmatched_{}.history",
                        histories.len() + 1,
                        unmatched
                    );
                    format!("unmatched_{}.history", unmatched)
                }
            };
            let path = dir.join(name);
            write_file(&path, &block.content)?;
            histories.push(path);
        }

        let results = dir.join(RESULTS_FILE);
        let xml = match std::fs::read_to_string(&results) {
            Ok(xml) => xml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::SimulatorProcess {
                    detail: format!("no results file at {}", results.display()),
                    stderr: output.stderr,
                });
            }
            Err(source) => {
                return Err(HarnessError::Io {
                    path: results,
                    source,
                })
            }
        };
        let report = SimulationReport::parse(&xml, &self.protocol.label).map_err(|source| {
            HarnessError::Results {
                path: results.clone(),
                source,
            }
        })?;

        let diverged = self.protocol.diverged_organisms(&demuxed.execution_log);
        let fitness = FitnessRecord::new(&report, diverged);
        log::debug!(
            "Simulated {}: {} results, {} diverged, {} histories",
            dir.display(),
            fitness.len(),
            fitness.diverged().len(),
            histories.len()
        );

        Ok(GenerationResult {
            fitness,
            histories,
            execution_log,
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), HarnessError> {
    std::fs::write(path, contents).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })
}
