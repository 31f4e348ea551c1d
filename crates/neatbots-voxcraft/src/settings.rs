//! Simulator settings and `base.vxa` rendering
//!
//! The settings are fixed for a run. The palette changes every generation,
//! so the VXA document is rendered from both at write time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoder::encode_layer;
use crate::environment::Environment;
use crate::error::SettingsError;
use crate::materials::{MaterialPalette, Property};
use crate::voxels::{Point3, VoxelGrid};
use crate::xml::XmlWriter;

/// Physics and recording parameters shared by every organism of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Fraction of GPU heap the simulator may use
    pub heap_size: f64,
    pub enable_cilia: bool,
    /// Allow expansion as well as contraction
    pub enable_expansion: bool,
    pub dt_frac: f64,
    pub bond_damping_z: f64,
    pub col_damping_z: f64,
    pub slow_damping_z: f64,
    pub enable_collision: bool,
    /// Simulated seconds per organism
    pub sim_time: f64,
    pub temp_enabled: bool,
    pub vary_temp_enabled: bool,
    pub temp_period: f64,
    pub temp_amplitude: f64,
    pub temp_base: f64,
    pub grav_enabled: bool,
    pub grav_acc: f64,
    pub floor_enabled: bool,
    pub lattice_dim: f64,
    pub record_step_size: u32,
    pub record_voxel: bool,
    pub record_link: bool,
    pub record_fixed_voxels: bool,
    #[serde(skip)]
    pub environment: Option<Environment>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            heap_size: 0.5,
            enable_cilia: false,
            enable_expansion: true,
            dt_frac: 0.95,
            bond_damping_z: 1.0,
            col_damping_z: 0.8,
            slow_damping_z: 0.01,
            enable_collision: false,
            sim_time: 0.5,
            temp_enabled: true,
            vary_temp_enabled: true,
            temp_period: 0.1,
            temp_amplitude: 20.0,
            temp_base: 25.0,
            grav_enabled: true,
            grav_acc: -9.81,
            floor_enabled: true,
            lattice_dim: 0.01,
            record_step_size: 0,
            record_voxel: true,
            record_link: false,
            record_fixed_voxels: true,
            environment: None,
        }
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

impl SimSettings {
    pub fn builder() -> SimSettingsBuilder {
        SimSettingsBuilder::default()
    }

    /// Environment grid and spawn point, when organisms are placed into one
    pub fn get_voxelspace(&self) -> Option<(&VoxelGrid, Point3)> {
        self.environment.as_ref().map(|env| (&env.grid, env.spawn))
    }

    /// Palette to start each generation from
    pub fn base_palette(&self) -> MaterialPalette {
        match &self.environment {
            Some(env) => MaterialPalette::with_environment(&env.materials),
            None => MaterialPalette::new(),
        }
    }

    /// Render the VXA document for one generation
    pub fn render_vxa(&self, palette: &MaterialPalette) -> Result<String, SettingsError> {
        let mut w = XmlWriter::new();
        w.open_with("VXA", &[("Version", "1.1")]);

        w.open("GPU").leaf("HeapSize", self.heap_size).close();

        w.open("Simulator");
        w.leaf("EnableCilia", flag(self.enable_cilia))
            .leaf("EnableExpansion", flag(self.enable_expansion))
            .leaf("MaxDistInVoxelLengthsToCountAsPair", 2);
        w.open("Integration").leaf("DtFrac", self.dt_frac).close();
        w.open("Damping")
            .leaf("BondDampingZ", self.bond_damping_z)
            .leaf("ColDampingZ", self.col_damping_z)
            .leaf("SlowDampingZ", self.slow_damping_z)
            .close();
        w.open("AttachDetach")
            .leaf("EnableCollision", flag(self.enable_collision))
            .close();
        w.open("StopCondition").open("StopConditionFormula").open("mtSUB");
        w.leaf("mtVAR", "t").leaf("mtCONST", self.sim_time);
        w.close().close().close();

        // Euclidean distance travelled: |x*x + y*y + z*z|
        w.open("FitnessFunction").open("mtABS").open("mtADD");
        for axis in ["x", "y", "z"] {
            w.open("mtMUL").leaf("mtVAR", axis).leaf("mtVAR", axis).close();
        }
        w.close().close().close();

        w.leaf("EnableTargetCloseness", 1);
        w.open("RecordHistory")
            .leaf("RecordStepSize", self.record_step_size)
            .leaf("RecordVoxel", flag(self.record_voxel))
            .leaf("RecordLink", flag(self.record_link))
            .leaf("RecordFixedVoxels", flag(self.record_fixed_voxels))
            .close();
        w.close();

        w.open("Environment");
        w.open("Thermal")
            .leaf("TempEnabled", flag(self.temp_enabled))
            .leaf("VaryTempEnabled", flag(self.vary_temp_enabled))
            .leaf("TempPeriod", self.temp_period)
            .leaf("TempAmplitude", self.temp_amplitude)
            .leaf("TempBase", self.temp_base)
            .close();
        w.open("Gravity")
            .leaf("GravEnabled", flag(self.grav_enabled))
            .leaf("GravAcc", self.grav_acc)
            .leaf("FloorEnabled", flag(self.floor_enabled))
            .close();
        w.close();

        w.open_with("VXC", &[("Version", "0.94")]);
        w.open("Lattice").leaf("Lattice_Dim", self.lattice_dim).close();

        w.open("Palette");
        for material in palette.iter() {
            let id = material.id.to_string();
            w.open_with("Material", &[("ID", id.as_str())]);
            w.leaf("Name", &material.name);
            let [r, g, b, a] = material.color;
            w.open("Display")
                .leaf("Red", r)
                .leaf("Green", g)
                .leaf("Blue", b)
                .leaf("Alpha", a)
                .close();
            w.open("Mechanical");
            for property in Property::ALL {
                w.leaf(property.tag(), material.get(property));
            }
            w.leaf("MaterialTempPhase", 0);
            w.close();
            w.close();
        }
        w.close();

        if let Some(env) = &self.environment {
            let dims = env.grid.dims();
            w.open_with("Structure", &[("Compression", "ASCII_READABLE")]);
            w.leaf("X_Voxels", dims.x)
                .leaf("Y_Voxels", dims.y)
                .leaf("Z_Voxels", dims.z)
                .leaf("X_OSpawn", env.spawn.x)
                .leaf("Y_OSpawn", env.spawn.y)
                .leaf("Z_OSpawn", env.spawn.z);
            w.open("Data");
            for z in 0..dims.z {
                w.leaf("Layer", encode_layer(&env.grid, z)?);
            }
            w.close().close();
        }

        Ok(w.finish())
    }

    /// Write `base.vxa` (or any other path) for the given palette
    pub fn write(&self, path: &Path, palette: &MaterialPalette) -> Result<(), SettingsError> {
        let xml = self.render_vxa(palette)?;
        std::fs::write(path, xml).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Builder for [`SimSettings`], starting from the defaults
#[derive(Debug, Clone, Default)]
pub struct SimSettingsBuilder {
    settings: SimSettings,
}

impl SimSettingsBuilder {
    pub fn heap_size(mut self, heap_size: f64) -> Self {
        self.settings.heap_size = heap_size;
        self
    }

    pub fn sim_time(mut self, seconds: f64) -> Self {
        self.settings.sim_time = seconds;
        self
    }

    pub fn record_step_size(mut self, steps: u32) -> Self {
        self.settings.record_step_size = steps;
        self
    }

    pub fn temperature(mut self, base: f64, amplitude: f64, period: f64) -> Self {
        self.settings.temp_base = base;
        self.settings.temp_amplitude = amplitude;
        self.settings.temp_period = period;
        self
    }

    pub fn gravity(mut self, acc: f64) -> Self {
        self.settings.grav_acc = acc;
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.settings.environment = Some(environment);
        self
    }

    pub fn build(self) -> SimSettings {
        self.settings
    }
}
