//! Voxcraft file formats and the per-generation material palette
//!
//! - [`materials`]: material property mapping and the deduplicating palette
//! - [`voxels`]: dense voxel grids
//! - [`encoder`]: placement into an environment, cropping and VXD output
//! - [`settings`]: simulator settings and `base.vxa` output
//! - [`environment`]: pre-built environments read from a VXA
//! - [`report`] and [`stream`]: reading what the simulator produces

pub mod encoder;
pub mod environment;
pub mod error;
pub mod materials;
pub mod report;
pub mod settings;
pub mod stream;
pub mod voxels;
mod xml;

pub use encoder::Vxd;
pub use environment::Environment;
pub use error::{EncodeError, PaletteError, ReportError, SettingsError};
pub use materials::{MaterialDef, MaterialId, MaterialOrigin, MaterialPalette, Property, EMPTY};
pub use report::SimulationReport;
pub use settings::{SimSettings, SimSettingsBuilder};
pub use stream::{DemuxedOutput, HistoryBlock, StreamProtocol};
pub use voxels::{Dims, Point3, VoxelGrid};
pub use xml::XmlError;
