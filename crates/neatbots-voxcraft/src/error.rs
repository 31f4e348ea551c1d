//! Error types for the Voxcraft formats

use std::path::PathBuf;

use thiserror::Error;

use crate::materials::MaterialId;
use crate::voxels::{Dims, Point3};
use crate::xml::XmlError;

/// Rejected material requests
#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("expected {expected} material values, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("material value {index} is outside [0, 1]: {value}")]
    OutOfRange { index: usize, value: f64 },

    #[error("palette is full, material ids are limited to {max}")]
    Full { max: MaterialId },
}

/// Failures placing or serializing an organism
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("spawn point {spawn} with organism size {organism} exceeds environment {environment}")]
    SpawnOutOfBounds {
        spawn: Point3,
        organism: Dims,
        environment: Dims,
    },

    #[error("spawn region is occupied at {at}")]
    SpawnOccupied { at: Point3 },

    #[error("structure has no filled voxels")]
    EmptyStructure,

    #[error("material id {id} cannot be encoded (max {max})")]
    MaterialIdOverflow { id: MaterialId, max: MaterialId },

    #[error("invalid layer character {found:?}")]
    InvalidLayerChar { found: char },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reading or writing simulator settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("missing element {0}")]
    MissingElement(&'static str),

    #[error("invalid value {value:?} for {element}")]
    InvalidValue { element: String, value: String },

    #[error("structure data holds {got} voxels, expected {expected}")]
    StructureSize { expected: usize, got: usize },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Failures reading the simulator's result report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("result tag {0:?} does not follow <prefix>_<id>")]
    MalformedTag(String),

    #[error("invalid fitness {value:?} for {tag}")]
    InvalidFitness { tag: String, value: String },
}
