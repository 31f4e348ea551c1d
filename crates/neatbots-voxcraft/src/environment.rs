//! Pre-built environments loaded from an existing VXA file
//!
//! Only the parts the run needs are read: the palette, the structure and
//! the organism spawn point (`X_OSpawn`, `Y_OSpawn`, `Z_OSpawn`).

use std::path::Path;

use crate::encoder::decode_layer;
use crate::error::SettingsError;
use crate::materials::{simulator_defaults, MaterialDef, MaterialId, MaterialOrigin, Property};
use crate::voxels::{Dims, Point3, VoxelGrid};
use crate::xml::{path_ends_with, walk, XmlNode};

/// A static voxel space organisms are placed into
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub grid: VoxelGrid,
    pub spawn: Point3,
    /// Palette entries, ids 1..=n in document order
    pub materials: Vec<MaterialDef>,
}

#[derive(Default)]
struct RawMaterial {
    name: Option<String>,
    color: [Option<String>; 4],
    mechanical: Vec<(String, String)>,
}

#[derive(Default)]
struct RawStructure {
    voxels: [Option<String>; 3],
    spawn: [Option<String>; 3],
    layers: Vec<String>,
}

const AXES: [&str; 3] = ["X", "Y", "Z"];
const VOXEL_TAGS: [&str; 3] = ["X_Voxels", "Y_Voxels", "Z_Voxels"];
const SPAWN_TAGS: [&str; 3] = ["X_OSpawn", "Y_OSpawn", "Z_OSpawn"];
const COLOR_TAGS: [&str; 4] = ["Red", "Green", "Blue", "Alpha"];

fn parse_number(element: &str, text: &str) -> Result<f64, SettingsError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SettingsError::InvalidValue {
            element: element.to_string(),
            value: text.to_string(),
        })
}

/// Counts and coordinates are sometimes written as floats (`"4.0"`)
fn parse_count(element: &'static str, text: Option<&String>) -> Result<usize, SettingsError> {
    let text = text.ok_or(SettingsError::MissingElement(element))?;
    let value = parse_number(element, text)?;
    if value < 0.0 {
        return Err(SettingsError::InvalidValue {
            element: element.to_string(),
            value: text.clone(),
        });
    }
    Ok(value as usize)
}

impl Environment {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let xml = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let env = Self::parse(&xml)?;
        log::info!(
            "Loaded environment {} ({} materials, spawn {})",
            env.grid.dims(),
            env.materials.len(),
            env.spawn
        );
        Ok(env)
    }

    pub fn parse(xml: &str) -> Result<Self, SettingsError> {
        let mut materials: Vec<RawMaterial> = Vec::new();
        let mut structure = RawStructure::default();

        walk(xml, |node| match node {
            XmlNode::Open { path } => {
                if path_ends_with(path, &["Palette", "Material"]) {
                    materials.push(RawMaterial::default());
                } else if path_ends_with(path, &["Structure", "Data", "Layer"]) {
                    structure.layers.push(String::new());
                }
            }
            XmlNode::Text { path, text } => {
                let Some(leaf) = path.last().map(String::as_str) else {
                    return;
                };
                if path_ends_with(path, &["Structure", "Data", "Layer"]) {
                    if let Some(layer) = structure.layers.last_mut() {
                        layer.push_str(text);
                    }
                } else if path_ends_with(path, &["Structure", leaf]) {
                    if let Some(i) = VOXEL_TAGS.iter().position(|t| *t == leaf) {
                        structure.voxels[i] = Some(text.to_string());
                    } else if let Some(i) = SPAWN_TAGS.iter().position(|t| *t == leaf) {
                        structure.spawn[i] = Some(text.to_string());
                    }
                } else if let Some(material) = materials.last_mut() {
                    if path_ends_with(path, &["Material", "Name"]) {
                        material.name = Some(text.to_string());
                    } else if path_ends_with(path, &["Material", "Display", leaf]) {
                        if let Some(i) = COLOR_TAGS.iter().position(|t| *t == leaf) {
                            material.color[i] = Some(text.to_string());
                        }
                    } else if path_ends_with(path, &["Material", "Mechanical", leaf]) {
                        material.mechanical.push((leaf.to_string(), text.to_string()));
                    }
                }
            }
            XmlNode::Close => {}
        })?;

        let materials = materials
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Self::material(i as MaterialId + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let dims = Dims::new(
            parse_count(VOXEL_TAGS[0], structure.voxels[0].as_ref())?,
            parse_count(VOXEL_TAGS[1], structure.voxels[1].as_ref())?,
            parse_count(VOXEL_TAGS[2], structure.voxels[2].as_ref())?,
        );
        let spawn = Point3::new(
            parse_count(SPAWN_TAGS[0], structure.spawn[0].as_ref())?,
            parse_count(SPAWN_TAGS[1], structure.spawn[1].as_ref())?,
            parse_count(SPAWN_TAGS[2], structure.spawn[2].as_ref())?,
        );

        let mut cells = Vec::with_capacity(dims.volume());
        for layer in &structure.layers {
            cells.extend(decode_layer(layer)?);
        }
        let got = cells.len();
        let grid = VoxelGrid::from_cells(dims, cells).ok_or(SettingsError::StructureSize {
            expected: dims.volume(),
            got,
        })?;

        Ok(Self {
            grid,
            spawn,
            materials,
        })
    }

    fn material(id: MaterialId, raw: RawMaterial) -> Result<MaterialDef, SettingsError> {
        let mut properties = simulator_defaults();
        for (tag, text) in &raw.mechanical {
            if let Some(property) = Property::from_tag(tag) {
                properties[property as usize] = parse_number(tag, text)?;
            }
        }

        let mut color = [0.5, 0.5, 0.5, 1.0];
        for (channel, text) in color.iter_mut().zip(&raw.color) {
            if let Some(text) = text {
                *channel = parse_number("Display", text)?;
            }
        }

        Ok(MaterialDef {
            id,
            name: raw.name.unwrap_or_else(|| id.to_string()),
            origin: MaterialOrigin::Environment,
            properties,
            color,
        })
    }

    /// Axis names paired with the grid extent, for diagnostics
    pub fn describe(&self) -> String {
        let d = self.grid.dims();
        AXES.iter()
            .zip([d.x, d.y, d.z])
            .map(|(axis, n)| format!("{}={}", axis, n))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
