//! Organism placement and VXD encoding
//!
//! A VXD file overrides the structure of the shared `base.vxa`. The layout
//! must match what the simulator reads byte for byte:
//!
//! ```text
//! <VXD>
//!     <Structure replace="VXA.VXC.Structure" Compression="ASCII_READABLE">
//!         <X_Voxels>..</X_Voxels> <Y_Voxels>..</Y_Voxels> <Z_Voxels>..</Z_Voxels>
//!         <Data>
//!             <Layer>...</Layer>   one per z, x varies fastest inside a layer
//!         </Data>
//!     </Structure>
//!     <RecordStepSize replace="VXA.Simulator.RecordHistory.RecordStepSize">n</RecordStepSize>
//! </VXD>
//! ```
//!
//! Each voxel is a single character, `'0' + id`.

use std::path::Path;

use crate::error::EncodeError;
use crate::materials::{MaterialId, MAX_MATERIAL_ID};
use crate::voxels::{Point3, VoxelGrid};
use crate::xml::XmlWriter;

/// Encode one material id as its layer character
pub fn id_to_char(id: MaterialId) -> Result<char, EncodeError> {
    if id > MAX_MATERIAL_ID {
        return Err(EncodeError::MaterialIdOverflow {
            id,
            max: MAX_MATERIAL_ID,
        });
    }
    Ok(char::from(b'0' + id as u8))
}

/// Decode one layer character
pub fn char_to_id(c: char) -> Result<MaterialId, EncodeError> {
    let code = c as u32;
    if !(u32::from(b'0')..=u32::from(b'0') + u32::from(MAX_MATERIAL_ID)).contains(&code) {
        return Err(EncodeError::InvalidLayerChar { found: c });
    }
    Ok((code - u32::from(b'0')) as MaterialId)
}

/// Encode layer `z` of a grid, x fastest
pub fn encode_layer(grid: &VoxelGrid, z: usize) -> Result<String, EncodeError> {
    grid.layer(z).iter().map(|&id| id_to_char(id)).collect()
}

/// Decode layer text into ids
pub fn decode_layer(text: &str) -> Result<Vec<MaterialId>, EncodeError> {
    text.chars().map(char_to_id).collect()
}

/// Merge an organism into an environment at `spawn`.
///
/// The organism must fit inside the environment and the target region must
/// be empty; the environment itself is left untouched.
pub fn place(
    organism: &VoxelGrid,
    environment: &VoxelGrid,
    spawn: Point3,
) -> Result<VoxelGrid, EncodeError> {
    let (od, ed) = (organism.dims(), environment.dims());
    let fits = |origin: usize, size: usize, bound: usize| {
        origin.checked_add(size).is_some_and(|end| end <= bound)
    };
    if !(fits(spawn.x, od.x, ed.x) && fits(spawn.y, od.y, ed.y) && fits(spawn.z, od.z, ed.z)) {
        return Err(EncodeError::SpawnOutOfBounds {
            spawn,
            organism: od,
            environment: ed,
        });
    }
    if let Some(at) = environment.first_filled_in(spawn, od) {
        return Err(EncodeError::SpawnOccupied { at });
    }

    let mut merged = environment.clone();
    merged.paste(spawn, organism);
    Ok(merged)
}

/// A cropped structure ready to be written as a VXD file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vxd {
    pub structure: VoxelGrid,
    pub record_step_size: u32,
}

impl Vxd {
    /// Place (when an environment is given), crop to the filled bounding box
    /// and validate that every id is encodable
    pub fn encode(
        organism: &VoxelGrid,
        voxelspace: Option<(&VoxelGrid, Point3)>,
        record_step_size: u32,
    ) -> Result<Self, EncodeError> {
        let merged = match voxelspace {
            Some((environment, spawn)) => place(organism, environment, spawn)?,
            None => organism.clone(),
        };
        let structure = merged.cropped().ok_or(EncodeError::EmptyStructure)?;
        id_to_char(structure.max_id())?;
        Ok(Self {
            structure,
            record_step_size,
        })
    }

    pub fn layers(&self) -> Result<Vec<String>, EncodeError> {
        (0..self.structure.dims().z)
            .map(|z| encode_layer(&self.structure, z))
            .collect()
    }

    pub fn render(&self) -> Result<String, EncodeError> {
        let dims = self.structure.dims();
        let mut w = XmlWriter::new();
        w.open("VXD");
        w.open_with(
            "Structure",
            &[
                ("replace", "VXA.VXC.Structure"),
                ("Compression", "ASCII_READABLE"),
            ],
        );
        w.leaf("X_Voxels", dims.x)
            .leaf("Y_Voxels", dims.y)
            .leaf("Z_Voxels", dims.z);
        w.open("Data");
        for layer in self.layers()? {
            w.leaf("Layer", layer);
        }
        w.close().close();
        w.leaf_with(
            "RecordStepSize",
            &[("replace", "VXA.Simulator.RecordHistory.RecordStepSize")],
            self.record_step_size,
        );
        Ok(w.finish())
    }

    pub fn write(&self, path: &Path) -> Result<(), EncodeError> {
        let xml = self.render()?;
        std::fs::write(path, xml).map_err(|source| EncodeError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
