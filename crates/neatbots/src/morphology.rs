//! Turning a morphology network into a voxel grid
//!
//! Every cell of the W×H×D organism space is queried once, x outermost and
//! z innermost, with the input `[x, y, z, d, 1.0]` where `d` is the distance
//! from the grid center and the last value is a bias.

use neatbots_genome::{Genome, PhenotypeNetwork};
use neatbots_voxcraft::materials::{simulator_defaults, PropertyVector, RAW_SLOTS};
use neatbots_voxcraft::{
    Dims, MaterialDef, MaterialId, MaterialPalette, Point3, Property, VoxelGrid, EMPTY,
};
use serde::{Deserialize, Serialize};

use crate::error::MorphologyError;

/// Number of values the builder feeds to a morphology network
pub const MORPHOLOGY_INPUTS: usize = 5;

/// How network outputs become materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialPolicy {
    /// One output per material slot, interned through the palette
    #[default]
    Properties,
    /// One output thresholded into empty, passive or active
    Classes,
}

impl MaterialPolicy {
    pub fn output_count(&self) -> usize {
        match self {
            MaterialPolicy::Properties => RAW_SLOTS,
            MaterialPolicy::Classes => 1,
        }
    }
}

fn preset(values: &[(Property, f64)]) -> PropertyVector {
    let mut v = simulator_defaults();
    for &(property, value) in values {
        v[property as usize] = value;
    }
    v
}

/// Stiff, light tissue
pub fn passive_material() -> PropertyVector {
    preset(&[(Property::ElasticMod, 1e9), (Property::Density, 1e3)])
}

/// Soft, dense tissue that expands with temperature
pub fn active_material() -> PropertyVector {
    preset(&[
        (Property::ElasticMod, 1e7),
        (Property::Density, 1e6),
        (Property::Cte, 0.01),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct MorphologyBuilder {
    dims: Dims,
    policy: MaterialPolicy,
    diff_thresh: f64,
}

impl MorphologyBuilder {
    pub fn new(dims: Dims, policy: MaterialPolicy, diff_thresh: f64) -> Self {
        Self {
            dims,
            policy,
            diff_thresh,
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn policy(&self) -> MaterialPolicy {
        self.policy
    }

    /// Network input for one cell
    pub fn inputs(&self, p: Point3) -> [f32; MORPHOLOGY_INPUTS] {
        let center = |n: usize| n as f64 / 2.0;
        let dx = center(self.dims.x) - p.x as f64;
        let dy = center(self.dims.y) - p.y as f64;
        let dz = center(self.dims.z) - p.z as f64;
        let d = (dx * dx + dy * dy + dz * dz).sqrt();
        [p.x as f32, p.y as f32, p.z as f32, d as f32, 1.0]
    }

    /// Build the phenotype of `genome` and synthesize its grid
    pub fn generate<G: Genome>(
        &self,
        genome: &G,
        palette: &mut MaterialPalette,
    ) -> Result<VoxelGrid, MorphologyError> {
        self.generate_with(&genome.build_phenotype(), palette)
    }

    /// Synthesize a grid from an already built network
    pub fn generate_with<N: PhenotypeNetwork>(
        &self,
        network: &N,
        palette: &mut MaterialPalette,
    ) -> Result<VoxelGrid, MorphologyError> {
        let expected = self.policy.output_count();
        if network.output_count() != expected {
            return Err(MorphologyError::OutputCount {
                expected,
                got: network.output_count(),
            });
        }

        let mut grid = VoxelGrid::new(self.dims);
        for x in 0..self.dims.x {
            for y in 0..self.dims.y {
                for z in 0..self.dims.z {
                    let p = Point3::new(x, y, z);
                    let outputs = network.query(&self.inputs(p));
                    let id = self.material_for(&outputs, p, palette)?;
                    grid.set(p, id);
                }
            }
        }

        log::debug!(
            "Generated {} organism: {}/{} voxels filled, palette {}",
            self.dims,
            grid.filled_count(),
            self.dims.volume(),
            palette.len()
        );
        Ok(grid)
    }

    fn material_for(
        &self,
        outputs: &[f32],
        at: Point3,
        palette: &mut MaterialPalette,
    ) -> Result<MaterialId, MorphologyError> {
        if outputs.len() != self.policy.output_count() {
            return Err(MorphologyError::OutputCount {
                expected: self.policy.output_count(),
                got: outputs.len(),
            });
        }
        if let Some((index, &value)) = outputs
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || !(0.0..=1.0).contains(*v))
        {
            return Err(MorphologyError::InvalidOutput { index, value, at });
        }

        match self.policy {
            MaterialPolicy::Properties => {
                let raw: Vec<f64> = outputs.iter().map(|&v| f64::from(v)).collect();
                Ok(palette.add_material(&raw, self.diff_thresh)?)
            }
            MaterialPolicy::Classes => {
                let v = outputs[0];
                let properties = if v < 1.0 / 3.0 {
                    return Ok(EMPTY);
                } else if v <= 2.0 / 3.0 {
                    passive_material()
                } else {
                    active_material()
                };
                Ok(palette.intern(properties, 0.0)?)
            }
        }
    }
}

/// Palette entries referenced by a grid, for diagnostics
pub fn materials_used<'a>(grid: &VoxelGrid, palette: &'a MaterialPalette) -> Vec<&'a MaterialDef> {
    let mut ids: Vec<MaterialId> = grid.cells().iter().copied().filter(|&id| id != EMPTY).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter().filter_map(|id| palette.get(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use neatbots_voxcraft::materials::MAX_MATERIAL_ID;

    /// Network answering from a closure over the input vector
    struct FnNetwork<F> {
        outputs: usize,
        f: F,
    }

    impl<F: Fn(&[f32]) -> Vec<f32>> PhenotypeNetwork for FnNetwork<F> {
        fn input_count(&self) -> usize {
            MORPHOLOGY_INPUTS
        }

        fn output_count(&self) -> usize {
            self.outputs
        }

        fn query(&self, inputs: &[f32]) -> Vec<f32> {
            (self.f)(inputs)
        }
    }

    fn solid(value: f32) -> Vec<f32> {
        let mut v = vec![value; RAW_SLOTS];
        v[0] = 0.0;
        v
    }

    #[test]
    fn test_inputs() {
        let builder = MorphologyBuilder::new(Dims::new(4, 4, 4), MaterialPolicy::Properties, 15.0);
        assert_eq!(builder.inputs(Point3::new(2, 2, 2)), [2.0, 2.0, 2.0, 0.0, 1.0]);
        let corner = builder.inputs(Point3::ORIGIN);
        assert!((corner[3] - 12f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_iteration_order_is_x_outermost() {
        let builder = MorphologyBuilder::new(Dims::new(2, 2, 2), MaterialPolicy::Properties, 15.0);
        let visited = std::cell::RefCell::new(Vec::new());
        let network = FnNetwork {
            outputs: RAW_SLOTS,
            f: |i: &[f32]| {
                visited.borrow_mut().push((i[0], i[1], i[2]));
                solid(0.5)
            },
        };
        builder
            .generate_with(&network, &mut MaterialPalette::new())
            .unwrap();
        let visited = visited.borrow();
        assert_eq!(visited[0], (0.0, 0.0, 0.0));
        assert_eq!(visited[1], (0.0, 0.0, 1.0));
        assert_eq!(visited[2], (0.0, 1.0, 0.0));
        assert_eq!(visited[4], (1.0, 0.0, 0.0));
    }

    #[test]
    fn test_uniform_network_shares_one_material() {
        let builder = MorphologyBuilder::new(Dims::new(3, 3, 3), MaterialPolicy::Properties, 15.0);
        let network = FnNetwork {
            outputs: RAW_SLOTS,
            f: |_: &[f32]| solid(0.5),
        };
        let mut palette = MaterialPalette::new();
        let grid = builder.generate_with(&network, &mut palette).unwrap();
        assert_eq!(grid.filled_count(), 27);
        assert_eq!(palette.len(), 1);
        assert_eq!(materials_used(&grid, &palette).len(), 1);
    }

    #[test]
    fn test_organism_after_palette_fills_still_builds() {
        let builder = MorphologyBuilder::new(Dims::new(2, 2, 2), MaterialPolicy::Properties, 0.0);
        let mut palette = MaterialPalette::new();
        for i in 0..MAX_MATERIAL_ID {
            let value = i as f32 / MAX_MATERIAL_ID as f32;
            let network = FnNetwork {
                outputs: RAW_SLOTS,
                f: move |_: &[f32]| solid(value),
            };
            builder.generate_with(&network, &mut palette).unwrap();
        }
        assert_eq!(palette.len(), MAX_MATERIAL_ID as usize);

        let late = FnNetwork {
            outputs: RAW_SLOTS,
            f: |_: &[f32]| solid(0.999),
        };
        let grid = builder.generate_with(&late, &mut palette).unwrap();
        assert_eq!(grid.filled_count(), 8);
        assert_eq!(palette.len(), MAX_MATERIAL_ID as usize);
        assert_eq!(materials_used(&grid, &palette)[0].id, MAX_MATERIAL_ID);
    }

    #[test]
    fn test_empty_flag_leaves_holes() {
        let builder = MorphologyBuilder::new(Dims::new(2, 1, 1), MaterialPolicy::Properties, 15.0);
        let network = FnNetwork {
            outputs: RAW_SLOTS,
            f: |i: &[f32]| {
                let mut v = solid(0.2);
                v[0] = if i[0] > 0.5 { 0.9 } else { 0.1 };
                v
            },
        };
        let grid = builder
            .generate_with(&network, &mut MaterialPalette::new())
            .unwrap();
        assert_eq!(grid.cells(), &[1, EMPTY]);
    }

    #[test]
    fn test_out_of_range_output_is_an_error() {
        let builder = MorphologyBuilder::new(Dims::new(1, 1, 1), MaterialPolicy::Properties, 15.0);
        let network = FnNetwork {
            outputs: RAW_SLOTS,
            f: |_: &[f32]| {
                let mut v = solid(0.5);
                v[3] = 1.2;
                v
            },
        };
        match builder.generate_with(&network, &mut MaterialPalette::new()) {
            Err(MorphologyError::InvalidOutput { index, at, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(at, Point3::ORIGIN);
            }
            other => panic!("expected InvalidOutput, got {:?}", other),
        }

        let nan = FnNetwork {
            outputs: RAW_SLOTS,
            f: |_: &[f32]| vec![f32::NAN; RAW_SLOTS],
        };
        assert!(builder
            .generate_with(&nan, &mut MaterialPalette::new())
            .is_err());
    }

    #[test]
    fn test_wrong_output_count() {
        let builder = MorphologyBuilder::new(Dims::new(1, 1, 1), MaterialPolicy::Properties, 15.0);
        let network = FnNetwork {
            outputs: 4,
            f: |_: &[f32]| vec![0.5; 4],
        };
        assert!(matches!(
            builder.generate_with(&network, &mut MaterialPalette::new()),
            Err(MorphologyError::OutputCount {
                expected: 19,
                got: 4
            })
        ));
    }

    #[test]
    fn test_class_thresholds() {
        let builder = MorphologyBuilder::new(Dims::new(3, 1, 1), MaterialPolicy::Classes, 0.0);
        let network = FnNetwork {
            outputs: 1,
            f: |i: &[f32]| vec![[0.1, 0.5, 0.9][i[0] as usize]],
        };
        let mut palette = MaterialPalette::new();
        let grid = builder.generate_with(&network, &mut palette).unwrap();

        assert_eq!(grid.cells(), &[EMPTY, 1, 2]);
        assert_eq!(palette.get(1).unwrap().get(Property::ElasticMod), 1e9);
        assert_eq!(palette.get(2).unwrap().get(Property::Cte), 0.01);
    }

    #[test]
    fn test_class_boundaries_are_inclusive_for_passive() {
        let builder = MorphologyBuilder::new(Dims::new(1, 1, 1), MaterialPolicy::Classes, 0.0);
        let mut palette = MaterialPalette::new();
        let at = |v: f32, palette: &mut MaterialPalette| {
            builder.material_for(&[v], Point3::ORIGIN, palette).unwrap()
        };
        assert_eq!(at(0.33, &mut palette), EMPTY);
        assert_eq!(at(2.0 / 3.0, &mut palette), 1);
        assert_eq!(at(0.67, &mut palette), 2);
        assert_eq!(at(1.0 / 3.0, &mut palette), 1);
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: MaterialPolicy = serde_json::from_str("\"classes\"").unwrap();
        assert_eq!(policy, MaterialPolicy::Classes);
        assert_eq!(MaterialPolicy::default().output_count(), 19);
    }
}
