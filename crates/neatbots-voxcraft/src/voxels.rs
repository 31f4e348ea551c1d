//! Dense voxel grids of material ids

use serde::{Deserialize, Serialize};

use crate::materials::{MaterialId, EMPTY};

/// Grid extent along each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dims {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Dims {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn volume(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn contains(&self, p: Point3) -> bool {
        p.x < self.x && p.y < self.y && p.z < self.z
    }
}

impl std::fmt::Display for Dims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

impl std::str::FromStr for Dims {
    type Err = String;

    /// Parse `WxHxD`, e.g. `4x4x3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(['x', 'X']).map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("Invalid dimensions '{}', expected WxHxD", s));
        }
        let mut values = [0usize; 3];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| format!("Invalid dimension '{}' in '{}'", part, s))?;
            if *value == 0 {
                return Err(format!("Dimensions must be positive, got '{}'", s));
            }
        }
        Ok(Self::new(values[0], values[1], values[2]))
    }
}

/// Integer voxel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 { x: 0, y: 0, z: 0 };

    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A W×H×D block of material ids, 0 meaning empty space.
///
/// Cells are stored with x varying fastest, then y, then z, which is the
/// order the simulator reads layers in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelGrid {
    dims: Dims,
    cells: Vec<MaterialId>,
}

impl VoxelGrid {
    /// Empty grid of the given size
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            cells: vec![EMPTY; dims.volume()],
        }
    }

    /// Build a grid from cells in x-fastest order. Returns `None` if the
    /// cell count does not match the dimensions.
    pub fn from_cells(dims: Dims, cells: Vec<MaterialId>) -> Option<Self> {
        (cells.len() == dims.volume()).then_some(Self { dims, cells })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn cells(&self) -> &[MaterialId] {
        &self.cells
    }

    fn index(&self, p: Point3) -> usize {
        p.x + p.y * self.dims.x + p.z * self.dims.x * self.dims.y
    }

    pub fn get(&self, p: Point3) -> Option<MaterialId> {
        self.dims.contains(p).then(|| self.cells[self.index(p)])
    }

    /// Set a cell. Panics if `p` lies outside the grid.
    pub fn set(&mut self, p: Point3, id: MaterialId) {
        assert!(
            self.dims.contains(p),
            "voxel {} outside grid {}",
            p,
            self.dims
        );
        let idx = self.index(p);
        self.cells[idx] = id;
    }

    /// Cells of one z layer, x fastest
    pub fn layer(&self, z: usize) -> &[MaterialId] {
        let area = self.dims.x * self.dims.y;
        &self.cells[z * area..(z + 1) * area]
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|&id| id == EMPTY)
    }

    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|&&id| id != EMPTY).count()
    }

    /// Whether the region starting at `origin` with extent `dims` holds only
    /// empty cells. The region must lie inside the grid.
    pub fn region_is_empty(&self, origin: Point3, dims: Dims) -> bool {
        self.first_filled_in(origin, dims).is_none()
    }

    /// First non-empty cell inside a region, in x-fastest order
    pub fn first_filled_in(&self, origin: Point3, dims: Dims) -> Option<Point3> {
        for z in origin.z..origin.z + dims.z {
            for y in origin.y..origin.y + dims.y {
                for x in origin.x..origin.x + dims.x {
                    let p = Point3::new(x, y, z);
                    if self.get(p).is_some_and(|id| id != EMPTY) {
                        return Some(p);
                    }
                }
            }
        }
        None
    }

    /// Copy `other` into this grid with its origin at `origin`
    pub fn paste(&mut self, origin: Point3, other: &VoxelGrid) {
        let d = other.dims;
        for z in 0..d.z {
            for y in 0..d.y {
                for x in 0..d.x {
                    let id = other.cells[other.index(Point3::new(x, y, z))];
                    self.set(Point3::new(origin.x + x, origin.y + y, origin.z + z), id);
                }
            }
        }
    }

    /// Smallest axis-aligned box containing every non-empty cell, as
    /// `(min corner, extent)`
    pub fn bounding_box(&self) -> Option<(Point3, Dims)> {
        let mut min = Point3::new(usize::MAX, usize::MAX, usize::MAX);
        let mut max = Point3::ORIGIN;
        let mut found = false;

        for (p, id) in self.iter() {
            if id == EMPTY {
                continue;
            }
            found = true;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        found.then(|| {
            (
                min,
                Dims::new(max.x - min.x + 1, max.y - min.y + 1, max.z - min.z + 1),
            )
        })
    }

    /// Extract a sub-grid
    pub fn extract(&self, origin: Point3, dims: Dims) -> VoxelGrid {
        let mut out = VoxelGrid::new(dims);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let src = Point3::new(origin.x + x, origin.y + y, origin.z + z);
                    let idx = out.index(Point3::new(x, y, z));
                    out.cells[idx] = self.get(src).unwrap_or(EMPTY);
                }
            }
        }
        out
    }

    /// Crop to the bounding box of non-empty cells; `None` when the grid is empty
    pub fn cropped(&self) -> Option<VoxelGrid> {
        self.bounding_box()
            .map(|(origin, dims)| self.extract(origin, dims))
    }

    /// All cells with their coordinates, x fastest
    pub fn iter(&self) -> impl Iterator<Item = (Point3, MaterialId)> + '_ {
        let (w, h) = (self.dims.x, self.dims.y);
        self.cells.iter().enumerate().map(move |(i, &id)| {
            let x = i % w;
            let y = (i / w) % h;
            let z = i / (w * h);
            (Point3::new(x, y, z), id)
        })
    }

    /// Largest material id referenced by the grid
    pub fn max_id(&self) -> MaterialId {
        self.cells.iter().copied().max().unwrap_or(EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_parse() {
        assert_eq!("4x5x6".parse::<Dims>().unwrap(), Dims::new(4, 5, 6));
        assert_eq!(" 1 X 1 X 1".parse::<Dims>().unwrap(), Dims::new(1, 1, 1));
        assert!("4x5".parse::<Dims>().is_err());
        assert!("0x1x1".parse::<Dims>().is_err());
        assert!("ax1x1".parse::<Dims>().is_err());
    }

    #[test]
    fn test_layout_is_x_fastest() {
        let mut grid = VoxelGrid::new(Dims::new(2, 2, 2));
        grid.set(Point3::new(1, 0, 0), 1);
        grid.set(Point3::new(0, 1, 0), 2);
        grid.set(Point3::new(0, 0, 1), 3);

        assert_eq!(grid.cells(), &[0, 1, 2, 0, 3, 0, 0, 0]);
        assert_eq!(grid.layer(1), &[3, 0, 0, 0]);
    }

    #[test]
    fn test_iter_matches_get() {
        let mut grid = VoxelGrid::new(Dims::new(3, 2, 4));
        grid.set(Point3::new(2, 1, 3), 7);
        for (p, id) in grid.iter() {
            assert_eq!(grid.get(p), Some(id));
        }
        assert_eq!(grid.iter().filter(|(_, id)| *id == 7).count(), 1);
    }

    #[test]
    fn test_single_voxel_crops_to_unit() {
        let mut grid = VoxelGrid::new(Dims::new(5, 5, 5));
        grid.set(Point3::new(2, 2, 2), 4);

        let cropped = grid.cropped().unwrap();
        assert_eq!(cropped.dims(), Dims::new(1, 1, 1));
        assert_eq!(cropped.cells(), &[4]);
    }

    #[test]
    fn test_bounding_box_spans_extremes() {
        let mut grid = VoxelGrid::new(Dims::new(6, 6, 6));
        grid.set(Point3::new(1, 4, 2), 1);
        grid.set(Point3::new(3, 2, 5), 2);

        let (origin, dims) = grid.bounding_box().unwrap();
        assert_eq!(origin, Point3::new(1, 2, 2));
        assert_eq!(dims, Dims::new(3, 3, 4));
        assert!(VoxelGrid::new(Dims::new(2, 2, 2)).bounding_box().is_none());
    }

    #[test]
    fn test_paste_and_region_checks() {
        let mut env = VoxelGrid::new(Dims::new(4, 4, 4));
        let organism = VoxelGrid::from_cells(Dims::new(2, 1, 1), vec![5, 6]).unwrap();

        assert!(env.region_is_empty(Point3::new(1, 1, 1), Dims::new(2, 1, 1)));
        env.paste(Point3::new(1, 1, 1), &organism);
        assert_eq!(env.get(Point3::new(1, 1, 1)), Some(5));
        assert_eq!(env.get(Point3::new(2, 1, 1)), Some(6));
        assert_eq!(
            env.first_filled_in(Point3::ORIGIN, Dims::new(4, 4, 4)),
            Some(Point3::new(1, 1, 1))
        );
        assert_eq!(env.filled_count(), 2);
        assert_eq!(env.max_id(), 6);
    }

    #[test]
    fn test_from_cells_checks_length() {
        assert!(VoxelGrid::from_cells(Dims::new(2, 2, 1), vec![0; 3]).is_none());
    }
}
