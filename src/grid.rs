use crate::atoms::{Lattice, Structure};
use crate::errors::{BadElfError, Result};
use crate::utils;
use serde::Serialize;
use std::ops::Index;
use std::str::FromStr;

/// Structure for managing movement around the periodic voxel grid.
///
/// Voxels are stored with z running fastest, p = (x * ny + y) * nz + z, and
/// voxel (x, y, z) sits at fractional coordinate (x / nx, y / ny, z / nz).
#[derive(Clone, Debug)]
pub struct Grid {
    /// The 3d size of the data.
    pub size: Size,
    /// The lattice of the cell the grid spans.
    pub lattice: Lattice,
    /// The lattice vectors divided by the grid size.
    pub voxel_lattice: [[f64; 3]; 3],
    /// The 26 neighbour offsets and the cartesian length of each step.
    neighbours: [([isize; 3], f64); 26],
}

impl Grid {
    /// Initialises a grid structure. Computes the voxel_lattice from the grid and lattice.
    pub fn new(grid: [usize; 3], lattice: Lattice) -> Self {
        let size = Size::new(grid[0], grid[1], grid[2]);
        let mut voxel_lattice = lattice.to_cartesian;
        for (v, n) in voxel_lattice.iter_mut().zip(grid.iter()) {
            for x in v.iter_mut() {
                *x /= *n as f64;
            }
        }
        let mut neighbours = [([0isize; 3], 0f64); 26];
        let mut i = 0;
        for x in -1..=1isize {
            for y in -1..=1isize {
                for z in -1..=1isize {
                    if x == 0 && y == 0 && z == 0 {
                        continue;
                    }
                    let step = utils::dot([x as f64, y as f64, z as f64],
                                          voxel_lattice);
                    neighbours[i] = ([x, y, z], utils::norm(step));
                    i += 1;
                }
            }
        }
        Self { size,
               lattice,
               voxel_lattice,
               neighbours }
    }

    /// The shape of the grid as [nx, ny, nz].
    pub fn shape(&self) -> [usize; 3] {
        [self.size.x as usize, self.size.y as usize, self.size.z as usize]
    }

    /// Converts a 1D index of the array into a 3D index
    pub fn to_3d(&self, p: usize) -> [isize; 3] {
        let p = p as isize;
        let x = p / (self.size.y * self.size.z);
        let y = (p / self.size.z).rem_euclid(self.size.y);
        let z = p.rem_euclid(self.size.z);
        [x, y, z]
    }

    /// Converts a possibly out of bounds 3D index into a 1D index, wrapping
    /// periodically.
    pub fn to_1d(&self, [x, y, z]: [isize; 3]) -> usize {
        let x = x.rem_euclid(self.size.x);
        let y = y.rem_euclid(self.size.y);
        let z = z.rem_euclid(self.size.z);
        ((x * self.size.y + y) * self.size.z + z) as usize
    }

    /// Moves from p by a 3D offset returning the new index and the cell
    /// boundary crossings made on the way.
    pub fn step(&self, p: usize, offset: [isize; 3]) -> (usize, [i32; 3]) {
        let [x, y, z] = self.to_3d(p);
        let target = [x + offset[0], y + offset[1], z + offset[2]];
        let size = [self.size.x, self.size.y, self.size.z];
        let mut image = [0i32; 3];
        for i in 0..3 {
            image[i] = target[i].div_euclid(size[i]) as i32;
        }
        (self.to_1d(target), image)
    }

    /// The 26 neighbour offsets and their cartesian lengths.
    pub fn neighbours(&self) -> &[([isize; 3], f64); 26] {
        &self.neighbours
    }

    /// Indices of the 26 surrounding voxels.
    pub fn full_shift(&self, p: usize) -> [usize; 26] {
        let [x, y, z] = self.to_3d(p);
        let mut out = [0usize; 26];
        for (out, (offset, _)) in out.iter_mut().zip(self.neighbours.iter()) {
            *out = self.to_1d([x + offset[0], y + offset[1], z + offset[2]]);
        }
        out
    }

    /// Fractional coordinates of voxel p.
    pub fn to_fractional(&self, p: usize) -> [f64; 3] {
        let [x, y, z] = self.to_3d(p);
        [x as f64 / self.size.x as f64,
         y as f64 / self.size.y as f64,
         z as f64 / self.size.z as f64]
    }

    /// Converts a point in the array to cartesian.
    pub fn to_cartesian(&self, p: usize) -> [f64; 3] {
        let [x, y, z] = self.to_3d(p);
        utils::dot([x as f64, y as f64, z as f64], self.voxel_lattice)
    }

    /// The voxel closest to a fractional coordinate.
    pub fn nearest_voxel(&self, frac: [f64; 3]) -> usize {
        self.to_1d([(frac[0] * self.size.x as f64).round() as isize,
                    (frac[1] * self.size.y as f64).round() as isize,
                    (frac[2] * self.size.z as f64).round() as isize])
    }

    /// Volume of a single voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.lattice.volume / self.size.total as f64
    }

    /// The shortest step between neighbouring voxels.
    pub fn min_step(&self) -> f64 {
        self.neighbours
            .iter()
            .fold(f64::INFINITY, |acc, (_, d)| acc.min(*d))
    }
}

/// Size of the density data in 3d
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    /// Number of voxels in the x-direction.
    pub x: isize,
    /// Number of voxels in the y-direction.
    pub y: isize,
    /// Number of voxels in the z-direction.
    pub z: isize,
    /// Total number of voxels.
    pub total: usize,
}

impl Size {
    /// The length of the flattened array for the density data in 3d
    fn new(x: usize, y: usize, z: usize) -> Self {
        if x < 2 || y < 2 || z < 2 {
            panic!("Grid must have at least 2 voxels along each axis!");
        }
        let x = x as isize;
        let y = y as isize;
        let z = z as isize;
        let total = match x.checked_mul(y) {
            Some(xy) => match xy.checked_mul(z) {
                Some(xyz) => xyz as usize,
                None => panic!("Grid size is too large!"),
            },
            None => panic!("Grid size is too large!"),
        };
        Self { x, y, z, total }
    }
}

/// How values between voxels are estimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// trilinear
    Linear,
    /// tricubic Catmull-Rom
    Cubic,
}

impl FromStr for Interpolation {
    type Err = BadElfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            _ => Err(BadElfError::InvalidSetting(format!("Unknown interpolation method: {}",
                                                         s))),
        }
    }
}

/// A periodic scalar field, ELF or charge density, and the structure it
/// belongs to.
#[derive(Clone, Debug)]
pub struct ScalarGrid {
    pub data: Vec<f64>,
    pub grid: Grid,
    pub structure: Structure,
}

impl Index<usize> for ScalarGrid {
    type Output = f64;

    fn index(&self, p: usize) -> &f64 {
        &self.data[p]
    }
}

impl ScalarGrid {
    /// Builds a scalar grid, the data must be ordered z fastest.
    pub fn new(data: Vec<f64>,
               shape: [usize; 3],
               structure: Structure)
               -> Result<Self> {
        let grid = Grid::new(shape, structure.lattice.clone());
        if data.len() != grid.size.total {
            return Err(BadElfError::GridMismatch(format!("{} values supplied for a {}x{}x{} grid",
                                                         data.len(),
                                                         shape[0],
                                                         shape[1],
                                                         shape[2])));
        }
        Ok(Self { data,
                  grid,
                  structure })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.grid.shape()
    }

    /// A copy of the grid with new data.
    pub fn with_data(&self, data: Vec<f64>) -> Result<Self> {
        Self::new(data, self.shape(), self.structure.clone())
    }

    /// Consumes the grid, replacing its structure.
    pub fn with_structure(mut self, structure: Structure) -> Self {
        self.structure = structure;
        self
    }

    /// Fails unless both grids have the same shape and lattice.
    pub fn check_compatible(&self, other: &ScalarGrid) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(BadElfError::GridMismatch(format!("shapes {:?} and {:?} differ",
                                                         self.shape(),
                                                         other.shape())));
        }
        if !self.structure
                .lattice
                .approx_eq(&other.structure.lattice, 1e-6)
        {
            return Err(BadElfError::GridMismatch(String::from("lattices differ")));
        }
        Ok(())
    }

    /// Integral of the field over the cell.
    pub fn total(&self) -> f64 {
        self.data.iter().sum::<f64>() * self.grid.voxel_volume()
    }

    pub fn max(&self) -> f64 {
        self.data.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b))
    }

    /// Value of the field at a fractional coordinate.
    pub fn interpolate(&self, frac: [f64; 3], method: Interpolation) -> f64 {
        let size = [self.grid.size.x, self.grid.size.y, self.grid.size.z];
        let mut base = [0isize; 3];
        let mut t = [0f64; 3];
        for i in 0..3 {
            let u = frac[i] * size[i] as f64;
            let f = u.floor();
            base[i] = f as isize;
            t[i] = u - f;
        }
        let value = |dx: isize, dy: isize, dz: isize| {
            self.data[self.grid.to_1d([base[0] + dx, base[1] + dy, base[2] + dz])]
        };
        match method {
            Interpolation::Linear => {
                let mut out = 0f64;
                for dx in 0..2 {
                    let wx = if dx == 0 { 1. - t[0] } else { t[0] };
                    for dy in 0..2 {
                        let wy = if dy == 0 { 1. - t[1] } else { t[1] };
                        for dz in 0..2 {
                            let wz = if dz == 0 { 1. - t[2] } else { t[2] };
                            out += wx * wy * wz * value(dx, dy, dz);
                        }
                    }
                }
                out
            }
            Interpolation::Cubic => {
                let mut plane = [[0f64; 4]; 4];
                for (i, dx) in (-1..=2).enumerate() {
                    for (j, dy) in (-1..=2).enumerate() {
                        let p = [value(dx, dy, -1),
                                 value(dx, dy, 0),
                                 value(dx, dy, 1),
                                 value(dx, dy, 2)];
                        plane[i][j] = catmull_rom(p, t[2]);
                    }
                }
                let mut line = [0f64; 4];
                for (l, p) in line.iter_mut().zip(plane.iter()) {
                    *l = catmull_rom(*p, t[1]);
                }
                catmull_rom(line, t[0])
            }
        }
    }

    /// Samples `n` evenly spaced values on the straight line from `start`
    /// to `end`, both included. The points are unwrapped fractional
    /// coordinates.
    pub fn sample_line(&self,
                       start: [f64; 3],
                       end: [f64; 3],
                       n: usize,
                       method: Interpolation)
                       -> Vec<f64> {
        let step = utils::scale(utils::sub(end, start),
                                1. / (n.max(2) - 1) as f64);
        (0..n).map(|i| {
                  self.interpolate(utils::add(start, utils::scale(step, i as f64)),
                                   method)
              })
              .collect()
    }

    /// Splits a total and magnetisation pair into the up and down channels.
    pub fn split_spin(&self,
                      magnetization: &ScalarGrid)
                      -> Result<(ScalarGrid, ScalarGrid)> {
        self.check_compatible(magnetization)?;
        let up = self.data
                     .iter()
                     .zip(magnetization.data.iter())
                     .map(|(t, m)| (t + m) / 2.)
                     .collect();
        let down = self.data
                       .iter()
                       .zip(magnetization.data.iter())
                       .map(|(t, m)| (t - m) / 2.)
                       .collect();
        Ok((self.with_data(up)?, self.with_data(down)?))
    }

    /// A copy where every voxel is scaled by its weight.
    pub fn masked(&self, weights: &[f64]) -> Result<ScalarGrid> {
        if weights.len() != self.data.len() {
            return Err(BadElfError::GridMismatch(String::from("mask length differs from the grid")));
        }
        self.with_data(self.data
                           .iter()
                           .zip(weights)
                           .map(|(d, w)| d * w)
                           .collect())
    }
}

/// One dimensional Catmull-Rom spline between p[1] and p[2].
fn catmull_rom(p: [f64; 4], t: f64) -> f64 {
    0.5 * (2. * p[1]
           + (-p[0] + p[2]) * t
           + (2. * p[0] - 5. * p[1] + 4. * p[2] - p[3]) * t.powi(2)
           + (-p[0] + 3. * p[1] - 3. * p[2] + p[3]) * t.powi(3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Structure;

    fn lattice() -> Lattice {
        Lattice::new([[3., 3., 0.], [-3., 3., 0.], [1., 1., 1.]]).unwrap()
    }

    fn ramp(shape: [usize; 3]) -> ScalarGrid {
        let structure =
            Structure::new(Lattice::new([[2., 0., 0.], [0., 2., 0.], [0., 0., 2.]]).unwrap(),
                           vec![]);
        let grid = Grid::new(shape, structure.lattice.clone());
        let data = (0..grid.size.total).map(|p| grid.to_3d(p)[0] as f64)
                                       .collect();
        ScalarGrid::new(data, shape, structure).unwrap()
    }

    #[test]
    fn grid_new() {
        let lattice = lattice();
        let volume = lattice.volume;
        let grid = Grid::new([4, 4, 4], lattice);
        assert!((grid.voxel_volume() - (volume / 64.0f64)).abs() < f64::EPSILON)
    }

    #[test]
    #[should_panic]
    fn grid_new_bad_grid() {
        let _ = Grid::new([1, 4, 4], lattice());
    }

    #[test]
    fn grid_to_3d() {
        let grid = Grid::new([3, 4, 5], lattice());
        assert_eq!(grid.to_3d(26), [1, 1, 1]);
        assert_eq!(grid.to_1d([1, 1, 1]), 26);
        assert_eq!(grid.to_1d([-2, 5, 6]), 26);
    }

    #[test]
    fn grid_full_shift() {
        let grid = Grid::new([3, 4, 5], lattice());
        let shift = [0, 1, 2, 5, 6, 7, 10, 11, 12, 20, 21, 22, 25, 27, 30, 31,
                     32, 40, 41, 42, 45, 46, 47, 50, 51, 52];
        assert_eq!(shift, grid.full_shift(26))
    }

    #[test]
    fn grid_step_image() {
        let grid = Grid::new([3, 4, 5], lattice());
        assert_eq!(grid.step(0, [-1, 0, 0]), (40, [-1, 0, 0]));
        assert_eq!(grid.step(4, [0, 0, 1]), (0, [0, 0, 1]));
        assert_eq!(grid.step(26, [1, 1, 1]), (52, [0, 0, 0]));
    }

    #[test]
    fn grid_min_step() {
        let structure_lattice =
            Lattice::new([[2., 0., 0.], [0., 4., 0.], [0., 0., 2.]]).unwrap();
        let grid = Grid::new([4, 4, 4], structure_lattice);
        assert!((grid.min_step() - 0.5).abs() < 1e-12)
    }

    #[test]
    #[should_panic]
    fn size_too_large() {
        let _ = Size::new(2100000, 2100000, 2100000);
    }

    #[test]
    fn scalar_grid_interpolate_linear() {
        let grid = ramp([4, 4, 4]);
        let v = grid.interpolate([0.125, 0.3, 0.9], Interpolation::Linear);
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn scalar_grid_interpolate_on_voxel() {
        let grid = ramp([4, 4, 4]);
        for method in [Interpolation::Linear, Interpolation::Cubic] {
            let v = grid.interpolate([0.5, 0.25, 0.], method);
            assert!((v - 2.).abs() < 1e-12);
        }
    }

    #[test]
    fn scalar_grid_sample_line() {
        let grid = ramp([4, 4, 4]);
        let line = grid.sample_line([0., 0., 0.],
                                    [0.5, 0., 0.],
                                    5,
                                    Interpolation::Linear);
        let expected = [0., 0.5, 1., 1.5, 2.];
        for (a, b) in line.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn scalar_grid_total() {
        let grid = ramp([4, 4, 4]);
        // mean of 0..4 is 1.5 over a volume of 8
        assert!((grid.total() - 12.).abs() < 1e-12)
    }

    #[test]
    fn scalar_grid_split_spin() {
        let total = ramp([2, 2, 2]);
        let magnetization = total.with_data(vec![1.; 8]).unwrap();
        let (up, down) = total.split_spin(&magnetization).unwrap();
        assert_eq!(up.data[0], 0.5);
        assert_eq!(down.data[7], 0.);
    }

    #[test]
    fn scalar_grid_incompatible() {
        let a = ramp([4, 4, 4]);
        let b = ramp([2, 4, 4]);
        assert!(a.check_compatible(&b).is_err())
    }

    #[test]
    fn interpolation_from_str() {
        assert_eq!("Cubic".parse::<Interpolation>().unwrap(),
                   Interpolation::Cubic);
        assert!("spline".parse::<Interpolation>().is_err());
    }
}
