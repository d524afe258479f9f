use crate::atoms::Structure;
use crate::grid::ScalarGrid;
use crate::progress::Bar;

/// Zero-flux basins of a scalar field.
///
/// > labels: Vec<isize> - basin of each voxel, -1 for vacuum
/// > maxima: Vec<usize> - voxel index of the maximum of each basin
/// > maxima_frac: Vec<[f64; 3]> - fractional position of each maximum
/// > nearest_atom: Vec<usize> - the atom nearest each maximum
/// > atom_distance: Vec<f64> - distance from each maximum to that atom
#[derive(Clone, Debug)]
pub struct BasinMap {
    pub labels: Vec<isize>,
    pub maxima: Vec<usize>,
    pub maxima_frac: Vec<[f64; 3]>,
    pub nearest_atom: Vec<usize>,
    pub atom_distance: Vec<f64>,
}

impl BasinMap {
    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    /// Sums a field over each basin, returning the basin sums and the vacuum.
    pub fn integrate(&self, grid: &ScalarGrid) -> (Vec<f64>, f64) {
        let dv = grid.grid.voxel_volume();
        let mut sums = vec![0f64; self.maxima.len()];
        let mut vacuum = 0f64;
        for (label, value) in self.labels.iter().zip(grid.data.iter()) {
            match *label {
                -1 => vacuum += value * dv,
                b => sums[b as usize] += value * dv,
            }
        }
        (sums, vacuum)
    }

    /// Volume of each basin.
    pub fn volumes(&self, grid: &ScalarGrid) -> Vec<f64> {
        let dv = grid.grid.voxel_volume();
        let mut volumes = vec![0f64; self.maxima.len()];
        for label in self.labels.iter() {
            if *label >= 0 {
                volumes[*label as usize] += dv;
            }
        }
        volumes
    }
}

/// Steps in the grid, from point p, along the steepest ascent. Returns None
/// when p is a maximum.
pub fn ongrid_step(p: usize, grid: &ScalarGrid) -> Option<usize> {
    let control = grid[p];
    let mut max_val = 0f64;
    let mut pn = None;
    for (pt, (_, distance)) in grid.grid
                                   .full_shift(p)
                                   .iter()
                                   .zip(grid.grid.neighbours().iter())
    {
        let rho = (grid[*pt] - control) / distance;
        if rho > max_val {
            max_val = rho;
            pn = Some(*pt);
        }
    }
    pn
}

/// Assigns every voxel to the basin of the maximum its steepest ascent path
/// reaches.
///
/// Voxels are visited from highest to lowest value, ties broken by index, so
/// the ascent neighbour of a voxel is always labelled before the voxel itself.
/// A voxel with no higher neighbour joins an equal valued neighbour that has
/// already been visited, merging flat tops into a single basin.
pub fn zero_flux_basins(grid: &ScalarGrid,
                        vacuum_tolerance: Option<f64>,
                        progress_bar: Bar)
                        -> BasinMap {
    let total = grid.grid.size.total;
    let mut index = (0..total).collect::<Vec<usize>>();
    index.sort_unstable_by(|a, b| {
                             grid[*b].total_cmp(&grid[*a]).then(a.cmp(b))
                         });
    let mut order = vec![0usize; total];
    for (i, p) in index.iter().enumerate() {
        order[*p] = i;
    }
    let mut labels = vec![-1isize; total];
    let mut maxima = vec![];
    for p in index.iter().copied() {
        progress_bar.tick();
        if let Some(tol) = vacuum_tolerance {
            if grid[p] <= tol {
                continue;
            }
        }
        labels[p] = match ongrid_step(p, grid) {
            Some(pn) => labels[pn],
            None => {
                let plateau = grid.grid.full_shift(p).into_iter().find(|pt| {
                                  grid[*pt] == grid[p] && order[*pt] < order[p]
                              });
                match plateau {
                    Some(pt) => labels[pt],
                    None => {
                        maxima.push(p);
                        maxima.len() as isize - 1
                    }
                }
            }
        };
    }
    let (nearest_atom, atom_distance) =
        assign_maxima(&maxima, grid, &grid.structure);
    let maxima_frac = maxima.iter()
                            .map(|p| grid.grid.to_fractional(*p))
                            .collect();
    BasinMap { labels,
               maxima,
               maxima_frac,
               nearest_atom,
               atom_distance }
}

/// assigns maxima to their nearest atom
pub fn assign_maxima(maxima: &[usize],
                     grid: &ScalarGrid,
                     structure: &Structure)
                     -> (Vec<usize>, Vec<f64>) {
    maxima.iter()
          .map(|p| {
              structure.nearest_atom(grid.grid.to_fractional(*p))
                       .unwrap_or((0, f64::INFINITY))
          })
          .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    fn two_peaks() -> ScalarGrid {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice.clone(), vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("Cl", [0.5, 0.5, 0.5]);
        let shape = [8, 8, 8];
        let grid = crate::grid::Grid::new(shape, lattice.clone());
        let data = (0..grid.size.total).map(|p| {
                                           let f = grid.to_fractional(p);
                                           let d0 = lattice.distance(f, [0.; 3]);
                                           let d1 = lattice.distance(f, [0.5; 3]);
                                           (-d0 * d0).exp() + 0.8 * (-d1 * d1).exp()
                                       })
                                       .collect();
        ScalarGrid::new(data, shape, structure).unwrap()
    }

    #[test]
    fn methods_ongrid_step() {
        let grid = two_peaks();
        assert_eq!(ongrid_step(0, &grid), None);
        assert_eq!(ongrid_step(grid.grid.to_1d([1, 0, 0]), &grid), Some(0));
    }

    #[test]
    fn methods_zero_flux_basins() {
        let grid = two_peaks();
        let map = zero_flux_basins(&grid, None, Bar::hidden(512));
        assert_eq!(map.len(), 2);
        assert_eq!(map.maxima[0], 0);
        assert_eq!(map.nearest_atom, vec![0, 1]);
        assert!(map.atom_distance.iter().all(|d| *d < 1e-12));
        assert!(map.labels.iter().all(|l| *l >= 0));
        let (sums, vacuum) = map.integrate(&grid);
        assert_eq!(vacuum, 0.);
        assert!((sums.iter().sum::<f64>() - grid.total()).abs() < 1e-9);
    }

    #[test]
    fn methods_zero_flux_vacuum() {
        let grid = two_peaks();
        let map = zero_flux_basins(&grid, Some(0.1), Bar::hidden(512));
        assert!(map.labels.iter().any(|l| *l == -1));
        let volumes = map.volumes(&grid);
        assert!(volumes.iter().sum::<f64>() < grid.structure.lattice.volume);
    }

    #[test]
    fn methods_plateau_is_one_basin() {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        let mut data = vec![0.; 64];
        data[0] = 1.;
        data[1] = 1.;
        let grid = ScalarGrid::new(data, [4, 4, 4], structure).unwrap();
        let map = zero_flux_basins(&grid, Some(0.5), Bar::hidden(64));
        assert_eq!(map.len(), 1);
        assert_eq!(map.labels[1], 0);
    }
}
