use crate::atoms::{SiteKind, Structure};
use crate::connectivity::{label_components, Connectivity};
use crate::grid::ScalarGrid;
use crate::voxel_map::VoxelMap;
use log::{debug, info};
use serde::Serialize;

/// Number of halvings used to refine each cutoff.
pub const BISECTION_STEPS: usize = 16;

/// Periodic dimensionality of the electride network.
///
/// > dimensionality: usize - dimensionality at the connection cutoff
/// > cutoffs: Vec<(usize, f64)> - highest ELF cutoff that keeps each
///   dimensionality from 1 up to `dimensionality`
/// > tested: Vec<(f64, usize)> - every cutoff tested and what it gave
#[derive(Clone, Debug, Serialize)]
pub struct DimensionalityResult {
    pub dimensionality: usize,
    pub cutoffs: Vec<(usize, f64)>,
    pub tested: Vec<(f64, usize)>,
}

/// Tests how the electride voxels of a voxel map connect through the cell.
pub struct ElectrideNetwork<'a> {
    elf: &'a ScalarGrid,
    /// voxels whose largest share belongs to an electride
    mask: Vec<bool>,
}

impl<'a> ElectrideNetwork<'a> {
    /// None when the structure holds no electrides.
    pub fn new(elf: &'a ScalarGrid,
               voxel_map: &VoxelMap,
               structure: &Structure)
               -> Option<Self> {
        if structure.num_electrides() == 0 {
            return None;
        }
        let mask = (0..voxel_map.grid.size.total).map(|p| {
                       voxel_map.majority_site(p)
                                .and_then(|s| structure.sites.get(s))
                                .map(|s| s.kind == SiteKind::Electride)
                                .unwrap_or(false)
                   })
                   .collect();
        Some(Self { elf, mask })
    }

    /// Dimensionality of the electride voxels with an ELF of at least
    /// `cutoff`.
    pub fn dimensionality_at(&self, cutoff: f64) -> usize {
        let mask = self.mask
                       .iter()
                       .zip(self.elf.data.iter())
                       .map(|(m, v)| *m && *v >= cutoff)
                       .collect::<Vec<bool>>();
        label_components(&self.elf.grid, &mask, Connectivity::Full).max_dimensionality()
    }

    /// The dimensionality at `connection_cutoff` and the highest cutoff
    /// keeping each lower dimensionality.
    pub fn analyse(&self, connection_cutoff: f64) -> DimensionalityResult {
        let mut tested = vec![];
        let mut test = |cutoff: f64| {
            let d = self.dimensionality_at(cutoff);
            debug!("Electride dimensionality {} at ELF {:.5}", d, cutoff);
            tested.push((cutoff, d));
            d
        };
        let dimensionality = test(connection_cutoff);
        let mut cutoffs = vec![];
        for target in 1..=dimensionality {
            let mut low = connection_cutoff;
            let mut high = 1.;
            for _ in 0..BISECTION_STEPS {
                let middle = (low + high) / 2.;
                if test(middle) >= target {
                    low = middle;
                } else {
                    high = middle;
                }
            }
            cutoffs.push((target, low));
        }
        info!("Electrides form a {}D network", dimensionality);
        DimensionalityResult { dimensionality,
                               cutoffs,
                               tested }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;
    use crate::grid::Grid;

    fn structure() -> Structure {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("E", [0.5, 0.5, 0.5]);
        structure
    }

    /// electride voxels along the line y = z = 4, ELF falling from 0.9 at
    /// x = 0 to 0.55 at x = 7
    fn setup() -> (ScalarGrid, VoxelMap) {
        let s = structure();
        let mut data = vec![0.1; 512];
        let mut voxel_map = VoxelMap::new(Grid::new([8, 8, 8], s.lattice.clone()), 2);
        for p in 0..512 {
            voxel_map.site_store(p, 0);
        }
        for x in 0..8 {
            let p = (x * 8 + 4) * 8 + 4;
            data[p] = 0.9 - 0.05 * x as f64;
            voxel_map.site_store(p, 1);
        }
        (ScalarGrid::new(data, [8, 8, 8], s).unwrap(), voxel_map)
    }

    #[test]
    fn dimensionality_no_electrides() {
        let (elf, voxel_map) = setup();
        let atoms = elf.structure.atoms_only();
        assert!(ElectrideNetwork::new(&elf, &voxel_map, &atoms).is_none());
    }

    #[test]
    fn dimensionality_chain() {
        let (elf, voxel_map) = setup();
        let network = ElectrideNetwork::new(&elf, &voxel_map, &elf.structure).unwrap();
        assert_eq!(network.dimensionality_at(0.), 1);
        assert_eq!(network.dimensionality_at(0.6), 0);
        let result = network.analyse(0.);
        assert_eq!(result.dimensionality, 1);
        assert_eq!(result.cutoffs.len(), 1);
        // the chain breaks once the weakest voxel, 0.55, drops out
        assert!((result.cutoffs[0].1 - 0.55).abs() < 1e-4);
        assert_eq!(result.tested.len(), 1 + BISECTION_STEPS);
    }
}
