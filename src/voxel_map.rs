use crate::grid::Grid;

/// Describes the state of the voxel.
pub enum Voxel<'a> {
    /// Wholly owned by a single site.
    Site(usize),
    /// Split between sites, the fraction owned by each site summing to one.
    Boundary(&'a [f64]),
    /// A voxel beneath the vacuum tolerance and owned by no site.
    Vacuum,
}

/// The final map between voxels and the sites that own them.
///
/// Owned voxels store their site in `voxel_map`, vacuum stores -1 and
/// boundary voxels store -2 - i where i indexes their row in `weight_map`.
/// Every row of `weight_map` has one entry per site.
///
/// # Examples
/// ```
/// use badelf::atoms::Lattice;
/// use badelf::grid::Grid;
/// use badelf::voxel_map::{Voxel, VoxelMap};
///
/// let lattice = Lattice::new([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]).unwrap();
/// let mut voxel_map = VoxelMap::new(Grid::new([2, 2, 2], lattice), 2);
/// voxel_map.site_store(0, 1);
/// voxel_map.weight_store(1, vec![0.25, 0.75]);
/// assert!(matches!(voxel_map.voxel_get(0), Voxel::Site(1)));
/// assert!(matches!(voxel_map.voxel_get(2), Voxel::Vacuum));
/// ```
#[derive(Clone, Debug)]
pub struct VoxelMap {
    voxel_map: Vec<isize>,
    weight_map: Vec<Vec<f64>>,
    pub grid: Grid,
    /// number of sites in the map
    pub sites: usize,
}

impl VoxelMap {
    /// A map of `sites` sites where every voxel starts as vacuum.
    pub fn new(grid: Grid, sites: usize) -> Self {
        let voxel_map = vec![-1; grid.size.total];
        Self { voxel_map,
               weight_map: vec![],
               grid,
               sites }
    }

    /// Builds a map from a label per voxel, -1 for vacuum.
    pub fn from_labels(grid: Grid, sites: usize, labels: Vec<isize>) -> Self {
        Self { voxel_map: labels,
               weight_map: vec![],
               grid,
               sites }
    }

    /// Stores the site owning voxel p.
    pub fn site_store(&mut self, p: usize, site: usize) {
        self.voxel_map[p] = site as isize;
    }

    /// Stores the fraction of voxel p owned by each site.
    pub fn weight_store(&mut self, p: usize, weights: Vec<f64>) {
        self.voxel_map[p] = -2 - self.weight_map.len() as isize;
        self.weight_map.push(weights);
    }

    pub fn vacuum_store(&mut self, p: usize) {
        self.voxel_map[p] = -1;
    }

    /// Retrieves the state of voxel p.
    pub fn voxel_get(&self, p: usize) -> Voxel<'_> {
        match self.voxel_map[p] {
            -1 => Voxel::Vacuum,
            m if m >= 0 => Voxel::Site(m as usize),
            m => Voxel::Boundary(&self.weight_map[(-2 - m) as usize]),
        }
    }

    /// The site owning the largest share of voxel p.
    pub fn majority_site(&self, p: usize) -> Option<usize> {
        match self.voxel_get(p) {
            Voxel::Site(s) => Some(s),
            Voxel::Boundary(weights) => weights.iter()
                                               .enumerate()
                                               .max_by(|a, b| a.1.total_cmp(b.1))
                                               .map(|(s, _)| s),
            Voxel::Vacuum => None,
        }
    }

    /// How many voxels are boundary voxels?
    pub fn boundary_voxels(&self) -> usize {
        self.weight_map.len()
    }

    /// The fraction of voxel p owned by `site`.
    pub fn weight(&self, p: usize, site: usize) -> f64 {
        match self.voxel_get(p) {
            Voxel::Site(s) if s == site => 1.,
            Voxel::Boundary(weights) => weights.get(site).copied().unwrap_or(0.),
            _ => 0.,
        }
    }

    /// Whether voxel p is partly or wholly owned by a site other than
    /// `site`, or is a neighbour of one.
    pub fn is_surface(&self, p: usize, site: usize) -> bool {
        match self.voxel_get(p) {
            Voxel::Boundary(weights) => weights.get(site).map(|w| *w > 0.).unwrap_or(false),
            Voxel::Site(s) if s == site => {
                self.grid
                    .full_shift(p)
                    .iter()
                    .any(|pt| !matches!(self.voxel_get(*pt), Voxel::Site(n) if n == site))
            }
            _ => false,
        }
    }

    /// Extract the voxel map data.
    pub fn into_inner(self) -> (Vec<isize>, Vec<Vec<f64>>) {
        (self.voxel_map, self.weight_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    fn map() -> VoxelMap {
        let lattice =
            Lattice::new([[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]]).unwrap();
        VoxelMap::new(Grid::new([2, 5, 3], lattice), 2)
    }

    #[test]
    fn voxel_map_site_store() {
        let mut voxel_map = map();
        for p in 0..voxel_map.grid.size.total {
            voxel_map.site_store(p, p % 2);
        }
        assert!(matches!(voxel_map.voxel_get(0), Voxel::Site(0)));
        assert!(matches!(voxel_map.voxel_get(9), Voxel::Site(1)));
        assert_eq!(voxel_map.weight(9, 1), 1.);
        assert_eq!(voxel_map.weight(9, 0), 0.);
    }

    #[test]
    fn voxel_map_weight_store() {
        let mut voxel_map = map();
        voxel_map.weight_store(4, vec![0.3, 0.7]);
        voxel_map.weight_store(7, vec![1.0, 0.0]);
        assert_eq!(voxel_map.boundary_voxels(), 2);
        assert_eq!(voxel_map.majority_site(4), Some(1));
        assert_eq!(voxel_map.weight(7, 0), 1.0);
        match voxel_map.voxel_get(4) {
            Voxel::Boundary(w) => assert_eq!(w, &[0.3, 0.7]),
            _ => panic!("voxel 4 should be a boundary"),
        }
        let (labels, weights) = voxel_map.into_inner();
        assert_eq!(labels[4], -2);
        assert_eq!(labels[7], -3);
        assert_eq!(weights.len(), 2);
    }

    #[test]
    fn voxel_map_surface() {
        let mut voxel_map = map();
        for p in 0..voxel_map.grid.size.total {
            voxel_map.site_store(p, 0);
        }
        assert!(!voxel_map.is_surface(0, 0));
        voxel_map.site_store(1, 1);
        assert!(voxel_map.is_surface(0, 0));
        voxel_map.vacuum_store(1);
        assert_eq!(voxel_map.majority_site(1), None);
    }
}
