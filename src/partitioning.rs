use crate::atoms::{Neighbor, Site, SiteKind, Structure, COORDINATION_TOLERANCE};
use crate::errors::{BadElfError, Result};
use crate::grid::{Interpolation, ScalarGrid};
use crate::progress::Bar;
use crate::utils;
use log::{debug, info};

/// Number of points sampled along each partitioning line.
pub const LINE_POINTS: usize = 201;
/// Width of the Savitzky-Golay smoothing window.
pub const SMOOTHING_WINDOW: usize = 20;
/// Order of the Savitzky-Golay smoothing polynomial.
pub const SMOOTHING_ORDER: usize = 3;
/// Tolerance for a line to count as symmetric about its midpoint.
pub const SYMMETRY_TOLERANCE: f64 = 0.1;
/// Tolerance of the plane side tests.
pub const PLANE_TOLERANCE: f64 = 1e-6;
/// Initial number of neighbours used to bound a site.
pub const INITIAL_NEIGHBORS: usize = 26;
/// Neighbours added whenever the bounding polyhedron is open.
pub const NEIGHBOR_STEP: usize = 25;
/// Largest neighbour count tried before giving up on a site.
pub const MAX_NEIGHBORS: usize = 151;

/// Which side of a plane a point lies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Positive,
    Negative,
    Zero,
}

/// A plane through `point` with unit `normal`, both cartesian.
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub point: [f64; 3],
    pub normal: [f64; 3],
}

impl Plane {
    /// Builds a plane, normalising the normal.
    pub fn new(point: [f64; 3], normal: [f64; 3]) -> Self {
        let length = utils::norm(normal);
        Self { point,
               normal: utils::scale(normal, 1. / length) }
    }

    /// The plane as [a, b, c, d] with a x + b y + c z + d = 0.
    pub fn equation(&self) -> [f64; 4] {
        let [a, b, c] = self.normal;
        [a, b, c, -utils::vdot(self.normal, self.point)]
    }

    /// Signed distance of a cartesian point, positive along the normal.
    pub fn signed_distance(&self, x: [f64; 3]) -> f64 {
        utils::round12(utils::vdot(self.normal, utils::sub(x, self.point)))
    }

    pub fn side(&self, x: [f64; 3]) -> Side {
        let d = self.signed_distance(x);
        if d > PLANE_TOLERANCE {
            Side::Positive
        } else if d < -PLANE_TOLERANCE {
            Side::Negative
        } else {
            Side::Zero
        }
    }
}

/// A plane dividing a site from one of its neighbours at the ELF minimum
/// between them.
#[derive(Clone, Copy, Debug)]
pub struct DividingPlane {
    pub plane: Plane,
    pub neighbor: Neighbor,
    /// position of the minimum along the line, 0 at the site and 1 at the
    /// neighbour
    pub position: f64,
    /// ELF value at the minimum
    pub value: f64,
}

/// The convex cell bounding a single site.
#[derive(Clone, Debug)]
pub struct SiteCell {
    /// index of the site in the structure
    pub site: usize,
    /// the planes that contribute a vertex to the cell
    pub planes: Vec<DividingPlane>,
    /// cartesian vertices of the cell
    pub vertices: Vec<[f64; 3]>,
    /// distance from the site to its furthest vertex
    pub radius: f64,
}

/// The partitioning of every partition site.
#[derive(Clone, Debug)]
pub struct PartitioningResult {
    pub cells: Vec<SiteCell>,
}

impl PartitioningResult {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, site: usize) -> Option<&SiteCell> {
        self.cells.iter().find(|c| c.site == site)
    }
}

/// Indices of the local minima of a line.
///
/// An interior point is a minimum when v[i - 1] >= v[i] < v[i + 1]. The end
/// points only compare against their single neighbour.
pub fn find_minimum(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    if n < 2 {
        return vec![];
    }
    (0..n).filter(|i| match *i {
              0 => values[0] < values[1],
              i if i == n - 1 => values[n - 2] >= values[n - 1],
              i => values[i - 1] >= values[i] && values[i] < values[i + 1],
          })
          .collect()
}

/// Indices of the local maxima of a line, the mirror of [`find_minimum`].
pub fn find_maximum(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    if n < 2 {
        return vec![];
    }
    (0..n).filter(|i| match *i {
              0 => values[0] > values[1],
              i if i == n - 1 => values[n - 2] <= values[n - 1],
              i => values[i - 1] <= values[i] && values[i] > values[i + 1],
          })
          .collect()
}

/// Savitzky-Golay smoothing.
///
/// Each point is replaced by a least squares polynomial of `order` fitted to
/// the 2 * (window / 2) + 1 points centred on it. Near the ends the window is
/// shifted to stay inside the line.
pub fn savgol_smooth(values: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = values.len();
    let length = (2 * (window / 2) + 1).min(n);
    if length <= order {
        return values.to_vec();
    }
    let half = length / 2;
    (0..n).map(|i| {
              let start = i.saturating_sub(half).min(n - length);
              let x = (start..start + length).map(|j| j as f64 - i as f64)
                                             .collect::<Vec<f64>>();
              match utils::polyfit(&x, &values[start..start + length], order) {
                  Some(coefficients) => coefficients[0],
                  None => values[i],
              }
          })
          .collect()
}

/// Whether a line reads the same from either end within `tolerance`.
pub fn is_symmetric(values: &[f64], tolerance: f64) -> bool {
    values.iter()
          .zip(values.iter().rev())
          .all(|(a, b)| (a - b).abs() <= tolerance)
}

/// The minimum of a line between two sites as a fraction of the line, with
/// the value there.
///
/// Lines between identical species that are symmetric about their midpoint
/// always divide at 0.5. Otherwise the minimum nearest the midpoint is refined
/// with a quadratic over the 7 points around it. Returns None for lines too
/// short to have a minimum.
pub fn line_minimum_as_frac(values: &[f64],
                            same_species: bool)
                            -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let last = (n - 1) as f64;
    let centre = last / 2.;
    if same_species && is_symmetric(values, SYMMETRY_TOLERANCE) {
        let value = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.
        };
        return Some((0.5, value));
    }
    let minimum = find_minimum(values).into_iter().min_by(|a, b| {
                                          (*a as f64 - centre).abs()
                                                              .total_cmp(&(*b as f64 - centre).abs())
                                      })?;
    let length = 7.min(n);
    let start = minimum.saturating_sub(length / 2).min(n - length);
    let x = (start..start + length).map(|i| i as f64).collect::<Vec<f64>>();
    let refined = utils::polyfit(&x, &values[start..start + length], 2).and_then(|c| {
        if c[2] > 0. {
            let vertex = -c[1] / (2. * c[2]);
            (vertex >= start as f64 && vertex <= (start + length - 1) as f64)
                .then(|| (vertex, utils::polyval(&c, vertex)))
        } else {
            None
        }
    });
    let (position, value) = refined.unwrap_or((minimum as f64, values[minimum]));
    Some((position / last, value))
}

/// Whether a line between two atoms looks covalent or metallic.
///
/// The bond is delocalised when the extremum nearest the midpoint is a
/// maximum, or when the central minimum holds more than half the value of
/// the central maximum.
pub fn check_bond_for_covalency(values: &[f64]) -> bool {
    let centre = (values.len() as f64 - 1.) / 2.;
    let nearest = |indices: Vec<usize>| {
        indices.into_iter().min_by(|a, b| {
                               (*a as f64 - centre).abs()
                                                   .total_cmp(&(*b as f64 - centre).abs())
                           })
    };
    let minimum = match nearest(find_minimum(values)) {
        Some(i) => i,
        None => return true,
    };
    let maximum = match nearest(find_maximum(values)) {
        Some(i) => i,
        None => return false,
    };
    (maximum as f64 - centre).abs() < (minimum as f64 - centre).abs()
    || values[minimum] > 0.5 * values[maximum]
}

/// Whether a set of planes bounds a finite cell: the normals span space and
/// no direction runs along or behind every plane.
pub fn is_bounded(planes: &[Plane]) -> bool {
    let normals = planes.iter().map(|p| p.normal).collect::<Vec<[f64; 3]>>();
    let spans = normals.iter().enumerate().any(|(i, a)| {
                    normals.iter().enumerate().skip(i + 1).any(|(j, b)| {
                        normals.iter()
                               .skip(j + 1)
                               .any(|c| utils::vdot(utils::cross(*a, *b), *c).abs() > 1e-9)
                    })
                });
    if !spans {
        return false;
    }
    for (i, a) in normals.iter().enumerate() {
        for b in normals.iter().skip(i + 1) {
            let edge = utils::cross(*a, *b);
            if utils::norm(edge) < 1e-9 {
                continue;
            }
            for direction in [edge, utils::scale(edge, -1.)] {
                if normals.iter().all(|n| utils::vdot(*n, direction) <= 1e-9) {
                    return false;
                }
            }
        }
    }
    true
}

/// The planes contributing a vertex to the cell they bound, with the vertices.
///
/// Every triple of planes is intersected and the intersection kept when no
/// plane has it on its positive side. Parallel triples are skipped.
pub fn important_planes(planes: &[Plane]) -> (Vec<usize>, Vec<[f64; 3]>) {
    let n = planes.len();
    let mut important = vec![false; n];
    let mut vertices = vec![];
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (a, b, c) = (planes[i], planes[j], planes[k]);
                let m = [a.normal, b.normal, c.normal];
                let rhs = [utils::vdot(a.normal, a.point),
                           utils::vdot(b.normal, b.point),
                           utils::vdot(c.normal, c.point)];
                let vertex = match utils::solve_3x3(m, rhs) {
                    Some(v) => v,
                    None => continue,
                };
                if planes.iter().all(|p| p.side(vertex) != Side::Positive) {
                    important[i] = true;
                    important[j] = true;
                    important[k] = true;
                    vertices.push(vertex);
                }
            }
        }
    }
    ((0..n).filter(|i| important[*i]).collect(), vertices)
}

/// Builds the dividing planes around the partition sites of a structure.
pub struct PartitioningToolkit<'a> {
    elf: &'a ScalarGrid,
    structure: &'a Structure,
    /// indices of the sites that receive a cell
    sites: Vec<usize>,
    pub interpolation: Interpolation,
    pub verbose: bool,
}

impl<'a> PartitioningToolkit<'a> {
    /// Partitions between the sites of `structure` for which `filter` is
    /// true. The ELF grid only supplies values, its own structure is unused.
    pub fn new<F>(elf: &'a ScalarGrid,
                  structure: &'a Structure,
                  filter: F,
                  interpolation: Interpolation)
                  -> Self
        where F: Fn(&Site) -> bool
    {
        let sites = structure.sites
                             .iter()
                             .enumerate()
                             .filter(|(_, s)| filter(s))
                             .map(|(i, _)| i)
                             .collect();
        Self { elf,
               structure,
               sites,
               interpolation,
               verbose: false }
    }

    /// The smoothed ELF along the straight line from a site to a neighbour
    /// image.
    pub fn partitioning_line(&self, site: usize, neighbor: &Neighbor) -> Vec<f64> {
        let start = self.structure.sites[site].frac;
        let line = self.elf.sample_line(start,
                                        neighbor.frac,
                                        LINE_POINTS,
                                        self.interpolation);
        savgol_smooth(&line, SMOOTHING_WINDOW, SMOOTHING_ORDER)
    }

    /// Fails when any atom-atom bond in the coordination shells looks
    /// covalent or metallic, or when the nearest neighbour of an atom is the
    /// same species.
    pub fn check_structure_for_covalency(&self) -> Result<()> {
        info!("Checking bonds for covalency");
        let is_atom = |_: usize, s: &Site| s.kind == SiteKind::Atom;
        for site in self.structure.atom_indices() {
            let species = &self.structure.sites[site].species;
            if let Some(nearest) = self.structure.neighbors(site, 1, is_atom).first() {
                if self.structure.sites[nearest.index].species == *species {
                    return Err(BadElfError::SameSpeciesNeighbor { site,
                                                                  neighbor: nearest.index,
                                                                  species: species.clone() });
                }
            }
            for neighbor in self.structure.coordination(site, COORDINATION_TOLERANCE) {
                let line = self.partitioning_line(site, &neighbor);
                if check_bond_for_covalency(&line) {
                    return Err(BadElfError::CovalencyDetected { site,
                                                                neighbor: neighbor.index });
                }
            }
        }
        Ok(())
    }

    /// The dividing plane between a site and a neighbour image.
    pub fn dividing_plane(&self, site: usize, neighbor: Neighbor) -> DividingPlane {
        let line = self.partitioning_line(site, &neighbor);
        let same_species = self.structure.sites[site].species
                           == self.structure.sites[neighbor.index].species;
        let (position, value) =
            line_minimum_as_frac(&line, same_species).unwrap_or((0.5, line[line.len() / 2]));
        let start = self.structure.sites[site].frac;
        let direction = utils::sub(neighbor.frac, start);
        let point = self.structure
                        .lattice
                        .to_cartesian(utils::add(start, utils::scale(direction, position)));
        let normal = self.structure.lattice.to_cartesian(direction);
        DividingPlane { plane: Plane::new(point, normal),
                        neighbor,
                        position,
                        value }
    }

    /// The cell of a single site, growing the neighbour list until the cell
    /// closes.
    pub fn site_cell(&self, site: usize) -> Result<SiteCell> {
        let partition = |i: usize, _: &Site| self.sites.contains(&i);
        let mut count = INITIAL_NEIGHBORS;
        loop {
            let neighbors = self.structure.neighbors(site, count, partition);
            let candidates = neighbors.into_iter()
                                      .map(|nb| self.dividing_plane(site, nb))
                                      .collect::<Vec<DividingPlane>>();
            let planes = candidates.iter().map(|d| d.plane).collect::<Vec<Plane>>();
            let (important, vertices) = important_planes(&planes);
            let kept = important.iter().map(|i| planes[*i]).collect::<Vec<Plane>>();
            if !vertices.is_empty() && is_bounded(&kept) {
                let centre = self.structure.cartesian(site);
                let radius = vertices.iter()
                                     .map(|v| utils::norm(utils::sub(*v, centre)))
                                     .fold(0f64, f64::max);
                debug!("Site {} bounded by {} of {} planes",
                       site,
                       important.len(),
                       candidates.len());
                return Ok(SiteCell { site,
                                     planes: important.into_iter()
                                                      .map(|i| candidates[i])
                                                      .collect(),
                                     vertices,
                                     radius });
            }
            count += NEIGHBOR_STEP;
            if count > MAX_NEIGHBORS {
                return Err(BadElfError::PartitioningDegenerate { site,
                                                                 neighbors: count
                                                                            - NEIGHBOR_STEP });
            }
            debug!("Cell of site {} is open, retrying with {} neighbours",
                   site,
                   count);
        }
    }

    /// The cells of every partition site.
    pub fn partition(&self) -> Result<PartitioningResult> {
        info!("Partitioning {} sites with ELF planes", self.sites.len());
        let bar = Bar::stage(self.sites.len(), "Partitioning:", self.verbose);
        let mut cells = Vec::with_capacity(self.sites.len());
        for site in self.sites.iter() {
            cells.push(self.site_cell(*site)?);
            bar.tick();
        }
        Ok(PartitioningResult { cells })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    #[test]
    fn partitioning_find_extrema() {
        let values = [3., 1., 2., 1., 3.];
        assert_eq!(find_minimum(&values), vec![1, 3]);
        assert_eq!(find_maximum(&values), vec![0, 2, 4]);
    }

    #[test]
    fn partitioning_symmetric_same_species() {
        let values = [1., 2., 3., 4., 5., 4., 3., 2., 1.];
        let (position, value) = line_minimum_as_frac(&values, true).unwrap();
        assert_eq!(position, 0.5);
        assert_eq!(value, 5.);
    }

    #[test]
    fn partitioning_line_minimum_refined() {
        let values = (0..21).map(|i| (i as f64 - 8.).powi(2))
                            .collect::<Vec<f64>>();
        let (position, value) = line_minimum_as_frac(&values, false).unwrap();
        assert!((position - 0.4).abs() < 1e-6);
        assert!(value.abs() < 1e-6);
    }

    #[test]
    fn partitioning_line_minimum_at_end() {
        let values = [3., 2.5, 2., 1.5, 1.];
        assert_eq!(line_minimum_as_frac(&values, false), Some((1., 1.)));
        assert!(line_minimum_as_frac(&[1.], false).is_none());
    }

    #[test]
    fn partitioning_savgol_keeps_cubic() {
        let values = (0..40).map(|i| {
                                let x = i as f64 / 10.;
                                x.powi(3) - 2. * x
                            })
                            .collect::<Vec<f64>>();
        let smooth = savgol_smooth(&values, 20, 3);
        for (a, b) in values.iter().zip(smooth.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn partitioning_covalency_check() {
        // central maximum between two shallow dips
        let covalent = [0.9, 0.5, 0.4, 0.6, 0.8, 0.6, 0.4, 0.5, 0.9];
        assert!(check_bond_for_covalency(&covalent));
        // one deep central minimum
        let ionic = [0.9, 0.6, 0.3, 0.1, 0.05, 0.1, 0.3, 0.6, 0.9];
        assert!(!check_bond_for_covalency(&ionic));
    }

    #[test]
    fn partitioning_plane_side() {
        let plane = Plane::new([1., 0., 0.], [2., 0., 0.]);
        assert_eq!(plane.equation(), [1., 0., 0., -1.]);
        assert_eq!(plane.side([2., 5., 5.]), Side::Positive);
        assert_eq!(plane.side([0., 1., 1.]), Side::Negative);
        assert_eq!(plane.side([1. + 1e-8, 3., 0.]), Side::Zero);
    }

    fn cube() -> Vec<Plane> {
        let mut planes = vec![];
        for axis in 0..3 {
            for sign in [-1., 1.] {
                let mut v = [0.; 3];
                v[axis] = sign;
                planes.push(Plane::new(v, v));
            }
        }
        planes
    }

    #[test]
    fn partitioning_important_planes() {
        let mut planes = cube();
        // beyond the cube, never a vertex
        planes.push(Plane::new([3., 0., 0.], [1., 0., 0.]));
        let (important, vertices) = important_planes(&planes);
        assert_eq!(important, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(vertices.len(), 8);
        assert!(is_bounded(&planes));
    }

    #[test]
    fn partitioning_open_cell() {
        let mut planes = cube();
        planes.remove(1);
        assert!(!is_bounded(&planes));
    }

    #[test]
    fn partitioning_simple_cubic_cell() {
        let lattice =
            Lattice::new([[3., 0., 0.], [0., 3., 0.], [0., 0., 3.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        let shape = [12, 12, 12];
        let grid = crate::grid::Grid::new(shape, structure.lattice.clone());
        let data = (0..grid.size.total).map(|p| {
                                           let f = grid.to_fractional(p);
                                           let d = structure.lattice.distance(f, [0.; 3]);
                                           (-d * d).exp()
                                       })
                                       .collect();
        let elf = ScalarGrid::new(data, shape, structure.clone()).unwrap();
        let toolkit = PartitioningToolkit::new(&elf,
                                               &structure,
                                               |s| s.kind == SiteKind::Atom,
                                               Interpolation::Linear);
        let result = toolkit.partition().unwrap();
        let cell = &result.cells[0];
        assert!(cell.planes.iter().all(|p| p.position == 0.5));
        let faces = cell.planes
                        .iter()
                        .filter(|p| (utils::norm(p.plane.point) - 1.5).abs() < 1e-9)
                        .count();
        assert_eq!(faces, 6);
        assert!((cell.radius - 1.5 * 3f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn partitioning_same_species_neighbor() {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("Na", [0.5, 0.5, 0.5]);
        let elf = ScalarGrid::new(vec![0.5; 512], [8, 8, 8], structure.clone()).unwrap();
        let toolkit = PartitioningToolkit::new(&elf,
                                               &structure,
                                               |s| s.kind == SiteKind::Atom,
                                               Interpolation::Linear);
        match toolkit.check_structure_for_covalency() {
            Err(BadElfError::SameSpeciesNeighbor { site, neighbor, species }) => {
                assert_eq!((site, neighbor), (0, 1));
                assert_eq!(species, "Na");
            }
            _ => panic!("expected the Na pair to be rejected"),
        }
    }
}
