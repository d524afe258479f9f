use crate::errors::{BadElfError, Result};
use crate::grid::Grid;
use crate::partitioning::{PartitioningResult, SiteCell};
use crate::progress::Bar;
use crate::utils;
use crate::voxel_map::VoxelMap;
use atomic_counter::{AtomicCounter, RelaxedCounter};
use crossbeam_utils::thread;
use log::{debug, info};
use rustc_hash::FxHashMap;

/// Voxel-plane tests above which the chunked backend is used.
pub const DENSE_LIMIT: f64 = 7.8e8;
/// Largest number of voxels handed to a worker at once.
pub const MAX_CHUNK: usize = 1 << 18;

/// How the voxel-plane tests are executed. Both give identical labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// A single pass over every voxel.
    Dense,
    /// Voxels split into chunks processed by scoped worker threads.
    Chunked,
}

impl Backend {
    /// Picks the backend from the number of voxel-plane tests required.
    pub fn for_problem(voxels: usize, planes: usize) -> Self {
        if voxels as f64 * planes as f64 > DENSE_LIMIT {
            Self::Chunked
        } else {
            Self::Dense
        }
    }
}

/// The voxels left undecided by the plane tests and the fraction of each
/// owned by every site.
#[derive(Clone, Debug)]
pub struct BoundaryFractions {
    pub voxels: Vec<usize>,
    /// one row per voxel with one entry per site, each row summing to one
    pub fractions: Vec<Vec<f64>>,
}

/// A cell with a sphere enclosing it.
struct BoundedCell<'a> {
    cell: &'a SiteCell,
    centre: [f64; 3],
    radius: f64,
}

/// Assigns voxels to the cells of a partitioning.
pub struct VoxelAssignment<'a> {
    grid: &'a Grid,
    cells: Vec<BoundedCell<'a>>,
    /// the lattice translations in cartesian space, identity first
    shifts: Vec<[f64; 3]>,
    /// number of sites in the labelled structure
    pub sites: usize,
    /// distance a voxel must lie inside every plane of a cell
    pub min_dist: f64,
    pub threads: usize,
    pub verbose: bool,
}

impl<'a> VoxelAssignment<'a> {
    pub fn new(grid: &'a Grid,
               partitioning: &'a PartitioningResult,
               sites: usize,
               min_dist: f64,
               threads: usize)
               -> Self {
        let cells = partitioning.cells
                                .iter()
                                .map(|cell| {
                                    let centre = centre_of(cell);
                                    let radius = cell.vertices
                                                     .iter()
                                                     .map(|v| utils::norm(utils::sub(*v, centre)))
                                                     .fold(0f64, f64::max);
                                    BoundedCell { cell,
                                                  centre,
                                                  radius }
                                })
                                .collect();
        let shifts = grid.lattice
                         .translations
                         .iter()
                         .map(|t| {
                             grid.lattice
                                 .to_cartesian([t[0] as f64, t[1] as f64, t[2] as f64])
                         })
                         .collect();
        Self { grid,
               cells,
               shifts,
               sites,
               min_dist,
               threads: threads.max(1),
               verbose: false }
    }

    fn planes(&self) -> usize {
        self.cells.iter().map(|c| c.cell.planes.len()).sum()
    }

    /// The label of a single voxel: site + 1 when exactly one cell under
    /// exactly one translation holds it strictly inside, otherwise 0.
    pub fn voxel_label(&self, p: usize) -> usize {
        let x = self.grid.to_cartesian(p);
        let mut found = None;
        for shift in self.shifts.iter() {
            let xs = utils::add(x, *shift);
            for bounded in self.cells.iter() {
                if utils::norm(utils::sub(xs, bounded.centre)) > bounded.radius + 1e-9 {
                    continue;
                }
                let inside = bounded.cell
                                    .planes
                                    .iter()
                                    .all(|d| d.plane.signed_distance(xs) < -self.min_dist);
                if inside {
                    if found.is_some() {
                        return 0;
                    }
                    found = Some(bounded.cell.site + 1);
                }
            }
        }
        found.unwrap_or(0)
    }

    /// Labels every free voxel, leaving fixed (non-zero) and vacuum voxels
    /// untouched.
    pub fn exact_labels(&self,
                        fixed: &[usize],
                        vacuum: &[bool],
                        backend: Backend)
                        -> Vec<usize> {
        let label = |p: usize| {
            if fixed[p] != 0 || vacuum[p] {
                fixed[p]
            } else {
                self.voxel_label(p)
            }
        };
        let total = self.grid.size.total;
        let bar = Bar::stage(total, "Assigning voxels:", self.verbose);
        match backend {
            Backend::Dense => (0..total).map(|p| {
                                            bar.tick();
                                            label(p)
                                        })
                                        .collect(),
            Backend::Chunked => {
                let chunk_size = ((total / self.threads) + (total % self.threads).min(1))
                                 .clamp(1, MAX_CHUNK);
                let chunks = (0..total).step_by(chunk_size).collect::<Vec<usize>>();
                let counter = RelaxedCounter::new(0);
                let pbar = &bar;
                let label = &label;
                let chunks = &chunks;
                let counter = &counter;
                let results = match thread::scope(|s| {
                    let spawned_threads =
                        (0..self.threads).map(|_| {
                                             s.spawn(move |_| {
                                                 let mut done = vec![];
                                                 loop {
                                                     let i = counter.inc();
                                                     if i >= chunks.len() {
                                                         break;
                                                     }
                                                     let start = chunks[i];
                                                     let end = (start + chunk_size).min(total);
                                                     let labels = (start..end).map(|p| {
                                                                                  pbar.tick();
                                                                                  label(p)
                                                                              })
                                                                              .collect::<Vec<usize>>();
                                                     done.push((start, labels));
                                                 }
                                                 done
                                             })
                                         })
                                         .collect::<Vec<_>>();
                    spawned_threads.into_iter()
                                   .flat_map(|t| match t.join() {
                                       Ok(done) => done,
                                       Err(e) => std::panic::resume_unwind(e),
                                   })
                                   .collect::<Vec<(usize, Vec<usize>)>>()
                }) {
                    Ok(results) => results,
                    Err(e) => std::panic::resume_unwind(e),
                };
                let mut labels = vec![0usize; total];
                for (start, chunk) in results {
                    labels[start..start + chunk.len()].copy_from_slice(&chunk);
                }
                labels
            }
        }
    }

    /// Splits every unresolved voxel between the sites around it.
    ///
    /// A single radius grows in steps of the smallest voxel spacing until
    /// every unresolved voxel has at least one labelled voxel within it.
    /// Each voxel then takes the share of every site among the labelled
    /// voxels inside that common radius. Fails if the radius grows past half
    /// the shortest lattice vector.
    pub fn boundary_fractions(&self,
                              labels: &[usize],
                              vacuum: &[bool])
                              -> Result<BoundaryFractions> {
        let unresolved = (0..labels.len()).filter(|p| labels[*p] == 0 && !vacuum[*p])
                                          .collect::<Vec<usize>>();
        let step = self.grid.min_step();
        let lattice = &self.grid.lattice;
        let limit = lattice.a.min(lattice.b).min(lattice.c) / 2.;
        let mut shells = Shells::new(self.grid, step);
        let bar = Bar::stage(unresolved.len(), "Boundary voxels:", self.verbose);
        let positions = unresolved.iter()
                                  .map(|p| self.grid.to_3d(*p))
                                  .collect::<Vec<[isize; 3]>>();
        let mut tallies = vec![FxHashMap::<usize, usize>::default(); unresolved.len()];
        let mut empty = unresolved.len();
        let mut k = 0;
        while empty > 0 {
            k += 1;
            if k as f64 * step > limit + 1e-12 {
                return Err(BadElfError::SearchExhausted { radius: k as f64 * step,
                                                          limit,
                                                          unresolved: empty });
            }
            let shell = shells.shell(k);
            for ([x, y, z], tally) in positions.iter().zip(tallies.iter_mut()) {
                let was_empty = tally.is_empty();
                for offset in shell.iter() {
                    let pt = self.grid
                                 .to_1d([x + offset[0], y + offset[1], z + offset[2]]);
                    if labels[pt] > 0 {
                        *tally.entry(labels[pt] - 1).or_insert(0) += 1;
                    }
                }
                if was_empty && !tally.is_empty() {
                    empty -= 1;
                    bar.tick();
                }
            }
        }
        let fractions = tallies.into_iter()
                               .map(|tally| {
                                   let count = tally.values().sum::<usize>() as f64;
                                   let mut row = vec![0f64; self.sites];
                                   for (site, n) in tally {
                                       row[site] = n as f64 / count;
                                   }
                                   row
                               })
                               .collect();
        debug!("Split {} boundary voxels within {:.3} angstroms",
               unresolved.len(),
               k as f64 * step);
        Ok(BoundaryFractions { voxels: unresolved,
                               fractions })
    }

    /// Runs both passes and builds the final voxel map.
    pub fn assign(&self, fixed: &[usize], vacuum: &[bool]) -> Result<VoxelMap> {
        let backend = Backend::for_problem(self.grid.size.total, self.planes());
        info!("Assigning {} voxels to {} cells with the {:?} backend",
              self.grid.size.total,
              self.cells.len(),
              backend);
        let labels = self.exact_labels(fixed, vacuum, backend);
        let boundary = self.boundary_fractions(&labels, vacuum)?;
        Ok(self.voxel_map(&labels, vacuum, boundary))
    }

    /// Combines the labels and boundary fractions.
    pub fn voxel_map(&self,
                     labels: &[usize],
                     vacuum: &[bool],
                     boundary: BoundaryFractions)
                     -> VoxelMap {
        let mut map = VoxelMap::new(self.grid.clone(), self.sites);
        for (p, label) in labels.iter().enumerate() {
            if *label > 0 && !vacuum[p] {
                map.site_store(p, label - 1);
            }
        }
        for (p, row) in boundary.voxels.into_iter().zip(boundary.fractions) {
            map.weight_store(p, row);
        }
        map
    }
}

/// Cartesian centre of the vertices of a cell.
fn centre_of(cell: &SiteCell) -> [f64; 3] {
    let n = cell.vertices.len().max(1) as f64;
    let sum = cell.vertices
                  .iter()
                  .fold([0f64; 3], |acc, v| utils::add(acc, *v));
    utils::scale(sum, 1. / n)
}

/// Voxel offsets grouped into spherical shells k * step thick.
struct Shells<'a> {
    grid: &'a Grid,
    step: f64,
    shells: Vec<Vec<[isize; 3]>>,
}

impl<'a> Shells<'a> {
    fn new(grid: &'a Grid, step: f64) -> Self {
        Self { grid,
               step,
               shells: vec![vec![]] }
    }

    /// Offsets with a length in ((k - 1) * step, k * step].
    fn shell(&mut self, k: usize) -> &[[isize; 3]] {
        while self.shells.len() <= k {
            let n = self.shells.len();
            let outer = n as f64 * self.step + 1e-12;
            let inner = (n - 1) as f64 * self.step + 1e-12;
            let spacing = self.grid.lattice.plane_spacing();
            let size = [self.grid.size.x, self.grid.size.y, self.grid.size.z];
            let range = [0, 1, 2].map(|i| {
                                     (outer / (spacing[i] / size[i] as f64)).ceil() as isize
                                 });
            let mut shell = vec![];
            for x in -range[0]..=range[0] {
                for y in -range[1]..=range[1] {
                    for z in -range[2]..=range[2] {
                        let d = utils::norm(utils::dot([x as f64, y as f64, z as f64],
                                                       self.grid.voxel_lattice));
                        if d > inner && d <= outer {
                            shell.push([x, y, z]);
                        }
                    }
                }
            }
            self.shells.push(shell);
        }
        &self.shells[k]
    }
}
