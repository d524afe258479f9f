use crate::atoms::{SiteKind, Structure, COORDINATION_TOLERANCE};
use crate::elements;
use crate::errors::{BadElfError, Result};
use crate::grid::ScalarGrid;
use crate::toolkit::SplitMethod;
use crate::voxel_map::{Voxel, VoxelMap};
use crossbeam_utils::thread;
use serde::Serialize;

/// Charge and volume of every site of a voxel map.
///
/// > charges: Vec<f64> - electrons owned by each site
/// > volumes: Vec<f64> - volume owned by each site
/// > vacuum_charge: f64 - electrons in voxels owned by no site
/// > vacuum_volume: f64 - volume of voxels owned by no site
#[derive(Clone, Debug, Serialize)]
pub struct ChargeVolume {
    pub charges: Vec<f64>,
    pub volumes: Vec<f64>,
    pub vacuum_charge: f64,
    pub vacuum_volume: f64,
}

impl ChargeVolume {
    fn zeros(sites: usize) -> Self {
        Self { charges: vec![0.; sites],
               volumes: vec![0.; sites],
               vacuum_charge: 0.,
               vacuum_volume: 0. }
    }

    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.charges.iter_mut().zip(other.charges) {
            *a += b;
        }
        for (a, b) in self.volumes.iter_mut().zip(other.volumes) {
            *a += b;
        }
        self.vacuum_charge += other.vacuum_charge;
        self.vacuum_volume += other.vacuum_volume;
        self
    }

    /// Charge of the sites plus the vacuum.
    pub fn total_charge(&self) -> f64 {
        self.charges.iter().sum::<f64>() + self.vacuum_charge
    }

    /// Volume of the sites plus the vacuum.
    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum::<f64>() + self.vacuum_volume
    }
}

/// Splits 0..total into chunks, folds each chunk on its own thread and
/// returns the per chunk results in order.
fn fold_chunks<T, I, F>(total: usize, threads: usize, init: I, fold: F) -> Vec<T>
    where T: Send,
          I: Fn() -> T + Sync,
          F: Fn(&mut T, usize) + Sync
{
    let threads = threads.max(1);
    let chunk_size = (total / threads) + (total % threads).min(1);
    if chunk_size == 0 {
        return vec![init()];
    }
    let ranges = (0..total).step_by(chunk_size)
                           .map(|start| (start, (start + chunk_size).min(total)))
                           .collect::<Vec<(usize, usize)>>();
    let init = &init;
    let fold = &fold;
    thread::scope(|s| {
        let spawned_threads =
            ranges.iter()
                  .map(|&(start, end)| {
                      s.spawn(move |_| {
                           let mut acc = init();
                           for p in start..end {
                               fold(&mut acc, p);
                           }
                           acc
                       })
                  })
                  .collect::<Vec<_>>();
        spawned_threads.into_iter()
                       .map(|t| t.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                       .collect()
    }).unwrap_or_else(|e| std::panic::resume_unwind(e))
}

/// Sums the charge and volume of each site, splitting boundary voxels by
/// their weights.
pub fn sum_site_charges(charge: &ScalarGrid,
                        voxel_map: &VoxelMap,
                        threads: usize)
                        -> Result<ChargeVolume> {
    if charge.grid.size.total != voxel_map.grid.size.total {
        return Err(BadElfError::GridMismatch(format!("charge grid has {} voxels, the voxel map has {}",
                                                     charge.grid.size.total,
                                                     voxel_map.grid.size.total)));
    }
    let dv = charge.grid.voxel_volume();
    let sites = voxel_map.sites;
    let chunks = fold_chunks(charge.grid.size.total,
                             threads,
                             || ChargeVolume::zeros(sites),
                             |acc: &mut ChargeVolume, p: usize| {
                                 let rho = charge[p] * dv;
                                 match voxel_map.voxel_get(p) {
                                     Voxel::Site(s) => {
                                         acc.charges[s] += rho;
                                         acc.volumes[s] += dv;
                                     }
                                     Voxel::Boundary(weights) => {
                                         for (s, w) in weights.iter().enumerate() {
                                             acc.charges[s] += rho * w;
                                             acc.volumes[s] += dv * w;
                                         }
                                     }
                                     Voxel::Vacuum => {
                                         acc.vacuum_charge += rho;
                                         acc.vacuum_volume += dv;
                                     }
                                 }
                             });
    Ok(chunks.into_iter()
             .fold(ChargeVolume::zeros(sites), |acc, c| acc.merge(c)))
}

/// The minimum and average distance from each site to the voxels on the
/// surface of its volume.
pub fn surface_distances(voxel_map: &VoxelMap,
                         structure: &Structure,
                         threads: usize)
                         -> (Vec<f64>, Vec<f64>) {
    let n = structure.len().min(voxel_map.sites);
    let grid = &voxel_map.grid;
    let chunks =
        fold_chunks(grid.size.total,
                    threads,
                    || (vec![f64::INFINITY; n], vec![0f64; n], vec![0usize; n]),
                    |acc: &mut (Vec<f64>, Vec<f64>, Vec<usize>), p: usize| {
                        let (min, sum, count) = acc;
                        let mut record = |s: usize| {
                            if s < n {
                                let d = structure.lattice.distance(grid.to_fractional(p),
                                                                   structure.sites[s].frac);
                                min[s] = min[s].min(d);
                                sum[s] += d;
                                count[s] += 1;
                            }
                        };
                        match voxel_map.voxel_get(p) {
                            Voxel::Site(s) => {
                                if voxel_map.is_surface(p, s) {
                                    record(s)
                                }
                            }
                            Voxel::Boundary(weights) => {
                                weights.iter()
                                       .enumerate()
                                       .filter(|(_, w)| **w > 0.)
                                       .for_each(|(s, _)| record(s));
                            }
                            Voxel::Vacuum => (),
                        }
                    });
    let mut min = vec![f64::INFINITY; n];
    let mut sum = vec![0f64; n];
    let mut count = vec![0usize; n];
    for (m, s, c) in chunks {
        for i in 0..n {
            min[i] = min[i].min(m[i]);
            sum[i] += s[i];
            count[i] += c[i];
        }
    }
    let avg = sum.iter()
                 .zip(count.iter())
                 .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0. })
                 .collect();
    let min = min.into_iter()
                 .map(|m| if m.is_finite() { m } else { 0. })
                 .collect();
    (min, avg)
}

/// The fraction of a shared feature owed to each atom coordinating it, as
/// (atom index, weight) pairs summing to one.
pub fn shared_weights(structure: &Structure,
                      site: usize,
                      method: SplitMethod)
                      -> Vec<(usize, f64)> {
    let shell = structure.coordination(site, COORDINATION_TOLERANCE);
    if shell.is_empty() {
        return vec![];
    }
    let equal = || {
        let w = 1. / shell.len() as f64;
        shell.iter().map(|nb| (nb.index, w)).collect::<Vec<(usize, f64)>>()
    };
    let normalise = |raw: Vec<f64>| {
        let total = raw.iter().sum::<f64>();
        shell.iter()
             .zip(raw)
             .map(|(nb, w)| (nb.index, w / total))
             .collect::<Vec<(usize, f64)>>()
    };
    match method {
        SplitMethod::Equal | SplitMethod::Plane => equal(),
        SplitMethod::Nearest => vec![(shell[0].index, 1.)],
        SplitMethod::Dist => {
            if shell.iter().any(|nb| nb.distance <= 0.) {
                return equal();
            }
            normalise(shell.iter().map(|nb| 1. / nb.distance).collect())
        }
        SplitMethod::Pauling => {
            let raw = shell.iter()
                           .map(|nb| elements::electronegativity(&structure.sites[nb.index].species))
                           .collect::<Option<Vec<f64>>>();
            match raw {
                Some(raw) if raw.iter().sum::<f64>() > 0. => normalise(raw),
                _ => equal(),
            }
        }
    }
}

/// Moves the charge and volume of every shared feature onto the atoms that
/// coordinate it and drops the shared sites, leaving atoms then electrides.
pub fn split_shared(structure: &Structure,
                    site_values: &ChargeVolume,
                    method: SplitMethod)
                    -> Result<ChargeVolume> {
    if !structure.is_ordered() {
        return Err(BadElfError::UnorderedStructure);
    }
    let kept = structure.sites
                        .iter()
                        .take_while(|s| matches!(s.kind, SiteKind::Atom | SiteKind::Electride))
                        .count();
    let mut out = ChargeVolume { charges: site_values.charges[..kept].to_vec(),
                                 volumes: site_values.volumes[..kept].to_vec(),
                                 vacuum_charge: site_values.vacuum_charge,
                                 vacuum_volume: site_values.vacuum_volume };
    for site in kept..structure.len() {
        let charge = site_values.charges[site];
        let volume = site_values.volumes[site];
        let weights = shared_weights(structure, site, method);
        if weights.is_empty() {
            out.vacuum_charge += charge;
            out.vacuum_volume += volume;
            continue;
        }
        for (atom, w) in weights {
            out.charges[atom] += charge * w;
            out.volumes[atom] += volume * w;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;
    use crate::grid::Grid;

    fn structure(shared: [f64; 3]) -> Structure {
        let lattice =
            Lattice::new([[4., 0., 0.], [0., 4., 0.], [0., 0., 4.]]).unwrap();
        let mut structure = Structure::new(lattice, vec![]);
        structure.push("Na", [0., 0., 0.]);
        structure.push("Cl", [0.5, 0., 0.]);
        structure.push("Z", shared);
        structure
    }

    fn values() -> ChargeVolume {
        ChargeVolume { charges: vec![1., 2., 4.],
                       volumes: vec![10., 10., 6.],
                       vacuum_charge: 0.5,
                       vacuum_volume: 1. }
    }

    #[test]
    fn analysis_split_equal() {
        let split = split_shared(&structure([0.25, 0., 0.]),
                                 &values(),
                                 SplitMethod::Equal).unwrap();
        assert_eq!(split.charges, vec![3., 4.]);
        assert_eq!(split.volumes, vec![13., 13.]);
        assert_eq!(split.vacuum_charge, 0.5);
    }

    #[test]
    fn analysis_split_nearest() {
        let split = split_shared(&structure([0.26, 0., 0.]),
                                 &values(),
                                 SplitMethod::Nearest).unwrap();
        assert_eq!(split.charges, vec![1., 6.]);
    }

    #[test]
    fn analysis_split_dist() {
        let split = split_shared(&structure([0.26, 0., 0.]),
                                 &values(),
                                 SplitMethod::Dist).unwrap();
        let na = (1. / 1.04) / (1. / 1.04 + 1. / 0.96);
        assert!((split.charges[0] - (1. + 4. * na)).abs() < 1e-9);
        assert!((split.total_charge() - values().total_charge()).abs() < 1e-9);
    }

    #[test]
    fn analysis_split_pauling() {
        let split = split_shared(&structure([0.25, 0., 0.]),
                                 &values(),
                                 SplitMethod::Pauling).unwrap();
        let cl = 3.16 / (3.16 + 0.93);
        assert!((split.charges[1] - (2. + 4. * cl)).abs() < 1e-9);
    }

    #[test]
    fn analysis_split_unordered() {
        let mut s = structure([0.25, 0., 0.]);
        s.sites.swap(1, 2);
        assert!(matches!(split_shared(&s, &values(), SplitMethod::Equal),
                         Err(BadElfError::UnorderedStructure)));
    }

    #[test]
    fn analysis_sum_site_charges() {
        let s = structure([0.25, 0., 0.]);
        let data = (0..64).map(|p| p as f64).collect::<Vec<f64>>();
        let charge = ScalarGrid::new(data, [4, 4, 4], s.clone()).unwrap();
        let mut voxel_map = VoxelMap::new(Grid::new([4, 4, 4], s.lattice.clone()), 3);
        for p in 0..64 {
            match p % 4 {
                0 => voxel_map.site_store(p, 0),
                1 => voxel_map.site_store(p, 1),
                2 => voxel_map.weight_store(p, vec![0.5, 0.25, 0.25]),
                _ => (),
            }
        }
        let single = sum_site_charges(&charge, &voxel_map, 1).unwrap();
        let threaded = sum_site_charges(&charge, &voxel_map, 3).unwrap();
        let dv = 1.;
        assert_eq!(single.charges.len(), 3);
        assert!((single.total_charge() - charge.total()).abs() < 1e-9);
        assert!((single.total_volume() - 64. * dv).abs() < 1e-9);
        assert!((threaded.total_charge() - single.total_charge()).abs() < 1e-9);
        assert_eq!(single.volumes[2], 4.);
    }

    #[test]
    fn analysis_surface_distances() {
        let s = structure([0.25, 0., 0.]);
        let grid = Grid::new([4, 4, 4], s.lattice.clone());
        let mut voxel_map = VoxelMap::new(grid, 3);
        for p in 0..64 {
            voxel_map.site_store(p, 0);
        }
        // a lone voxel of site 1 on top of it
        voxel_map.site_store(32, 1);
        let (min, avg) = surface_distances(&voxel_map, &s, 2);
        // voxel 32 is (2, 0, 0), exactly on site 1
        assert_eq!(min[1], 0.);
        assert_eq!(avg[1], 0.);
        // the neighbours of voxel 32 are 1 angstrom from it at the least
        assert!(min[0] > 0.);
        assert_eq!(min[2], 0.);
    }
}
