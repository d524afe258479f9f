use crate::atoms::{SiteKind, Structure};
use crate::grid::Grid;
use std::collections::VecDeque;

/// Which voxels count as touching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    /// the 6 voxels sharing a face
    Face,
    /// all 26 surrounding voxels
    Full,
}

impl Connectivity {
    fn offsets(&self, grid: &Grid) -> Vec<[isize; 3]> {
        match self {
            Self::Face => vec![[1, 0, 0],
                               [-1, 0, 0],
                               [0, 1, 0],
                               [0, -1, 0],
                               [0, 0, 1],
                               [0, 0, -1]],
            Self::Full => grid.neighbours().iter().map(|(o, _)| *o).collect(),
        }
    }
}

/// Connected components of a masked periodic grid.
#[derive(Clone, Debug)]
pub struct Components {
    /// 0 for voxels outside the mask, otherwise the component id starting at 1.
    pub labels: Vec<usize>,
    /// Number of components.
    pub count: usize,
    /// Periodic dimensionality of component id, stored at id - 1.
    pub dimensionality: Vec<usize>,
}

impl Components {
    /// The highest periodic dimensionality of any component, 0 if empty.
    pub fn max_dimensionality(&self) -> usize {
        self.dimensionality.iter().copied().max().unwrap_or(0)
    }

    /// The distinct non-zero labels found at the voxels given.
    pub fn labels_at(&self, voxels: &[usize]) -> Vec<usize> {
        let mut out = voxels.iter()
                            .map(|p| self.labels[*p])
                            .filter(|l| *l != 0)
                            .collect::<Vec<usize>>();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Labels the connected components of `mask` on the periodic grid.
///
/// Every voxel reached by a breadth first search remembers which periodic
/// image of the cell it was reached in. Reaching a voxel already in the
/// component through a different image means the component is connected to
/// its own translation, and the rank of those translations is the periodic
/// dimensionality of the component.
pub fn label_components(grid: &Grid,
                        mask: &[bool],
                        connectivity: Connectivity)
                        -> Components {
    let offsets = connectivity.offsets(grid);
    let mut labels = vec![0usize; mask.len()];
    let mut images = vec![[0i32; 3]; mask.len()];
    let mut dimensionality = Vec::new();
    let mut queue = VecDeque::new();
    let mut count = 0;
    for seed in 0..mask.len() {
        if !mask[seed] || labels[seed] != 0 {
            continue;
        }
        count += 1;
        labels[seed] = count;
        images[seed] = [0; 3];
        queue.push_back(seed);
        let mut basis: Vec<[i64; 3]> = Vec::with_capacity(3);
        while let Some(p) = queue.pop_front() {
            for offset in offsets.iter() {
                let (q, crossing) = grid.step(p, *offset);
                if !mask[q] {
                    continue;
                }
                let image = [images[p][0] + crossing[0],
                             images[p][1] + crossing[1],
                             images[p][2] + crossing[2]];
                if labels[q] == 0 {
                    labels[q] = count;
                    images[q] = image;
                    queue.push_back(q);
                } else if basis.len() < 3 {
                    let translation = [(image[0] - images[q][0]) as i64,
                                       (image[1] - images[q][1]) as i64,
                                       (image[2] - images[q][2]) as i64];
                    if translation != [0; 3] {
                        let mut candidate = basis.clone();
                        candidate.push(translation);
                        if rank(&candidate) > basis.len() {
                            basis.push(translation);
                        }
                    }
                }
            }
        }
        dimensionality.push(basis.len());
    }
    Components { labels,
                 count,
                 dimensionality }
}

/// Rank of a set of integer vectors using fraction free elimination.
pub fn rank(vectors: &[[i64; 3]]) -> usize {
    let mut rows = vectors.to_vec();
    let mut rank = 0;
    for col in 0..3 {
        let pivot = match (rank..rows.len()).find(|r| rows[*r][col] != 0) {
            Some(p) => p,
            None => continue,
        };
        rows.swap(rank, pivot);
        let p = rows[rank];
        for row in rows.iter_mut().skip(rank + 1) {
            let factor = row[col];
            if factor == 0 {
                continue;
            }
            for k in 0..3 {
                row[k] = row[k] * p[col] - p[k] * factor;
            }
            let g = row.iter().fold(0i64, |a, b| gcd(a, b.abs()));
            if g > 1 {
                for x in row.iter_mut() {
                    *x /= g;
                }
            }
        }
        rank += 1;
    }
    rank
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Which atoms a region of the grid encloses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnclosedAtoms {
    /// The atoms fully enclosed by a region that does not span the cell.
    Finite(Vec<usize>),
    /// The region is connected to its own periodic images and encloses atoms,
    /// so it cannot be attributed to any finite set of them.
    Infinite,
}

impl EnclosedAtoms {
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Finite(atoms) => Some(atoms.len()),
            Self::Infinite => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Finite(atoms) if atoms.is_empty())
    }
}

/// Finds the atoms of `structure` enclosed by the voxels of `region`.
///
/// An atom is enclosed when its voxel lies in the region or when it sits in a
/// pocket of the complement that is not connected to any of its own periodic
/// images.
pub fn atoms_surrounded(grid: &Grid,
                        region: &[bool],
                        structure: &Structure)
                        -> EnclosedAtoms {
    let complement = region.iter().map(|r| !r).collect::<Vec<bool>>();
    let pockets = label_components(grid, &complement, Connectivity::Face);
    let mut atoms = vec![];
    for (i, site) in structure.sites.iter().enumerate() {
        if site.kind != SiteKind::Atom {
            continue;
        }
        let p = grid.nearest_voxel(site.frac);
        let enclosed = match pockets.labels[p] {
            0 => true,
            label => pockets.dimensionality[label - 1] == 0,
        };
        if enclosed {
            atoms.push(i);
        }
    }
    if atoms.is_empty() {
        return EnclosedAtoms::Finite(atoms);
    }
    let region = label_components(grid, region, Connectivity::Full);
    if region.max_dimensionality() > 0 {
        EnclosedAtoms::Infinite
    } else {
        EnclosedAtoms::Finite(atoms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Lattice;

    fn grid(n: usize) -> Grid {
        Grid::new([n, n, n],
                  Lattice::new([[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]]).unwrap())
    }

    #[test]
    fn connectivity_rank() {
        assert_eq!(rank(&[[1, 0, 0], [2, 0, 0]]), 1);
        assert_eq!(rank(&[[1, 1, 0], [1, -1, 0], [0, 0, 3]]), 3);
        assert_eq!(rank(&[[1, 2, 3], [2, 4, 6], [0, 0, 0]]), 1);
        assert_eq!(rank(&[]), 0);
    }

    #[test]
    fn connectivity_isolated_blobs() {
        let grid = grid(8);
        let mut mask = vec![false; grid.size.total];
        mask[grid.to_1d([1, 1, 1])] = true;
        mask[grid.to_1d([2, 2, 2])] = true;
        mask[grid.to_1d([5, 5, 5])] = true;
        let components = label_components(&grid, &mask, Connectivity::Full);
        assert_eq!(components.count, 2);
        assert_eq!(components.dimensionality, vec![0, 0]);
        let face = label_components(&grid, &mask, Connectivity::Face);
        assert_eq!(face.count, 3);
    }

    #[test]
    fn connectivity_periodic_across_boundary() {
        let grid = grid(8);
        let mut mask = vec![false; grid.size.total];
        mask[grid.to_1d([0, 3, 3])] = true;
        mask[grid.to_1d([7, 3, 3])] = true;
        let components = label_components(&grid, &mask, Connectivity::Face);
        assert_eq!(components.count, 1);
        assert_eq!(components.dimensionality, vec![0]);
    }

    #[test]
    fn connectivity_dimensionality() {
        let grid = grid(6);
        let mut line = vec![false; grid.size.total];
        let mut slab = vec![false; grid.size.total];
        for x in 0..6 {
            line[grid.to_1d([x, 2, 2])] = true;
            for y in 0..6 {
                slab[grid.to_1d([x, y, 2])] = true;
            }
        }
        let all = vec![true; grid.size.total];
        assert_eq!(label_components(&grid, &line, Connectivity::Face).dimensionality,
                   vec![1]);
        assert_eq!(label_components(&grid, &slab, Connectivity::Face).dimensionality,
                   vec![2]);
        assert_eq!(label_components(&grid, &all, Connectivity::Full).dimensionality,
                   vec![3]);
    }

    #[test]
    fn connectivity_atoms_surrounded() {
        let grid = grid(10);
        let mut structure = Structure::new(grid.lattice.clone(), vec![]);
        structure.push("Na", [0.5, 0.5, 0.5]);
        structure.push("Cl", [0., 0., 0.]);
        // a hollow shell around the Na atom
        let mut shell = vec![false; grid.size.total];
        for p in 0..grid.size.total {
            let [x, y, z] = grid.to_3d(p);
            let d = [(x - 5).abs(), (y - 5).abs(), (z - 5).abs()];
            if d.iter().copied().max() == Some(2) {
                shell[p] = true;
            }
        }
        assert_eq!(atoms_surrounded(&grid, &shell, &structure),
                   EnclosedAtoms::Finite(vec![0]));
        // a sheet through the cell touches no atoms and encloses nothing
        let mut sheet = vec![false; grid.size.total];
        for p in 0..grid.size.total {
            if grid.to_3d(p)[2] == 3 {
                sheet[p] = true;
            }
        }
        assert_eq!(atoms_surrounded(&grid, &sheet, &structure),
                   EnclosedAtoms::Finite(vec![]));
        // everything encloses every atom
        let all = vec![true; grid.size.total];
        assert_eq!(atoms_surrounded(&grid, &all, &structure),
                   EnclosedAtoms::Infinite);
    }
}
