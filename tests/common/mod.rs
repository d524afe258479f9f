#![allow(dead_code)]

use badelf::atoms::{Lattice, Structure};
use badelf::grid::ScalarGrid;

/// Points along each lattice vector.
pub const POINTS: usize = 36;

/// A 6 angstrom cubic cell holding Na at the origin and Cl at the body
/// centre.
pub fn structure() -> Structure {
    let lattice =
        Lattice::new([[6., 0., 0.], [0., 6., 0.], [0., 0., 6.]]).unwrap();
    let mut structure = Structure::new(lattice, vec![]);
    structure.push("Na", [0., 0., 0.]);
    structure.push("Cl", [0.5, 0.5, 0.5]);
    structure
}

/// Where the trapped electrons sit.
pub const ELECTRIDE: [f64; 3] = [0.5, 0., 0.];

/// (centre, height, width) of a Gaussian
type Peak = ([f64; 3], f64, f64);

/// ELF between the peaks never drops below this.
pub const ELF_FLOOR: f64 = 0.05;

fn gaussians(structure: &Structure, peaks: &[Peak], floor: f64) -> Vec<f64> {
    let n = POINTS;
    let mut data = Vec::with_capacity(n * n * n);
    for x in 0..n {
        for y in 0..n {
            for z in 0..n {
                let frac = [x as f64 / n as f64, y as f64 / n as f64, z as f64 / n as f64];
                let value = peaks.iter()
                                 .map(|(centre, height, width)| {
                                     let d = structure.lattice.distance(frac, *centre);
                                     height * (-d * d / (2. * width * width)).exp()
                                 })
                                 .sum::<f64>();
                data.push(floor + value);
            }
        }
    }
    data
}

/// Normalised Gaussian charge holding `electrons`.
fn charge_peak(centre: [f64; 3], electrons: f64, width: f64) -> Peak {
    let norm = (2. * std::f64::consts::PI).powf(1.5) * width.powi(3);
    (centre, electrons / norm, width)
}

/// A sharp core and a broad valence tail for each atom, and the trapped
/// electrons. `cl_core` false leaves the Cl atom without any ELF.
fn elf_peaks(cl_core: bool) -> Vec<Peak> {
    let mut peaks = vec![([0., 0., 0.], 0.75, 0.4),
                         ([0., 0., 0.], 0.15, 1.5),
                         (ELECTRIDE, 0.85, 0.4)];
    if cl_core {
        peaks.push(([0.5, 0.5, 0.5], 0.72, 0.4));
        peaks.push(([0.5, 0.5, 0.5], 0.15, 1.5));
    }
    peaks
}

fn build(elf_peaks: &[Peak]) -> (ScalarGrid, ScalarGrid) {
    let structure = structure();
    let charge_peaks = [charge_peak([0., 0., 0.], 8., 0.6),
                        charge_peak([0.5, 0.5, 0.5], 8., 0.6),
                        charge_peak(ELECTRIDE, 3., 0.8)];
    let shape = [POINTS; 3];
    let elf = ScalarGrid::new(gaussians(&structure, elf_peaks, ELF_FLOOR),
                              shape,
                              structure.clone()).unwrap();
    let charge = ScalarGrid::new(gaussians(&structure, &charge_peaks, 0.),
                                 shape,
                                 structure).unwrap();
    (elf, charge)
}

/// The ELF and charge density of the cell.
pub fn grids(cl_core: bool) -> (ScalarGrid, ScalarGrid) {
    build(&elf_peaks(cl_core))
}

/// The same cell with an ELF maximum half way along one Na-Cl bond.
pub fn bonded_grids() -> (ScalarGrid, ScalarGrid) {
    let mut peaks = elf_peaks(true);
    peaks.push(([0.25, 0.25, 0.25], 0.6, 0.4));
    build(&peaks)
}
