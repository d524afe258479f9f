use crate::atoms::{Lattice, Structure};
use crate::errors::{BadElfError, Result};
use crate::grid::ScalarGrid;
use crate::io::reader::BufReader;
use crate::io::{FileFormat, FortranFormat, GridKind};
use crate::utils;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The coordinate system.
enum Coord {
    /// Fractional coordinates.
    Fractional,
    /// Cartesian coordinates.
    Cartesian,
}

/// The VASP file format for reading/writing CHGCARs and ELFCARs.
///
/// VASP stores the grid with x running fastest whereas [`ScalarGrid`] runs z
/// fastest, the data is reordered on the way in and out.
pub struct Vasp {}

impl FileFormat for Vasp {
    fn read(&self, path: &Path, kind: GridKind) -> Result<Vec<ScalarGrid>> {
        let mut reader = BufReader::open(path)?;
        let structure = self.to_structure(&mut reader)?;
        let mut buffer = String::new();
        // the grid line follows the first non empty line after the positions
        let grid_line = loop {
            let text = reader.expect_line(&mut buffer, "grid dimensions")?;
            if !text.trim().is_empty() {
                break text.trim().to_string();
            }
        };
        let shape = parse_shape(&grid_line).ok_or_else(|| {
                        reader.error(format!("invalid grid dimensions '{}'", grid_line))
                    })?;
        let total = shape[0] * shape[1] * shape[2];
        let mult = match kind {
            GridKind::Charge => 1. / structure.lattice.volume,
            GridKind::Elf => 1.,
        };
        let mut grids = vec![];
        loop {
            let mut values = Vec::with_capacity(total);
            while values.len() < total {
                let text = reader.expect_line(&mut buffer, "grid data")?;
                for token in text.split_whitespace() {
                    if values.len() == total {
                        break;
                    }
                    let value = parse_fortran(token).ok_or_else(|| {
                                    reader.error(format!("invalid value '{}'", token))
                                })?;
                    values.push(value * mult);
                }
            }
            grids.push(ScalarGrid::new(from_vasp_order(&values, shape),
                                       shape,
                                       structure.clone())?);
            // skip augmentation occupancies until the next block or the end
            let mut next = false;
            while let Some(line) = reader.read_line(&mut buffer) {
                let text = line?;
                if text.trim() == grid_line {
                    next = true;
                    break;
                }
            }
            if !next {
                break;
            }
        }
        Ok(grids)
    }

    fn write(&self, grid: &ScalarGrid, kind: GridKind, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| BadElfError::io(path, e))?;
        let mut buffer = BufWriter::new(file);
        let mult = match kind {
            GridKind::Charge => grid.structure.lattice.volume,
            GridKind::Elf => 1.,
        };
        let shape = grid.shape();
        let data = to_vasp_order(&grid.data, shape);
        let mut write = || -> std::io::Result<()> {
            write!(buffer, "{}", grid.structure)?;
            writeln!(buffer)?;
            writeln!(buffer, "{:>5}{:>5}{:>5}", shape[0], shape[1], shape[2])?;
            for line in data.chunks(5) {
                for value in line {
                    write!(buffer,
                           " {:.11}",
                           FortranFormat { float: *value,
                                           mult })?;
                }
                writeln!(buffer)?;
            }
            buffer.flush()
        };
        write().map_err(|e| BadElfError::io(path, e))
    }
}

impl Vasp {
    /// Reads the POSCAR header of a volumetric file.
    fn to_structure(&self, reader: &mut BufReader) -> Result<Structure> {
        let mut buffer = String::new();
        let comment = reader.expect_line(&mut buffer, "comment")?.trim().to_string();
        let scale = reader.expect_line(&mut buffer, "scale")?
                          .split_whitespace()
                          .map(|x| x.parse::<f64>())
                          .collect::<std::result::Result<Vec<f64>, _>>()
                          .map_err(|_| reader.error("invalid scale factor"))?;
        let mut lattice = [[0f64; 3]; 3];
        for v in lattice.iter_mut() {
            let text = reader.expect_line(&mut buffer, "lattice")?;
            *v = parse_vector(text).ok_or_else(|| reader.error("invalid lattice vector"))?;
        }
        // the scale can be negative and this means that it is the volume of the cell
        // it can also be 3 values which is a multiplier for each lattice
        let volume = utils::determinant(&lattice).abs();
        let scale = match scale.as_slice() {
            [s] if *s < 0. => [(-s / volume).cbrt(); 3],
            [s] => [*s; 3],
            [a, b, c] => [*a, *b, *c],
            _ => return Err(reader.error("scale must hold one or three values")),
        };
        for v in lattice.iter_mut() {
            for (x, s) in v.iter_mut().zip(scale.iter()) {
                *x *= s;
            }
        }
        let lattice = Lattice::new(lattice)?;
        // VASP 5 lists the species before the counts, VASP 4 only in the comment
        let line = reader.expect_line(&mut buffer, "species")?.to_string();
        let (species, counts) = match parse_counts(&line) {
            Some(counts) => {
                let species = comment.split_whitespace()
                                     .map(|s| s.to_string())
                                     .chain(std::iter::repeat(String::from("X")))
                                     .take(counts.len())
                                     .collect::<Vec<String>>();
                (species, counts)
            }
            None => {
                let species = line.split_whitespace()
                                  .map(|s| s.split('/').next().unwrap_or(s).to_string())
                                  .collect::<Vec<String>>();
                let text = reader.expect_line(&mut buffer, "species counts")?;
                let counts =
                    parse_counts(text).ok_or_else(|| reader.error("invalid species counts"))?;
                (species, counts)
            }
        };
        if species.len() != counts.len() {
            return Err(reader.error("species and counts differ in length"));
        }
        let mut text = reader.expect_line(&mut buffer, "coordinate system")?
                             .trim_start()
                             .to_lowercase();
        if text.starts_with('s') {
            text = reader.expect_line(&mut buffer, "coordinate system")?
                         .trim_start()
                         .to_lowercase();
        }
        let coord = if text.starts_with('d') {
            Coord::Fractional
        } else {
            Coord::Cartesian
        };
        let mut structure = Structure::new(lattice, vec![]);
        for (name, count) in species.iter().zip(counts) {
            for _ in 0..count {
                let text = reader.expect_line(&mut buffer, "positions")?;
                let p = parse_vector(text).ok_or_else(|| reader.error("invalid position"))?;
                let frac = match coord {
                    Coord::Fractional => p,
                    Coord::Cartesian => {
                        structure.lattice.to_fractional(utils::scale(p, scale[0]))
                    }
                };
                structure.push(name, frac);
            }
        }
        Ok(structure)
    }
}

/// Parses the first three floats of a line.
fn parse_vector(text: &str) -> Option<[f64; 3]> {
    let mut values = text.split_whitespace().take(3).map(|x| x.parse::<f64>());
    let mut v = [0f64; 3];
    for x in v.iter_mut() {
        *x = values.next()?.ok()?;
    }
    Some(v)
}

/// Parses a line of species counts, None if any entry is not an integer.
fn parse_counts(text: &str) -> Option<Vec<usize>> {
    let counts = text.split_whitespace()
                     .map(|x| x.parse::<usize>().ok())
                     .collect::<Option<Vec<usize>>>()?;
    (!counts.is_empty()).then(|| counts)
}

fn parse_shape(text: &str) -> Option<[usize; 3]> {
    let counts = parse_counts(text)?;
    match counts.as_slice() {
        [x, y, z] if *x > 1 && *y > 1 && *z > 1 => Some([*x, *y, *z]),
        _ => None,
    }
}

/// Parses a float, accepting Fortran's D exponent.
fn parse_fortran(token: &str) -> Option<f64> {
    token.parse::<f64>()
         .ok()
         .or_else(|| token.replace(['D', 'd'], "E").parse::<f64>().ok())
}

/// Reorders x fastest data into z fastest.
fn from_vasp_order(values: &[f64], [nx, ny, nz]: [usize; 3]) -> Vec<f64> {
    let mut data = vec![0f64; values.len()];
    for (i, value) in values.iter().enumerate() {
        let x = i % nx;
        let y = (i / nx) % ny;
        let z = i / (nx * ny);
        data[(x * ny + y) * nz + z] = *value;
    }
    data
}

/// Reorders z fastest data into x fastest.
fn to_vasp_order(data: &[f64], [nx, ny, nz]: [usize; 3]) -> Vec<f64> {
    let mut values = vec![0f64; data.len()];
    for (p, value) in data.iter().enumerate() {
        let x = p / (ny * nz);
        let y = (p / nz) % ny;
        let z = p % nz;
        values[x + nx * (y + ny * z)] = *value;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vasp_ordering() {
        let shape = [2, 3, 4];
        let values = (0..24).map(|i| i as f64).collect::<Vec<f64>>();
        let data = from_vasp_order(&values, shape);
        // x = 1, y = 0, z = 0 is the second value in the file
        assert_eq!(data[12], 1.);
        // x = 0, y = 0, z = 1 is the seventh value in the file
        assert_eq!(data[1], 6.);
        assert_eq!(to_vasp_order(&data, shape), values);
    }

    #[test]
    fn vasp_parse_helpers() {
        assert_eq!(parse_counts("1 2 3"), Some(vec![1, 2, 3]));
        assert_eq!(parse_counts("Na Cl"), None);
        assert_eq!(parse_shape("  40  40  60"), Some([40, 40, 60]));
        assert_eq!(parse_shape("40 40"), None);
        assert_eq!(parse_fortran("0.5D+01"), Some(5.));
        assert_eq!(parse_vector("0.0 0.5 0.25 T T F"), Some([0., 0.5, 0.25]));
    }
}
