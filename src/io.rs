use crate::errors::Result;
use crate::grid::ScalarGrid;
use std::fmt;
use std::path::Path;

pub mod output;
pub mod potcar;
pub mod reader;
pub mod vasp;

/// What a volumetric file holds, which decides how its values are scaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKind {
    /// Charge stored multiplied by the cell volume, CHGCAR style.
    Charge,
    /// Values stored as they are, ELFCAR style.
    Elf,
}

/// A file format that can read and write scalar grids.
pub trait FileFormat {
    /// Reads every data block of a file. The first block is the total, any
    /// further blocks are spin.
    fn read(&self, path: &Path, kind: GridKind) -> Result<Vec<ScalarGrid>>;

    /// Writes a grid and its structure to file.
    fn write(&self, grid: &ScalarGrid, kind: GridKind, path: &Path) -> Result<()>;
}

/// Formats a float the way Fortran writes E11 numbers, a mantissa in
/// [0.1, 1) and a signed two digit exponent.
pub struct FortranFormat {
    pub float: f64,
    /// multiplier applied before formatting
    pub mult: f64,
}

impl fmt::Display for FortranFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.float * self.mult;
        let precision = f.precision().unwrap_or(11);
        if value == 0. || !value.is_finite() {
            return write!(f, "{:.*}E+00", precision, 0.);
        }
        let mut exponent = value.abs().log10().floor() as i32 + 1;
        let mut mantissa = value / 10f64.powi(exponent);
        // rounding can push the mantissa up to 1
        let scale = 10f64.powi(precision as i32);
        if (mantissa.abs() * scale).round() >= scale {
            mantissa /= 10.;
            exponent += 1;
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(f,
               "{:.*}E{}{:02}",
               precision,
               mantissa,
               sign,
               exponent.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_fortran_format() {
        let f = |x: f64| format!("{:.11}", FortranFormat { float: x, mult: 1. });
        assert_eq!(f(0.), "0.00000000000E+00");
        assert_eq!(f(1.), "0.10000000000E+01");
        assert_eq!(f(-0.0123), "-0.12300000000E-01");
        assert_eq!(f(0.5), "0.50000000000E+00");
    }

    #[test]
    fn io_fortran_format_mult() {
        let f = format!("{:.5}", FortranFormat { float: 2.5, mult: 4. });
        assert_eq!(f, "0.10000E+02");
    }
}
