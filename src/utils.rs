/// compute the cross product of two vectors
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[1] * b[2] - a[2] * b[1],
     a[2] * b[0] - a[0] * b[2],
     a[0] * b[1] - a[1] * b[0]]
}

/// compute the dot product between a vector and a matrix
pub fn dot(v: [f64; 3], m: [[f64; 3]; 3]) -> [f64; 3] {
    let mut out = [0f64; 3];
    for (i, out) in out.iter_mut().enumerate() {
        *out = v[0] * m[0][i] + v[1] * m[1][i] + v[2] * m[2][i]
    }
    out
}

/// compute the dot product between two vectors
pub fn vdot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// compute the norm of a vector
pub fn norm(a: [f64; 3]) -> f64 {
    a.iter().map(|a| a.powi(2)).sum::<f64>().powf(0.5)
}

/// a - b
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// a + b
pub fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// a * s
pub fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Round to 12 decimal places, removing the noise left by periodic wrapping.
pub fn round12(x: f64) -> f64 {
    (x * 1e12).round() / 1e12
}

/// determinant of a 3x3 matrix
pub fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
    - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
    + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Inverse of a 3x3 lattice from the cross products of its rows, None if it
/// doesn't span 3D space.
pub fn invert_lattice(lattice: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = determinant(lattice);
    if det.abs() < 1e-16 {
        return None;
    }
    let [a, b, c] = *lattice;
    let columns = [cross(b, c), cross(c, a), cross(a, b)];
    let mut inverse = [[0f64; 3]; 3];
    for (i, row) in inverse.iter_mut().enumerate() {
        *row = [columns[0][i] / det, columns[1][i] / det, columns[2][i] / det];
    }
    Some(inverse)
}

/// Solves m.x = rhs where the rows of m are the equations.
pub fn solve_3x3(m: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    let det = determinant(&m);
    if det.abs() < 1e-12 {
        return None;
    }
    let mut out = [0f64; 3];
    for (col, out) in out.iter_mut().enumerate() {
        let mut mc = m;
        for row in 0..3 {
            mc[row][col] = rhs[row];
        }
        *out = determinant(&mc) / det;
    }
    Some(out)
}

/// Least squares polynomial fit, coefficients returned lowest order first.
///
/// Returns None when there are too few points or the normal equations are
/// singular.
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Option<Vec<f64>> {
    let n = order + 1;
    if x.len() != y.len() || x.len() < n {
        return None;
    }
    // normal equations as an augmented matrix
    let mut a = vec![vec![0f64; n + 1]; n];
    for (xi, yi) in x.iter().zip(y) {
        let mut powers = vec![1f64; 2 * n - 1];
        for k in 1..powers.len() {
            powers[k] = powers[k - 1] * xi;
        }
        for row in 0..n {
            for col in 0..n {
                a[row][col] += powers[row + col];
            }
            a[row][n] += powers[row] * yi;
        }
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|i, j| {
                                a[*i][col].abs().total_cmp(&a[*j][col].abs())
                            })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..=n {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    let mut coefficients = vec![0f64; n];
    for row in (0..n).rev() {
        let mut sum = a[row][n];
        for k in (row + 1)..n {
            sum -= a[row][k] * coefficients[k];
        }
        coefficients[row] = sum / a[row][row];
    }
    Some(coefficients)
}

/// evaluates a polynomial with coefficients lowest order first
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0f64, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utils_dot() {
        assert_eq!(dot([1., 2., 3.],
                       [[1., 0., 0.], [0., 2., 0.], [0., 0., 3.]]),
                   [1., 4., 9.])
    }

    #[test]
    fn utils_vdot() {
        assert_eq!(vdot([1., 2., 3.], [1., 2., 3.]), 14.)
    }

    #[test]
    fn utils_norm() {
        assert_eq!(norm([3., 4., 12.]), 13.)
    }

    #[test]
    fn utils_cross() {
        assert_eq!(cross([1., 0., 0.], [0., 1., 0.]), [0., 0., 1.])
    }

    #[test]
    fn utils_invert_lattice() {
        let inv = invert_lattice(&[[2., 0., 0.], [0., 4., 0.], [0., 0., 5.]]);
        assert_eq!(inv, Some([[0.5, 0., 0.], [0., 0.25, 0.], [0., 0., 0.2]]))
    }

    #[test]
    fn utils_invert_lattice_flat() {
        let inv = invert_lattice(&[[1., 0., 0.], [1., 0., 0.], [0., 0., 2.]]);
        assert!(inv.is_none())
    }

    #[test]
    fn utils_solve_3x3() {
        let x = solve_3x3([[1., 0., 0.], [0., 2., 0.], [1., 1., 1.]],
                          [1., 4., 6.]).unwrap();
        assert!((x[0] - 1.).abs() < 1e-12);
        assert!((x[1] - 2.).abs() < 1e-12);
        assert!((x[2] - 3.).abs() < 1e-12);
    }

    #[test]
    fn utils_solve_3x3_parallel() {
        let x = solve_3x3([[1., 0., 0.], [2., 0., 0.], [0., 0., 1.]],
                          [1., 4., 6.]);
        assert!(x.is_none())
    }

    #[test]
    fn utils_polyfit_quadratic() {
        let x = (0..7).map(|i| i as f64).collect::<Vec<f64>>();
        let y = x.iter().map(|x| 2. * (x - 3.2).powi(2) + 1.).collect::<Vec<f64>>();
        let c = polyfit(&x, &y, 2).unwrap();
        assert!((c[2] - 2.).abs() < 1e-8);
        assert!((-c[1] / (2. * c[2]) - 3.2).abs() < 1e-8);
        assert!((polyval(&c, 3.2) - 1.).abs() < 1e-8);
    }

    #[test]
    fn utils_polyfit_too_few() {
        assert!(polyfit(&[0., 1.], &[0., 1.], 2).is_none())
    }

    #[test]
    fn utils_round12() {
        assert_eq!(round12(0.1 + 0.2), 0.3)
    }
}
