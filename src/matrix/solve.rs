//! Linear solvers on top of the factorizations: Gauss-Jordan inversion
//! and pivoted-QR least squares.

use super::Matrix;
use crate::error::Error;

impl Matrix {
    /// Inverse by Gauss-Jordan elimination with row exchanges.
    pub fn invert(&self) -> Result<Matrix, Error> {
        let mut out = Matrix::new(self.rows, self.cols);
        self.invert_into(&mut out)?;
        Ok(out)
    }

    /// Buffer-writing counterpart of [Self::invert]. On error the
    /// buffer contents are unspecified.
    pub fn invert_into(&self, out: &mut Matrix) -> Result<(), Error> {
        debug_assert_eq!(self.rows, self.cols);
        debug_assert_eq!((out.rows, out.cols), (self.rows, self.cols));

        let mut scratch = self.clone();
        out.set_identity();
        Self::gauss_jordan(&mut scratch, out)
    }

    /// In-place counterpart of [Self::invert]. On error `self` is left
    /// partially reduced.
    pub fn invert_in_place(&mut self) -> Result<(), Error> {
        let mut scratch = self.clone();
        self.set_identity();
        Self::gauss_jordan(&mut scratch, self)
    }

    /// Inverse of a diagonal matrix, touching only the diagonal.
    pub fn invert_diagonal_in_place(&mut self) {
        for i in 0..self.rows {
            let v = self[(i, i)];
            self[(i, i)] = 1.0 / v;
        }
    }

    /// Reduces `scratch` to the identity, mirroring every row operation
    /// onto `out` (which must start as the identity).
    fn gauss_jordan(scratch: &mut Matrix, out: &mut Matrix) -> Result<(), Error> {
        let n = scratch.rows;
        for i in 0..n {
            if scratch[(i, i)] == 0.0 {
                // find a lower row with a usable pivot
                let r = (i + 1..n)
                    .find(|&r| scratch[(r, i)] != 0.0)
                    .ok_or(Error::SingularMatrix)?;
                scratch.swap_rows(i, r);
                out.swap_rows(i, r);
            }

            let scalar = 1.0 / scratch[(i, i)];
            scratch.scale_row(i, scalar);
            out.scale_row(i, scalar);

            for j in 0..n {
                if i == j {
                    continue;
                }
                let shear = -scratch[(j, i)];
                scratch.shear_row(j, i, shear);
                out.shear_row(j, i, shear);
            }
        }
        Ok(())
    }

    /// Linear least-squares solution of `self · X = B` via the
    /// column-pivoted QR factorization: back substitution through R,
    /// then the pivoting undone. Errors when R is rank deficient.
    pub fn least_squares_qr_pivot(&self, b: &Matrix) -> Result<Matrix, Error> {
        let mut x = Matrix::new(self.cols, b.cols);
        self.least_squares_qr_pivot_into(&mut x, b)?;
        Ok(x)
    }

    /// Buffer-writing counterpart of [Self::least_squares_qr_pivot].
    pub fn least_squares_qr_pivot_into(
        &self,
        x: &mut Matrix,
        b: &Matrix,
    ) -> Result<(), Error> {
        debug_assert_eq!(self.rows, b.rows);
        debug_assert_eq!((x.rows, x.cols), (self.cols, b.cols));

        let (mut q, mut r, p) = self.qr_pivoted();

        // drop the rows of R (and columns of Q) below the economy size
        q.resize(q.rows, self.cols);
        r.resize(self.cols, self.cols);
        let rhs = &q.transpose() * b;

        let n = r.rows;
        // pivoting puts the largest diagonal first, so it anchors the
        // rank tolerance
        let tolerance = f64::EPSILON * n as f64 * r[(0, 0)].abs();
        for i in 0..n {
            if r[(i, i)].abs() <= tolerance {
                return Err(Error::SingularMatrix);
            }
        }

        // back substitution
        let mut z = Matrix::new(n, b.cols);
        for j in 0..b.cols {
            z[(n - 1, j)] = rhs[(n - 1, j)] / r[(n - 1, n - 1)];
        }
        for i in (0..n.saturating_sub(1)).rev() {
            for j in 0..b.cols {
                let mut v = rhs[(i, j)];
                for k in i + 1..n {
                    v -= r[(i, k)] * z[(k, j)];
                }
                z[(i, j)] = v / r[(i, i)];
            }
        }

        p.mul_into(x, &z);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Matrix, b: &Matrix, tol: f64) {
        assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
        for i in 0..a.rows() {
            for j in 0..a.cols() {
                assert!(
                    (a[(i, j)] - b[(i, j)]).abs() < tol,
                    "mismatch at ({i},{j}): {} vs {}",
                    a[(i, j)],
                    b[(i, j)]
                );
            }
        }
    }

    #[test]
    fn inverse_times_original_is_identity() {
        let m = Matrix::from_values(3, 3, &[2.0, 1.0, 0.0, 1.0, 3.0, 1.0, 0.0, 1.0, 2.0]);
        let inv = m.invert().unwrap();
        assert_close(&(&m * &inv), &Matrix::identity(3), 1E-12);

        let mut in_place = m.clone();
        in_place.invert_in_place().unwrap();
        assert_close(&in_place, &inv, 1E-12);
    }

    #[test]
    fn inversion_pivots_through_zero_diagonal() {
        let m = Matrix::from_values(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let inv = m.invert().unwrap();
        assert_close(&inv, &m, 1E-12);
    }

    #[test]
    fn singular_matrix_is_an_error() {
        let m = Matrix::from_values(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert_eq!(m.invert().unwrap_err(), Error::SingularMatrix);
    }

    #[test]
    fn diagonal_inverse() {
        let mut m = Matrix::from_values(2, 2, &[4.0, 0.0, 0.0, 0.5]);
        m.invert_diagonal_in_place();
        assert_eq!(m[(0, 0)], 0.25);
        assert_eq!(m[(1, 1)], 2.0);
    }

    #[test]
    fn least_squares_exact_system() {
        let a = Matrix::from_values(3, 3, &[1.0, 2.0, 0.0, 0.0, 1.0, 1.0, 2.0, 0.0, 1.0]);
        let truth = Matrix::column(&[1.0, -2.0, 3.0]);
        let b = &a * &truth;
        let x = a.least_squares_qr_pivot(&b).unwrap();
        assert_close(&x, &truth, 1E-10);
    }

    #[test]
    fn least_squares_overdetermined() {
        // y = 2 + 3t sampled without noise at four points
        let a = Matrix::from_values(
            4,
            2,
            &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0],
        );
        let b = Matrix::column(&[2.0, 5.0, 8.0, 11.0]);
        let x = a.least_squares_qr_pivot(&b).unwrap();
        assert!((x[(0, 0)] - 2.0).abs() < 1E-10);
        assert!((x[(1, 0)] - 3.0).abs() < 1E-10);
    }

    #[test]
    fn least_squares_matches_normal_equations() {
        use rand::{rngs::SmallRng, Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(7);
        let mut a = Matrix::new(8, 3);
        let mut b = Matrix::new(8, 1);
        for i in 0..8 {
            for j in 0..3 {
                a[(i, j)] = rng.random_range(-1.0..1.0);
            }
            b[(i, 0)] = rng.random_range(-10.0..10.0);
        }

        let x = a.least_squares_qr_pivot(&b).unwrap();

        let at = a.transpose();
        let x_normal = &(&at * &a).invert().unwrap() * &(&at * &b);
        assert_close(&x, &x_normal, 1E-9);
    }

    #[test]
    fn least_squares_rank_deficient_is_an_error() {
        let a = Matrix::from_values(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let b = Matrix::column(&[1.0, 2.0, 3.0]);
        assert_eq!(
            a.least_squares_qr_pivot(&b).unwrap_err(),
            Error::SingularMatrix
        );

        // the rank check scales with the matrix
        let big = Matrix::from_values(
            3,
            2,
            &[1.0E9, 2.0E9, 2.0E9, 4.0E9, 3.0E9, 6.0E9],
        );
        assert_eq!(
            big.least_squares_qr_pivot(&b).unwrap_err(),
            Error::SingularMatrix
        );
    }
}
