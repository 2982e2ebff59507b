//! Dense matrix kernel.
//!
//! Every arithmetic operation exists in two call shapes: an owning form
//! that allocates the result, and an `_into` form writing into a
//! pre-sized buffer for hot paths. Shape mismatches are programming
//! errors and assert, they are not runtime-recoverable conditions.

mod decompose;
mod solve;

pub use decompose::SymmetricEigen;

/// Dense, row-major matrix of f64 with an explicit shape fixed at
/// construction (until [Matrix::set_size] / [Matrix::resize]).
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-initialized matrix of the requested shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Matrix with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Identity matrix of order `n`.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::new(n, n);
        m.set_identity();
        m
    }

    /// Column vector (n × 1) from a slice.
    pub fn column(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// Matrix of the requested shape filled row-by-row from `values`.
    pub fn from_values(rows: usize, cols: usize, values: &[f64]) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        Self {
            rows,
            cols,
            data: values.to_vec(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Reshapes the matrix, discarding all contents (zero refill).
    pub fn set_size(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, 0.0);
    }

    /// Reshapes the matrix, keeping the overlapping region and
    /// zero-filling any new cells.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows.min(self.rows) {
            for j in 0..cols.min(self.cols) {
                data[i * cols + j] = self.data[i * self.cols + j];
            }
        }
        self.rows = rows;
        self.cols = cols;
        self.data = data;
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
    }

    pub fn set_identity(&mut self) {
        for i in 0..self.rows {
            for j in 0..self.cols {
                self.data[i * self.cols + j] = if i == j { 1.0 } else { 0.0 };
            }
        }
    }

    /// Sum of the main-diagonal values.
    pub fn trace(&self) -> f64 {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).sum()
    }

    /// Copies the inclusive block [row_start..=row_end] × [col_start..=col_end].
    pub fn submatrix(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Matrix {
        let mut out = Matrix::new(row_end - row_start + 1, col_end - col_start + 1);
        self.submatrix_into(&mut out, row_start, row_end, col_start, col_end);
        out
    }

    /// Buffer-writing counterpart of [Self::submatrix].
    pub fn submatrix_into(
        &self,
        out: &mut Matrix,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) {
        debug_assert_eq!(out.rows, row_end - row_start + 1);
        debug_assert_eq!(out.cols, col_end - col_start + 1);
        for (r, i) in (row_start..=row_end).enumerate() {
            for (c, j) in (col_start..=col_end).enumerate() {
                out[(r, c)] = self[(i, j)];
            }
        }
    }

    /// Gathers the listed rows and columns into a new matrix.
    pub fn select(&self, row_indices: &[usize], col_indices: &[usize]) -> Matrix {
        let mut out = Matrix::new(row_indices.len(), col_indices.len());
        for (r, &i) in row_indices.iter().enumerate() {
            for (c, &j) in col_indices.iter().enumerate() {
                out[(r, c)] = self[(i, j)];
            }
        }
        out
    }

    /// Writes `values` as a block with its top-left cell at (row_start, col_start).
    pub fn set_submatrix(&mut self, row_start: usize, col_start: usize, values: &Matrix) {
        debug_assert!(row_start + values.rows <= self.rows);
        debug_assert!(col_start + values.cols <= self.cols);
        for i in 0..values.rows {
            for j in 0..values.cols {
                self[(row_start + i, col_start + j)] = values[(i, j)];
            }
        }
    }

    pub fn negate(&self) -> Matrix {
        let mut out = Matrix::new(self.rows, self.cols);
        self.negate_into(&mut out);
        out
    }

    pub fn negate_into(&self, out: &mut Matrix) {
        debug_assert_eq!((out.rows, out.cols), (self.rows, self.cols));
        for (o, v) in out.data.iter_mut().zip(self.data.iter()) {
            *o = -v;
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::new(self.cols, self.rows);
        self.transpose_into(&mut out);
        out
    }

    pub fn transpose_into(&self, out: &mut Matrix) {
        debug_assert_eq!((out.rows, out.cols), (self.cols, self.rows));
        for i in 0..self.rows {
            for j in 0..self.cols {
                out[(j, i)] = self[(i, j)];
            }
        }
    }

    pub fn scale(&self, value: f64) -> Matrix {
        let mut out = self.clone();
        out.scale_mut(value);
        out
    }

    pub fn scale_into(&self, out: &mut Matrix, value: f64) {
        debug_assert_eq!((out.rows, out.cols), (self.rows, self.cols));
        for (o, v) in out.data.iter_mut().zip(self.data.iter()) {
            *o = v * value;
        }
    }

    pub fn scale_mut(&mut self, value: f64) {
        for v in self.data.iter_mut() {
            *v *= value;
        }
    }

    pub fn add_scalar(&self, value: f64) -> Matrix {
        let mut out = self.clone();
        out.add_scalar_mut(value);
        out
    }

    pub fn add_scalar_mut(&mut self, value: f64) {
        for v in self.data.iter_mut() {
            *v += value;
        }
    }

    pub fn add_into(&self, out: &mut Matrix, rhs: &Matrix) {
        debug_assert_eq!((self.rows, self.cols), (rhs.rows, rhs.cols));
        debug_assert_eq!((out.rows, out.cols), (self.rows, self.cols));
        for i in 0..self.data.len() {
            out.data[i] = self.data[i] + rhs.data[i];
        }
    }

    pub fn add_mut(&mut self, rhs: &Matrix) {
        debug_assert_eq!((self.rows, self.cols), (rhs.rows, rhs.cols));
        for (v, r) in self.data.iter_mut().zip(rhs.data.iter()) {
            *v += r;
        }
    }

    pub fn sub_into(&self, out: &mut Matrix, rhs: &Matrix) {
        debug_assert_eq!((self.rows, self.cols), (rhs.rows, rhs.cols));
        debug_assert_eq!((out.rows, out.cols), (self.rows, self.cols));
        for i in 0..self.data.len() {
            out.data[i] = self.data[i] - rhs.data[i];
        }
    }

    pub fn sub_mut(&mut self, rhs: &Matrix) {
        debug_assert_eq!((self.rows, self.cols), (rhs.rows, rhs.cols));
        for (v, r) in self.data.iter_mut().zip(rhs.data.iter()) {
            *v -= r;
        }
    }

    pub fn mul_into(&self, out: &mut Matrix, rhs: &Matrix) {
        debug_assert_eq!(self.cols, rhs.rows);
        debug_assert_eq!((out.rows, out.cols), (self.rows, rhs.cols));
        for i in 0..self.rows {
            for j in 0..rhs.cols {
                let mut acc = 0.0;
                for k in 0..self.cols {
                    acc += self[(i, k)] * rhs[(k, j)];
                }
                out[(i, j)] = acc;
            }
        }
    }

    /// `self · rhsᵀ` without materializing the transpose.
    pub fn mul_transpose(&self, rhs: &Matrix) -> Matrix {
        let mut out = Matrix::new(self.rows, rhs.rows);
        self.mul_transpose_into(&mut out, rhs);
        out
    }

    pub fn mul_transpose_into(&self, out: &mut Matrix, rhs: &Matrix) {
        debug_assert_eq!(self.cols, rhs.cols);
        debug_assert_eq!((out.rows, out.cols), (self.rows, rhs.rows));
        for i in 0..self.rows {
            for j in 0..rhs.rows {
                let mut acc = 0.0;
                for k in 0..self.cols {
                    acc += self[(i, k)] * rhs[(j, k)];
                }
                out[(i, j)] = acc;
            }
        }
    }

    /// Frobenius-style norm of an n×1 / 1×n vector, used as step size
    /// in the iterative solvers.
    pub fn vector_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    // row/column elementary operations shared by the factorizations

    pub(crate) fn swap_rows(&mut self, r1: usize, r2: usize) {
        for j in 0..self.cols {
            self.data.swap(r1 * self.cols + j, r2 * self.cols + j);
        }
    }

    pub(crate) fn swap_cols(&mut self, c1: usize, c2: usize) {
        for i in 0..self.rows {
            self.data.swap(i * self.cols + c1, i * self.cols + c2);
        }
    }

    pub(crate) fn scale_row(&mut self, row: usize, scalar: f64) {
        for j in 0..self.cols {
            self.data[row * self.cols + j] *= scalar;
        }
    }

    /// row1 += scalar × row2
    pub(crate) fn shear_row(&mut self, row1: usize, row2: usize, scalar: f64) {
        for j in 0..self.cols {
            let v = self.data[row2 * self.cols + j];
            self.data[row1 * self.cols + j] += scalar * v;
        }
    }
}

impl std::ops::Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[row * self.cols + col]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        &mut self.data[row * self.cols + col]
    }
}

impl std::ops::Add for &Matrix {
    type Output = Matrix;

    fn add(self, rhs: &Matrix) -> Matrix {
        let mut out = Matrix::new(self.rows, self.cols);
        self.add_into(&mut out, rhs);
        out
    }
}

impl std::ops::Sub for &Matrix {
    type Output = Matrix;

    fn sub(self, rhs: &Matrix) -> Matrix {
        let mut out = Matrix::new(self.rows, self.cols);
        self.sub_into(&mut out, rhs);
        out
    }
}

impl std::ops::Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: &Matrix) -> Matrix {
        let mut out = Matrix::new(self.rows, rhs.cols);
        self.mul_into(&mut out, rhs);
        out
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for i in 0..self.rows {
            for j in 0..self.cols {
                write!(f, "{:>14.6e} ", self[(i, j)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_indexing() {
        let m = Matrix::from_values(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 2)], 6.0);
        assert_eq!(m.trace(), 6.0);
    }

    #[test]
    fn resize_preserves_overlap() {
        let mut m = Matrix::from_values(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        m.resize(3, 3);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 1)], 4.0);
        assert_eq!(m[(2, 2)], 0.0);

        m.set_size(2, 2);
        assert_eq!(m[(0, 0)], 0.0);
    }

    #[test]
    fn arithmetic_shapes_agree() {
        let a = Matrix::from_values(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::identity(2);

        assert_eq!(&a * &b, a);
        assert_eq!(&a - &a, Matrix::new(2, 2));
        let sum = &a + &a;
        assert_eq!(sum, a.scale(2.0));

        let mut buf = Matrix::new(2, 2);
        a.mul_into(&mut buf, &b);
        assert_eq!(buf, a);
    }

    #[test]
    fn multiply_by_transpose() {
        let a = Matrix::from_values(2, 3, &[1.0, 0.0, 2.0, -1.0, 3.0, 1.0]);
        let direct = a.mul_transpose(&a);
        let via_transpose = &a * &a.transpose();
        assert_eq!(direct, via_transpose);
    }

    #[test]
    fn submatrix_block() {
        let m = Matrix::from_values(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let block = m.submatrix(1, 2, 0, 1);
        assert_eq!(block, Matrix::from_values(2, 2, &[4.0, 5.0, 7.0, 8.0]));

        let picked = m.select(&[0, 2], &[2]);
        assert_eq!(picked, Matrix::from_values(2, 1, &[3.0, 9.0]));

        let mut m = m;
        m.set_submatrix(0, 0, &Matrix::new(2, 2));
        assert_eq!(m[(0, 0)], 0.0);
        assert_eq!(m[(1, 1)], 0.0);
        assert_eq!(m[(2, 2)], 9.0);
    }
}
