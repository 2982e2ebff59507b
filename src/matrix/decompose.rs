//! Matrix factorizations: symmetric eigendecomposition, LU, QR (plain
//! and column-pivoted), Cholesky (plain, LDL and rank-one update).

use super::Matrix;
use crate::error::Error;

/// Result of [Matrix::symmetric_eigen]: eigenvalues in ascending order
/// with the matching eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues, ascending.
    pub values: Vec<f64>,
    /// Column k is the unit eigenvector for `values[k]`.
    pub vectors: Matrix,
}

impl Matrix {
    /// Eigendecomposition of a symmetric matrix: Householder reduction
    /// to tridiagonal form followed by the implicit-shift QL iteration
    /// (EISPACK tred2/tql2 lineage). Asymmetric input is rejected.
    pub fn symmetric_eigen(&self) -> Result<SymmetricEigen, Error> {
        let n = self.rows;
        debug_assert_eq!(n, self.cols);

        let mut vectors = Matrix::new(n, n);
        for i in 0..n {
            for j in 0..n {
                if self[(i, j)] != self[(j, i)] {
                    return Err(Error::NotSymmetric);
                }
                vectors[(i, j)] = self[(i, j)];
            }
        }

        // d holds the evolving diagonal, e the off-diagonal scratch
        let mut d = vec![0.0; n];
        let mut e = vec![0.0; n];
        for j in 0..n {
            d[j] = vectors[(n - 1, j)];
        }

        // Householder reduction to tridiagonal form
        for i in (1..n).rev() {
            // scale to avoid under/overflow
            let mut scale = 0.0;
            let mut h = 0.0;
            for dk in d.iter().take(i) {
                scale += dk.abs();
            }

            if scale == 0.0 {
                e[i] = d[i - 1];
                for j in 0..i {
                    d[j] = vectors[(i - 1, j)];
                    vectors[(i, j)] = 0.0;
                    vectors[(j, i)] = 0.0;
                }
            } else {
                for dk in d.iter_mut().take(i) {
                    *dk /= scale;
                    h += *dk * *dk;
                }

                let mut f = d[i - 1];
                let mut g = h.sqrt();
                if f > 0.0 {
                    g = -g;
                }
                e[i] = scale * g;
                h -= f * g;
                d[i - 1] = f - g;
                for ej in e.iter_mut().take(i) {
                    *ej = 0.0;
                }

                // similarity transformation on the remaining columns
                for j in 0..i {
                    f = d[j];
                    vectors[(j, i)] = f;
                    g = e[j] + vectors[(j, j)] * f;
                    for k in j + 1..i {
                        g += vectors[(k, j)] * d[k];
                        e[k] += vectors[(k, j)] * f;
                    }
                    e[j] = g;
                }

                f = 0.0;
                for j in 0..i {
                    e[j] /= h;
                    f += e[j] * d[j];
                }
                let hh = f / (h + h);
                for j in 0..i {
                    e[j] -= hh * d[j];
                }

                for j in 0..i {
                    f = d[j];
                    let g = e[j];
                    for k in j..i {
                        vectors[(k, j)] -= f * e[k] + g * d[k];
                    }
                    d[j] = vectors[(i - 1, j)];
                    vectors[(i, j)] = 0.0;
                }
            }

            d[i] = h;
        }

        // accumulate the Householder transformations
        for i in 0..n.saturating_sub(1) {
            vectors[(n - 1, i)] = vectors[(i, i)];
            vectors[(i, i)] = 1.0;
            let h = d[i + 1];

            if h != 0.0 {
                for k in 0..=i {
                    d[k] = vectors[(k, i + 1)] / h;
                }
                for j in 0..=i {
                    let mut g = 0.0;
                    for k in 0..=i {
                        g += vectors[(k, i + 1)] * vectors[(k, j)];
                    }
                    for k in 0..=i {
                        vectors[(k, j)] -= g * d[k];
                    }
                }
            }

            for k in 0..=i {
                vectors[(k, i + 1)] = 0.0;
            }
        }

        for j in 0..n {
            d[j] = vectors[(n - 1, j)];
            vectors[(n - 1, j)] = 0.0;
        }
        vectors[(n - 1, n - 1)] = 1.0;
        e[0] = 0.0;

        // implicit-shift QL iteration on the tridiagonal form
        for i in 1..n {
            e[i - 1] = e[i];
        }
        e[n - 1] = 0.0;

        let mut f = 0.0;
        let mut tst1: f64 = 0.0;
        let eps = 2.0_f64.powi(-52);

        for l in 0..n {
            tst1 = tst1.max(d[l].abs() + e[l].abs());
            let mut m = l;
            while m < n {
                if e[m].abs() <= eps * tst1 {
                    break;
                }
                m += 1;
            }

            // if m == l, d[l] already is an eigenvalue
            if m > l {
                loop {
                    // implicit shift
                    let mut g = d[l];
                    let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                    let mut r = p.hypot(1.0);
                    if p < 0.0 {
                        r = -r;
                    }
                    d[l] = e[l] / (p + r);
                    d[l + 1] = e[l] * (p + r);
                    let dl1 = d[l + 1];
                    let mut h = g - d[l];
                    for dk in d.iter_mut().take(n).skip(l + 2) {
                        *dk -= h;
                    }
                    f += h;

                    // QL transformation
                    p = d[m];
                    let mut c = 1.0;
                    let mut c2 = c;
                    let mut c3 = c;
                    let el1 = e[l + 1];
                    let mut s = 0.0;
                    let mut s2 = 0.0;

                    for i in (l..m).rev() {
                        c3 = c2;
                        c2 = c;
                        s2 = s;
                        g = c * e[i];
                        h = c * p;
                        r = p.hypot(e[i]);
                        e[i + 1] = s * r;
                        s = e[i] / r;
                        c = p / r;
                        p = c * d[i] - s * g;
                        d[i + 1] = h + s * (c * g + s * d[i]);

                        for k in 0..n {
                            h = vectors[(k, i + 1)];
                            vectors[(k, i + 1)] = s * vectors[(k, i)] + c * h;
                            vectors[(k, i)] = c * vectors[(k, i)] - s * h;
                        }
                    }

                    p = -s * s2 * c3 * el1 * e[l] / dl1;
                    e[l] = s * p;
                    d[l] = c * p;

                    if e[l].abs() <= eps * tst1 {
                        break;
                    }
                }
            }

            d[l] += f;
            e[l] = 0.0;
        }

        // sort ascending, permuting the eigenvector columns along
        for i in 0..n.saturating_sub(1) {
            let mut k = i;
            let mut p = d[i];
            for j in i + 1..n {
                if d[j] < p {
                    k = j;
                    p = d[j];
                }
            }
            if k != i {
                d.swap(i, k);
                vectors.swap_cols(i, k);
            }
        }

        Ok(SymmetricEigen {
            values: d,
            vectors,
        })
    }

    /// Principal square root of a symmetric positive semi-definite
    /// matrix, via `V · sqrt(E) · Vᵀ`.
    pub fn matrix_sqrt(&self) -> Result<Matrix, Error> {
        let eig = self.symmetric_eigen()?;
        let mut scaled = eig.vectors.clone();
        for (j, value) in eig.values.iter().enumerate() {
            let s = value.sqrt();
            for i in 0..scaled.rows {
                scaled[(i, j)] *= s;
            }
        }
        Ok(scaled.mul_transpose(&eig.vectors))
    }

    /// Doolittle LU factorization without pivoting: `self = L · U` with
    /// a unit lower-triangular L.
    pub fn lu(&self) -> (Matrix, Matrix) {
        let mut lu = self.clone();
        let bound = self.rows.min(self.cols).saturating_sub(1);

        for i in 0..bound {
            for j in i + 1..self.rows {
                let multiplier = lu[(j, i)] / lu[(i, i)];
                lu[(j, i)] = multiplier;
                for k in i + 1..self.cols {
                    let v = lu[(i, k)];
                    lu[(j, k)] -= multiplier * v;
                }
            }
        }
        if self.rows > self.cols {
            for i in self.cols + 1..self.rows {
                lu[(i, self.cols - 1)] /= lu[(self.cols - 1, self.cols - 1)];
            }
        }

        Self::split_lu(&lu)
    }

    /// Partially-pivoted LU (left-looking Crout/Doolittle). Returns
    /// `(L, U, rows)` where `rows[i]` is the source row of row i, so
    /// that `self[rows] = L · U`.
    pub fn lu_pivoted(&self) -> (Matrix, Matrix, Vec<usize>) {
        let mut lu = self.clone();
        let mut rows: Vec<usize> = (0..self.rows).collect();

        for j in 0..self.cols {
            // apply previous transformations
            for i in 0..self.rows {
                let bound = i.min(j);
                let mut acc = 0.0;
                for k in 0..bound {
                    acc += lu[(i, k)] * lu[(k, j)];
                }
                lu[(i, j)] -= acc;
            }

            let mut p = j;
            for i in j + 1..self.rows {
                if lu[(i, j)].abs() > lu[(p, j)].abs() {
                    p = i;
                }
            }
            if p != j {
                lu.swap_rows(p, j);
                rows.swap(p, j);
            }

            if j < self.rows && lu[(j, j)] != 0.0 {
                for i in j + 1..self.rows {
                    let pivot = lu[(j, j)];
                    lu[(i, j)] /= pivot;
                }
            }
        }

        let (l, u) = Self::split_lu(&lu);
        (l, u, rows)
    }

    fn split_lu(lu: &Matrix) -> (Matrix, Matrix) {
        let mut l = Matrix::new(lu.rows, lu.cols);
        let mut u = Matrix::new(lu.rows, lu.cols);
        for i in 0..lu.rows {
            for j in 0..lu.cols {
                if i > j {
                    l[(i, j)] = lu[(i, j)];
                } else {
                    if i == j {
                        l[(i, j)] = 1.0;
                    }
                    u[(i, j)] = lu[(i, j)];
                }
            }
        }
        (l, u)
    }

    /// Householder QR factorization: `self = Q · R` with Q orthogonal
    /// (rows × rows) and R upper triangular (rows × cols).
    pub fn qr(&self) -> (Matrix, Matrix) {
        let mut q = Matrix::identity(self.rows);
        let mut r = self.clone();
        let mut v = vec![0.0; self.rows];

        for i in 0..self.cols {
            if !Self::householder_column(&mut r, &mut v, i) {
                continue;
            }
            Self::apply_householder(&mut q, &mut r, &v, i);
        }

        (q, r)
    }

    /// Column-pivoted Householder QR: `self · P = Q · R`, with columns
    /// chosen greedily by remaining norm so the R diagonal decreases in
    /// magnitude. Returns `(Q, R, P)`.
    pub fn qr_pivoted(&self) -> (Matrix, Matrix, Matrix) {
        let mut q = Matrix::identity(self.rows);
        let mut r = self.clone();
        let mut pivots = Matrix::identity(self.cols);
        let mut v = vec![0.0; self.rows];

        let mut norms = vec![0.0; self.cols];
        for (j, norm) in norms.iter_mut().enumerate() {
            let mut acc = 0.0;
            for i in 0..self.rows {
                acc += self[(i, j)] * self[(i, j)];
            }
            *norm = acc.sqrt();
        }

        for i in 0..self.cols {
            // bring the remaining column with the largest norm up front
            let mut largest = 0.0;
            let mut swap = i;
            for (j, &norm) in norms.iter().enumerate().skip(i) {
                if norm > largest {
                    largest = norm;
                    swap = j;
                }
            }
            if swap != i {
                r.swap_cols(i, swap);
                pivots.swap_cols(i, swap);
                norms.swap(i, swap);
            }

            if !Self::householder_column(&mut r, &mut v, i) {
                continue;
            }
            Self::apply_householder(&mut q, &mut r, &v, i);

            // refresh the norms of the untouched columns
            for (j, norm) in norms.iter_mut().enumerate().skip(i + 1) {
                let mut acc = 0.0;
                for k in i + 1..self.rows {
                    acc += r[(k, j)] * r[(k, j)];
                }
                *norm = acc.sqrt();
            }
        }

        (q, r, pivots)
    }

    /// Builds the scaled Householder vector for column i of `r` into
    /// `v`. Returns false when the column is already triangular.
    fn householder_column(r: &mut Matrix, v: &mut [f64], i: usize) -> bool {
        let mut all_zeros = true;
        v.fill(0.0);
        for j in i..r.rows {
            if j != i && r[(j, i)] != 0.0 {
                all_zeros = false;
            }
            v[j] = r[(j, i)];
        }
        if all_zeros {
            return false;
        }

        let mut norm2 = 0.0;
        for j in i..r.rows {
            norm2 += r[(j, i)] * r[(j, i)];
        }
        v[i] += if r[(i, i)] >= 0.0 {
            norm2.sqrt()
        } else {
            -norm2.sqrt()
        };

        let mut vnorm2 = 0.0;
        for &vj in v.iter().take(r.rows).skip(i) {
            vnorm2 += vj * vj;
        }
        let normalize = (2.0 / vnorm2).sqrt();
        for vj in v.iter_mut().take(r.rows).skip(i) {
            *vj *= normalize;
        }
        true
    }

    /// Applies the reflector `I - v·vᵀ` to R from the left and folds it
    /// into Q from the right, then clears the annihilated cells.
    fn apply_householder(q: &mut Matrix, r: &mut Matrix, v: &[f64], i: usize) {
        for j in 0..r.cols {
            let mut w = 0.0;
            for k in i..r.rows {
                w += v[k] * r[(k, j)];
            }
            for k in i..r.rows {
                r[(k, j)] -= v[k] * w;
            }
        }
        for row in 0..q.rows {
            let mut w = 0.0;
            for k in i..q.cols {
                w += q[(row, k)] * v[k];
            }
            for k in i..q.cols {
                q[(row, k)] -= w * v[k];
            }
        }
        // rounding errors leave dust below the diagonal
        for j in i + 1..r.rows {
            r[(j, i)] = 0.0;
        }
    }

    /// Lower-triangular Cholesky factor L with `self = L · Lᵀ`. Errors
    /// when a diagonal pivot is not strictly positive.
    pub fn cholesky(&self) -> Result<Matrix, Error> {
        let mut l = self.clone();

        for i in 0..self.rows {
            for j in i..self.cols {
                let mut total = l[(i, j)];
                for k in (0..i).rev() {
                    total -= l[(i, k)] * l[(j, k)];
                }
                if i == j {
                    if total <= 0.0 {
                        return Err(Error::NotPositiveDefinite);
                    }
                    l[(i, i)] = total.sqrt();
                } else {
                    l[(j, i)] = total / l[(i, i)];
                }
            }
        }

        for i in 0..self.rows {
            for j in i + 1..self.cols {
                l[(i, j)] = 0.0;
            }
        }
        Ok(l)
    }

    /// LDL variant of the Cholesky decomposition, eliminating from the
    /// bottom row up: `self = Lᵀ · D · L` with a unit lower-triangular
    /// L and diagonal D. Errors on a non-positive pivot.
    pub fn cholesky_ldl(&self) -> Result<(Matrix, Matrix), Error> {
        let mut l = Matrix::new(self.rows, self.cols);
        let mut d = Matrix::new(self.rows, self.cols);
        let mut q = self.clone();

        for i in (0..self.rows).rev() {
            if q[(i, i)] <= 0.0 {
                return Err(Error::NotPositiveDefinite);
            }
            d[(i, i)] = q[(i, i)];
            let inv_sqrt = 1.0 / q[(i, i)].sqrt();
            for j in 0..=i {
                l[(i, j)] = q[(i, j)] * inv_sqrt;
            }

            for j in 0..i {
                for k in 0..=j {
                    let delta = l[(i, k)] * l[(i, j)];
                    q[(j, k)] -= delta;
                }
            }

            let inv_diag = 1.0 / l[(i, i)];
            for j in 0..=i {
                l[(i, j)] *= inv_diag;
            }
        }

        Ok((l, d))
    }

    /// Rank-one update of a lower Cholesky factor: after the call,
    /// `self · selfᵀ` equals the old product plus
    /// `weight · update · updateᵀ` (a downdate when `weight` is
    /// negative). `update` is consumed as scratch.
    pub fn cholesky_update(&mut self, update: &mut Matrix, weight: f64) {
        let grow = weight >= 0.0;
        let scale = weight.abs().sqrt();

        for col in 0..update.cols {
            for i in 0..update.rows {
                update[(i, col)] *= scale;
            }

            // one plane rotation per pivot, circular when growing and
            // hyperbolic when shrinking
            for i in 0..self.rows {
                let diag = self[(i, i)];
                let x = update[(i, col)];
                let pivot = if grow {
                    (diag * diag + x * x).sqrt()
                } else {
                    (diag * diag - x * x).sqrt()
                };
                let c = pivot / diag;
                let s = x / diag;
                self[(i, i)] = pivot;

                for j in i + 1..self.rows {
                    let lji = self[(j, i)];
                    let uj = update[(j, col)];
                    self[(j, i)] = if grow {
                        (lji + s * uj) / c
                    } else {
                        (lji - s * uj) / c
                    };
                    update[(j, col)] = c * uj - s * self[(j, i)];
                }
            }
        }
    }
}
