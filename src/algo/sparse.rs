//! Compressed sparse row matrix used to assemble least-squares systems.
//!
//! The deformation solver builds its point and Laplacian operators from
//! triplets, then forms the small dense normal equations `AᵗA` and `Aᵗb`
//! from them.

use nalgebra::{DMatrix, DVector};

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the range of row `i` in `col_idx`/`values`.
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries at the same position are summed. Triplets outside
    /// the `rows x cols` shape are dropped.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.retain(|&(r, c, _)| r < rows && c < cols);
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_counts = vec![0usize; rows];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            match values.last_mut() {
                Some(acc) if last == Some((row, col)) => *acc += val,
                _ => {
                    col_idx.push(col);
                    values.push(val);
                    row_counts[row] += 1;
                    last = Some((row, col));
                }
            }
        }

        let mut row_ptr = Vec::with_capacity(rows + 1);
        row_ptr.push(0);
        for count in row_counts {
            let start = row_ptr[row_ptr.len() - 1];
            row_ptr.push(start + count);
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over `(col, value)` of one row.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()].iter().copied().zip(self.values[range].iter().copied())
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.cols, "vector dimension mismatch");
        DVector::from_iterator(
            self.rows,
            (0..self.rows).map(|i| self.row(i).map(|(c, v)| v * x[c]).sum::<f64>()),
        )
    }

    /// Multiply the transpose by a vector: y = Aᵗ * x.
    pub fn transpose_mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(x.len(), self.rows, "vector dimension mismatch");
        let mut y = DVector::zeros(self.cols);
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                y[c] += v * x[i];
            }
        }
        y
    }

    /// Dense Gram matrix AᵗA.
    pub fn gram(&self) -> DMatrix<f64> {
        let mut g = DMatrix::zeros(self.cols, self.cols);
        for i in 0..self.rows {
            for (a, va) in self.row(i) {
                for (b, vb) in self.row(i) {
                    g[(a, b)] += va * vb;
                }
            }
        }
        g
    }

    /// Dense copy of the matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for (c, v) in self.row(i) {
                m[(i, c)] += v;
            }
        }
        m
    }
}
