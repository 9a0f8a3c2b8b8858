//! Access to the entries of a kernel matrix
use rlst::RlstScalar;

/// A dense matrix given entry by entry.
///
/// Indices are always natural (external) row and column numbers. The
/// hierarchical matrix only ever reads the matrix through this interface,
/// so implementations must be pure: the same `(i, j)` gives the same value.
pub trait KernelMatrix: Sync {
    /// Scalar type
    type T: RlstScalar;

    /// Number of rows
    fn nrows(&self) -> usize;

    /// Number of columns
    fn ncols(&self) -> usize;

    /// The entry in row `i` and column `j`
    fn coefficient(&self, i: usize, j: usize) -> Self::T;

    /// Copy the submatrix `rows x cols` into `output` in column-major order.
    fn submatrix(&self, rows: &[usize], cols: &[usize], output: &mut [Self::T]) {
        assert_eq!(
            output.len(),
            rows.len() * cols.len(),
            "Output buffer does not match the submatrix size."
        );
        let nrows = rows.len();
        for (col_index, col) in cols.iter().enumerate() {
            for (value, row) in output[col_index * nrows..(col_index + 1) * nrows]
                .iter_mut()
                .zip(rows)
            {
                *value = self.coefficient(*row, *col);
            }
        }
    }
}
