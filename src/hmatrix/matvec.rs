//! Matrix-vector products
use super::HMatrix;
use crate::traits::Exchange;
use crate::types::{convert_layout, BatchLayout, HMatrixError, Result, Symmetry};
use rlst::RlstScalar;

impl<T: RlstScalar> HMatrix<T> {
    fn check_group<C: Exchange<T>>(&self, comm: &C) -> Result<()> {
        if comm.size() != self.master_offsets.len() || comm.rank() != self.process {
            return Err(HMatrixError::PartitionMismatch(format!(
                "Matrix built for process {} of {} used on process {} of {}.",
                self.process,
                self.master_offsets.len(),
                comm.rank(),
                comm.size()
            )));
        }
        Ok(())
    }

    /// Contributions of the local blocks for `mu` interleaved column vectors in
    /// cluster numbering.
    ///
    /// Without symmetry the result covers the local rows only. With symmetry
    /// the mirrored blocks reach rows of other processes, so the result covers
    /// all rows.
    fn local_contributions(&self, x: &[T], mu: usize) -> Vec<T> {
        let symmetric = self.symmetry != Symmetry::None;
        let (base, nrows) = if symmetric {
            (0, self.nrows())
        } else {
            (self.local_row_offset(), self.local_row_count())
        };
        let conjugate = self.symmetry == Symmetry::Hermitian;

        let mut y = vec![T::zero(); nrows * mu];
        for block in &self.blocks {
            let (rows, cols) = (
                block.row_offset()..block.row_offset() + block.row_size(),
                block.col_offset()..block.col_offset() + block.col_size(),
            );
            block.accumulate(
                &x[cols.start * mu..cols.end * mu],
                &mut y[(rows.start - base) * mu..(rows.end - base) * mu],
                mu,
            );
            if symmetric && block.row_node() != block.col_node() {
                block.accumulate_transpose(
                    &x[rows.start * mu..rows.end * mu],
                    &mut y[cols.start * mu..cols.end * mu],
                    mu,
                    conjugate,
                );
            }
        }
        y
    }

    /// Product for `mu` interleaved vectors in cluster numbering, returning all
    /// rows on every process.
    fn cluster_product<C: Exchange<T>>(&self, x: &[T], mu: usize, comm: &C) -> Result<Vec<T>> {
        let mut partial = self.local_contributions(x, mu);
        if self.symmetry != Symmetry::None {
            comm.all_reduce_sum(&mut partial)?;
            return Ok(partial);
        }
        let counts = self
            .master_offsets
            .iter()
            .map(|slice| slice.size * mu)
            .collect::<Vec<_>>();
        let mut y = vec![T::zero(); self.nrows() * mu];
        comm.all_gather_varcount(&partial, &counts, &mut y)?;
        Ok(y)
    }

    /// `y = A x` for `mu` contiguous vectors in natural numbering.
    ///
    /// Every process passes the full input and receives the full result.
    pub fn matvec<C: Exchange<T>>(&self, x: &[T], y: &mut [T], mu: usize, comm: &C) -> Result<()> {
        self.matvec_with_layout(x, y, mu, BatchLayout::Contiguous, comm)
    }

    /// `y = A x` for `mu` vectors in natural numbering stored with `layout`.
    pub fn matvec_with_layout<C: Exchange<T>>(
        &self,
        x: &[T],
        y: &mut [T],
        mu: usize,
        layout: BatchLayout,
        comm: &C,
    ) -> Result<()> {
        self.check_group(comm)?;
        if x.len() != self.ncols() * mu || y.len() != self.nrows() * mu {
            return Err(HMatrixError::InvalidInput(format!(
                "A {}x{} matrix cannot map {} entries to {} entries for {} vectors.",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len(),
                mu
            )));
        }
        let mut x_cluster = vec![T::zero(); x.len()];
        self.cols
            .to_cluster_with_layout(x, layout, &mut x_cluster, BatchLayout::Interleaved, mu);
        let y_cluster = self.cluster_product(&x_cluster, mu, comm)?;
        self.rows
            .to_natural_with_layout(&y_cluster, BatchLayout::Interleaved, y, layout, mu);
        Ok(())
    }

    /// Row-restricted product of a square matrix in cluster numbering.
    ///
    /// `x` and `y` hold the owned rows of `mu` contiguous vectors. The input
    /// slices of all processes are gathered, the output stays local.
    pub fn matvec_local<C: Exchange<T>>(
        &self,
        x: &[T],
        y: &mut [T],
        mu: usize,
        comm: &C,
    ) -> Result<()> {
        self.check_group(comm)?;
        if !self.same_tree {
            return Err(HMatrixError::InvalidInput(
                "The local product needs rows and columns in one cluster numbering.".to_string(),
            ));
        }
        let local = self.master_offsets[self.process];
        if x.len() != local.size * mu || y.len() != local.size * mu {
            return Err(HMatrixError::InvalidInput(format!(
                "Process {} owns {} rows but got {} and {} entries for {} vectors.",
                self.process,
                local.size,
                x.len(),
                y.len(),
                mu
            )));
        }

        let mut x_local = vec![T::zero(); x.len()];
        convert_layout(
            x,
            BatchLayout::Contiguous,
            &mut x_local,
            BatchLayout::Interleaved,
            local.size,
            mu,
        );
        let counts = self
            .master_offsets
            .iter()
            .map(|slice| slice.size * mu)
            .collect::<Vec<_>>();
        let mut x_cluster = vec![T::zero(); self.ncols() * mu];
        comm.all_gather_varcount(&x_local, &counts, &mut x_cluster)?;

        let mut partial = self.local_contributions(&x_cluster, mu);
        let y_local = if self.symmetry != Symmetry::None {
            comm.all_reduce_sum(&mut partial)?;
            &partial[local.offset * mu..local.end() * mu]
        } else {
            &partial[..]
        };
        convert_layout(
            y_local,
            BatchLayout::Interleaved,
            y,
            BatchLayout::Contiguous,
            local.size,
            mu,
        );
        Ok(())
    }
}
