//! Compression statistics and accuracy checks
use super::HMatrix;
use crate::block::Block;
use crate::linalg::real_to_f64;
use crate::traits::{Exchange, KernelMatrix};
use crate::types::{HMatrixError, Result, Symmetry};
use rlst::RlstScalar;
use std::fmt;

/// Block statistics of a hierarchical matrix, summed over all processes.
#[derive(Debug, Clone, PartialEq)]
pub struct HMatrixInfo {
    /// Number of rows
    pub nrows: usize,
    /// Number of columns
    pub ncols: usize,
    /// Number of processes sharing the matrix
    pub nprocs: usize,
    /// Number of dense blocks
    pub dense_blocks: usize,
    /// Number of low-rank blocks
    pub low_rank_blocks: usize,
    /// Admissible blocks stored dense because compression failed
    pub fallback_blocks: usize,
    /// Smallest rank of a low-rank block
    pub min_rank: usize,
    /// Largest rank of a low-rank block
    pub max_rank: usize,
    /// Mean rank of the low-rank blocks
    pub mean_rank: f64,
    /// Scalars stored in all blocks
    pub stored_entries: usize,
    /// Scalars the stored blocks would need as dense arrays
    pub dense_entries: usize,
}

impl HMatrixInfo {
    pub(crate) fn gather<T: RlstScalar, C: Exchange<usize>>(
        nrows: usize,
        ncols: usize,
        blocks: &[Block<T>],
        comm: &C,
    ) -> Result<Self> {
        let mut sums = vec![0usize; 6];
        let mut min_rank = usize::MAX;
        let mut max_rank = 0;
        for block in blocks {
            match block.rank() {
                Some(rank) => {
                    sums[1] += 1;
                    sums[3] += rank;
                    min_rank = min_rank.min(rank);
                    max_rank = max_rank.max(rank);
                }
                None => sums[0] += 1,
            }
            if block.is_fallback() {
                sums[2] += 1;
            }
            sums[4] += block.stored_entries();
            sums[5] += block.row_size() * block.col_size();
        }
        Exchange::<usize>::all_reduce_sum(comm, &mut sums)?;

        let nprocs = comm.size();
        let mut extremes = vec![0; 2 * nprocs];
        Exchange::<usize>::all_gather_varcount(
            comm,
            &[min_rank, max_rank],
            &vec![2; nprocs],
            &mut extremes,
        )?;
        let min_rank = extremes.iter().step_by(2).copied().min().unwrap_or(0);
        let max_rank = extremes.iter().skip(1).step_by(2).copied().max().unwrap_or(0);

        let low_rank_blocks = sums[1];
        Ok(Self {
            nrows,
            ncols,
            nprocs,
            dense_blocks: sums[0],
            low_rank_blocks,
            fallback_blocks: sums[2],
            min_rank: if low_rank_blocks == 0 { 0 } else { min_rank },
            max_rank,
            mean_rank: if low_rank_blocks == 0 {
                0.0
            } else {
                sums[3] as f64 / low_rank_blocks as f64
            },
            stored_entries: sums[4],
            dense_entries: sums[5],
        })
    }

    /// Stored entries divided by the entries of the stored blocks
    pub fn compression_ratio(&self) -> f64 {
        if self.dense_entries == 0 {
            1.0
        } else {
            self.stored_entries as f64 / self.dense_entries as f64
        }
    }
}

impl fmt::Display for HMatrixInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} on {} process(es), {} dense and {} low-rank blocks ({} fallbacks), \
             rank min/mean/max {}/{:.1}/{}, compression ratio {:.4}",
            self.nrows,
            self.ncols,
            self.nprocs,
            self.dense_blocks,
            self.low_rank_blocks,
            self.fallback_blocks,
            self.min_rank,
            self.mean_rank,
            self.max_rank,
            self.compression_ratio()
        )
    }
}

impl<T: RlstScalar> HMatrix<T> {
    /// Relative Frobenius error against `reference`, keeping only the first
    /// `truncation` terms of every low-rank block (all terms if `None`).
    ///
    /// Evaluates the whole reference matrix; intended for testing.
    pub fn frobenius_error<K: KernelMatrix<T = T>, C: Exchange<f64>>(
        &self,
        reference: &K,
        truncation: Option<usize>,
        comm: &C,
    ) -> Result<f64> {
        if reference.nrows() != self.nrows() || reference.ncols() != self.ncols() {
            return Err(HMatrixError::InvalidInput(format!(
                "Reference of size {}x{} does not match a {}x{} matrix.",
                reference.nrows(),
                reference.ncols(),
                self.nrows(),
                self.ncols()
            )));
        }
        let mut sums = vec![0.0; 2];
        for block in &self.blocks {
            let (error, norm) = block.error_squared(reference, &self.rows, &self.cols, truncation);
            // Off-diagonal blocks stand for their mirror image as well.
            let weight = if self.symmetry != Symmetry::None && block.row_node() != block.col_node()
            {
                2.0
            } else {
                1.0
            };
            sums[0] += weight * real_to_f64::<T>(error);
            sums[1] += weight * real_to_f64::<T>(norm);
        }
        Exchange::<f64>::all_reduce_sum(comm, &mut sums)?;
        if sums[1] == 0.0 {
            Ok(sums[0].sqrt())
        } else {
            Ok((sums[0] / sums[1]).sqrt())
        }
    }
}
