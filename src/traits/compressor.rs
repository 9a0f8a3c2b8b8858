//! Low-rank compression of matrix blocks
use crate::low_rank::LowRankMatrix;
use crate::traits::KernelMatrix;
use crate::types::{RankRequest, Result};
use rlst::RlstScalar;

/// Produce a low-rank factorisation `U V^T` of a kernel submatrix.
pub trait LowRankCompressor<T: RlstScalar>: Sync {
    /// Compress the block `rows x cols` of `kernel`.
    ///
    /// - `rows`, `cols`: natural indices of the block.
    /// - `epsilon`: target relative accuracy, used when `rank` is [RankRequest::Auto].
    /// - `rank`: fixed rank or automatic stopping.
    ///
    /// A fixed rank above `min(rows.len(), cols.len())` is an error. Failure to reach
    /// `epsilon` is not an error: the returned matrix is flagged as not converged.
    fn compress<K: KernelMatrix<T = T>>(
        &self,
        kernel: &K,
        rows: &[usize],
        cols: &[usize],
        epsilon: f64,
        rank: RankRequest,
    ) -> Result<LowRankMatrix<T>>;
}
