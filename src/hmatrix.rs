//! Hierarchical matrices
mod builder;
mod diagnostics;
mod matvec;

pub use builder::HMatrixBuilder;
pub use diagnostics::HMatrixInfo;

use crate::block::Block;
use crate::cluster::ClusterTree;
use crate::types::{MasterOffset, Symmetry, Triangle};
use rlst::RlstScalar;

/// A hierarchical matrix distributed by rows.
///
/// Each process stores the blocks whose rows lie in its [MasterOffset] slice of
/// the row cluster numbering. The matrix is read-only once built.
pub struct HMatrix<T: RlstScalar> {
    rows: ClusterTree,
    cols: ClusterTree,
    same_tree: bool,
    master_offsets: Vec<MasterOffset>,
    process: usize,
    blocks: Vec<Block<T>>,
    symmetry: Symmetry,
    triangle: Triangle,
    epsilon: f64,
    eta: f64,
    info: HMatrixInfo,
}

impl<T: RlstScalar> HMatrix<T> {
    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.rows.npoints()
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.cols.npoints()
    }

    /// Target accuracy used for the low-rank blocks
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Admissibility parameter used for the partition
    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// Stored structure
    pub fn symmetry(&self) -> Symmetry {
        self.symmetry
    }

    /// Stored triangle
    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    /// Row slices of all processes
    pub fn master_offsets(&self) -> &[MasterOffset] {
        &self.master_offsets
    }

    /// Number of rows owned by this process
    pub fn local_row_count(&self) -> usize {
        self.master_offsets[self.process].size
    }

    /// First row owned by this process, in cluster numbering
    pub fn local_row_offset(&self) -> usize {
        self.master_offsets[self.process].offset
    }

    /// Cluster tree of the rows
    pub fn row_tree(&self) -> &ClusterTree {
        &self.rows
    }

    /// Cluster tree of the columns
    pub fn col_tree(&self) -> &ClusterTree {
        &self.cols
    }

    /// Whether rows and columns share one cluster tree
    pub fn is_square(&self) -> bool {
        self.same_tree
    }

    /// Map from natural to cluster row numbering
    pub fn forward_permutation(&self) -> &[usize] {
        self.rows.forward_permutation()
    }

    /// Map from cluster to natural row numbering
    pub fn inverse_permutation(&self) -> &[usize] {
        self.rows.inverse_permutation()
    }

    /// Map from natural to cluster column numbering
    pub fn col_forward_permutation(&self) -> &[usize] {
        self.cols.forward_permutation()
    }

    /// Map from cluster to natural column numbering
    pub fn col_inverse_permutation(&self) -> &[usize] {
        self.cols.inverse_permutation()
    }

    /// Reorder `mu` contiguous row vectors from natural to cluster numbering.
    pub fn permute_to_cluster(&self, natural: &[T], cluster: &mut [T], mu: usize) {
        self.rows.permute_to_cluster(natural, cluster, mu);
    }

    /// Reorder `mu` contiguous row vectors from cluster to natural numbering.
    pub fn permute_to_natural(&self, cluster: &[T], natural: &mut [T], mu: usize) {
        self.rows.permute_to_natural(cluster, natural, mu);
    }

    /// Reorder `mu` contiguous column vectors from natural to cluster numbering.
    pub fn permute_cols_to_cluster(&self, natural: &[T], cluster: &mut [T], mu: usize) {
        self.cols.permute_to_cluster(natural, cluster, mu);
    }

    /// Reorder `mu` contiguous column vectors from cluster to natural numbering.
    pub fn permute_cols_to_natural(&self, cluster: &[T], natural: &mut [T], mu: usize) {
        self.cols.permute_to_natural(cluster, natural, mu);
    }

    /// Visit the blocks stored on this process.
    pub fn for_each_local_block<F: FnMut(&Block<T>)>(&self, mut visitor: F) {
        for block in &self.blocks {
            visitor(block);
        }
    }

    /// Number of blocks stored on this process
    pub fn local_block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Summary over all processes, computed at construction
    pub fn info(&self) -> &HMatrixInfo {
        &self.info
    }

    /// Stored entries divided by the entries of the stored blocks, over all
    /// processes. Lies in `(0, 1]` and is `1` only if no block was compressed.
    pub fn compression_ratio(&self) -> f64 {
        self.info.compression_ratio()
    }

    /// `1 - compression_ratio()`
    pub fn compression(&self) -> f64 {
        1.0 - self.compression_ratio()
    }
}
