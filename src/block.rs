//! Block partition of a hierarchical matrix
use crate::cluster::{ClusterNode, ClusterTree};
use crate::linalg::{accumulate, accumulate_transpose, distance_squared};
use crate::low_rank::LowRankMatrix;
use crate::options::HMatrixOptions;
use crate::traits::{KernelMatrix, LowRankCompressor};
use crate::types::{HMatrixError, MasterOffset, RankRequest, Result, Symmetry, Triangle};
use log::debug;
use rlst::{rlst_dynamic_array2, DynamicArray, RawAccess, RawAccessMut, RlstScalar};

/// Admissibility condition `min(diam(I), diam(J)) <= eta dist(I, J)`.
///
/// Touching or overlapping clusters are never admissible.
pub fn is_admissible(row: &ClusterNode, col: &ClusterNode, eta: f64) -> bool {
    let dist = row.bounds.distance(&col.bounds);
    dist > 0.0 && row.diameter().min(col.diameter()) <= eta * dist
}

/// A leaf of the block partition before its payload is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlannedBlock {
    pub(crate) row_node: usize,
    pub(crate) col_node: usize,
    pub(crate) admissible: bool,
}

/// Walks the row and column trees together and records the leaves of the
/// block partition whose rows intersect `local`.
pub(crate) struct BlockPlanner<'a> {
    rows: &'a ClusterTree,
    cols: &'a ClusterTree,
    options: &'a HMatrixOptions,
    local: MasterOffset,
    same_tree: bool,
    blocks: Vec<PlannedBlock>,
}

impl<'a> BlockPlanner<'a> {
    pub(crate) fn new(
        rows: &'a ClusterTree,
        cols: &'a ClusterTree,
        options: &'a HMatrixOptions,
        local: MasterOffset,
        same_tree: bool,
    ) -> Self {
        Self {
            rows,
            cols,
            options,
            local,
            same_tree,
            blocks: Vec::new(),
        }
    }

    pub(crate) fn plan(mut self) -> Vec<PlannedBlock> {
        if self.local.size > 0 {
            self.visit(self.rows.root(), self.cols.root());
        }
        self.blocks
    }

    /// Blocks of the triangle that is not stored
    fn is_excluded(&self, row: &ClusterNode, col: &ClusterNode) -> bool {
        if !self.same_tree || self.options.symmetry() == Symmetry::None {
            return false;
        }
        match self.options.triangle() {
            Triangle::Lower => row.offset < col.offset,
            Triangle::Upper => row.offset > col.offset,
        }
    }

    fn visit(&mut self, row_id: usize, col_id: usize) {
        let row = self.rows.node(row_id);
        let col = self.cols.node(col_id);
        if self.is_excluded(row, col) || !self.local.intersects(row.offset, row.size) {
            return;
        }

        let must_split_row = !row.is_leaf()
            && (!self.local.contains_range(row.offset, row.size)
                || row.depth < self.options.min_target_depth());

        if !must_split_row
            && row.size > 1
            && col.size > 1
            && !(self.same_tree && row_id == col_id)
            && is_admissible(row, col, self.options.eta())
        {
            let too_large = row.size * col.size > self.options.max_block_size();
            if !(too_large && !row.is_leaf() && !col.is_leaf()) {
                self.blocks.push(PlannedBlock {
                    row_node: row_id,
                    col_node: col_id,
                    admissible: true,
                });
                return;
            }
        }

        match (row.children, col.children) {
            (Some(row_children), Some(col_children)) => {
                for r in row_children {
                    for c in col_children {
                        self.visit(r, c);
                    }
                }
            }
            (Some(row_children), None) if must_split_row => {
                for r in row_children {
                    self.visit(r, col_id);
                }
            }
            _ => self.blocks.push(PlannedBlock {
                row_node: row_id,
                col_node: col_id,
                admissible: false,
            }),
        }
    }
}

/// Payload of a block
pub enum BlockData<T: RlstScalar> {
    /// Column-major `rows x cols` array
    Dense(DynamicArray<T, 2>),
    /// Factorisation `U V^T`
    LowRank(LowRankMatrix<T>),
}

/// A leaf of the block partition together with its payload.
///
/// Offsets are in cluster numbering.
pub struct Block<T: RlstScalar> {
    row_node: usize,
    col_node: usize,
    row_offset: usize,
    row_size: usize,
    col_offset: usize,
    col_size: usize,
    data: BlockData<T>,
    fallback: bool,
}

impl<T: RlstScalar> Block<T> {
    /// Compute the payload of a planned block.
    pub(crate) fn assemble<K: KernelMatrix<T = T>, C: LowRankCompressor<T>>(
        kernel: &K,
        compressor: &C,
        rows: &ClusterTree,
        cols: &ClusterTree,
        planned: &PlannedBlock,
        options: &HMatrixOptions,
    ) -> Result<Self> {
        let row = rows.node(planned.row_node);
        let col = cols.node(planned.col_node);
        let row_indices = &rows.inverse_permutation()[row.offset..row.offset + row.size];
        let col_indices = &cols.inverse_permutation()[col.offset..col.offset + col.size];

        let mut fallback = false;
        let data = if planned.admissible {
            match compress(kernel, compressor, row_indices, col_indices, options) {
                Ok(low_rank) => BlockData::LowRank(low_rank),
                Err(
                    e @ (HMatrixError::AcaNonConvergent { .. }
                    | HMatrixError::RankExceeded { .. }),
                ) => {
                    debug!(
                        "Storing block {}x{} at ({}, {}) as dense: {}",
                        row.size, col.size, row.offset, col.offset, e
                    );
                    fallback = true;
                    BlockData::Dense(dense(kernel, row_indices, col_indices))
                }
                Err(e) => return Err(e),
            }
        } else {
            BlockData::Dense(dense(kernel, row_indices, col_indices))
        };

        Ok(Self {
            row_node: planned.row_node,
            col_node: planned.col_node,
            row_offset: row.offset,
            row_size: row.size,
            col_offset: col.offset,
            col_size: col.size,
            data,
            fallback,
        })
    }

    /// Row cluster
    pub fn row_node(&self) -> usize {
        self.row_node
    }

    /// Column cluster
    pub fn col_node(&self) -> usize {
        self.col_node
    }

    /// First row
    pub fn row_offset(&self) -> usize {
        self.row_offset
    }

    /// Number of rows
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// First column
    pub fn col_offset(&self) -> usize {
        self.col_offset
    }

    /// Number of columns
    pub fn col_size(&self) -> usize {
        self.col_size
    }

    /// Payload
    pub fn data(&self) -> &BlockData<T> {
        &self.data
    }

    /// Rank of a low-rank block
    pub fn rank(&self) -> Option<usize> {
        match &self.data {
            BlockData::Dense(_) => None,
            BlockData::LowRank(low_rank) => Some(low_rank.rank_of()),
        }
    }

    /// Whether the block was admissible but could not be compressed
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Number of scalars stored
    pub fn stored_entries(&self) -> usize {
        match &self.data {
            BlockData::Dense(_) => self.row_size * self.col_size,
            BlockData::LowRank(low_rank) => low_rank.stored_entries(),
        }
    }

    /// `y += B x` where `x` holds the block columns and `y` the block rows of
    /// `mu` interleaved vectors.
    pub(crate) fn accumulate(&self, x: &[T], y: &mut [T], mu: usize) {
        match &self.data {
            BlockData::Dense(array) => {
                accumulate(array.data(), self.row_size, self.col_size, x, y, mu, false)
            }
            BlockData::LowRank(low_rank) => low_rank.accumulate_mul(x, y, mu),
        }
    }

    /// `y += B^T x`, or `B^H x` if `conjugate` is set, where `x` holds the block
    /// rows and `y` the block columns.
    pub(crate) fn accumulate_transpose(&self, x: &[T], y: &mut [T], mu: usize, conjugate: bool) {
        match &self.data {
            BlockData::Dense(array) => accumulate_transpose(
                array.data(),
                self.row_size,
                self.col_size,
                x,
                y,
                mu,
                conjugate,
            ),
            BlockData::LowRank(low_rank) => {
                low_rank.accumulate_mul_transpose(x, y, mu, conjugate)
            }
        }
    }

    /// Squared Frobenius error against the reference and squared norm of the
    /// reference block, keeping the first `truncation` terms of a low-rank block.
    pub(crate) fn error_squared<K: KernelMatrix<T = T>>(
        &self,
        reference: &K,
        rows: &ClusterTree,
        cols: &ClusterTree,
        truncation: Option<usize>,
    ) -> (T::Real, T::Real) {
        let row_indices =
            &rows.inverse_permutation()[self.row_offset..self.row_offset + self.row_size];
        let col_indices =
            &cols.inverse_permutation()[self.col_offset..self.col_offset + self.col_size];
        match &self.data {
            BlockData::LowRank(low_rank) => {
                low_rank.frobenius_error_squared(reference, row_indices, col_indices, truncation)
            }
            BlockData::Dense(array) => {
                let mut exact = vec![T::zero(); self.row_size * self.col_size];
                reference.submatrix(row_indices, col_indices, &mut exact);
                let zeros = vec![T::zero(); exact.len()];
                (
                    distance_squared(&exact, array.data()),
                    distance_squared(&exact, &zeros),
                )
            }
        }
    }
}

fn dense<T: RlstScalar, K: KernelMatrix<T = T>>(
    kernel: &K,
    rows: &[usize],
    cols: &[usize],
) -> DynamicArray<T, 2> {
    let mut array = rlst_dynamic_array2!(T, [rows.len(), cols.len()]);
    kernel.submatrix(rows, cols, array.data_mut());
    array
}

/// Compress an admissible block, rejecting factorisations that did not
/// converge or that store more than the dense block.
fn compress<T: RlstScalar, K: KernelMatrix<T = T>, C: LowRankCompressor<T>>(
    kernel: &K,
    compressor: &C,
    rows: &[usize],
    cols: &[usize],
    options: &HMatrixOptions,
) -> Result<LowRankMatrix<T>> {
    let (m, n) = (rows.len(), cols.len());
    if let RankRequest::Fixed(k) = options.rank() {
        if k >= m.min(n) {
            return Err(HMatrixError::RankExceeded {
                requested: k,
                max: m.min(n),
            });
        }
    }
    let low_rank = compressor.compress(kernel, rows, cols, options.epsilon(), options.rank())?;
    if !low_rank.is_converged() || low_rank.stored_entries() >= m * n {
        return Err(HMatrixError::AcaNonConvergent {
            rows: m,
            cols: n,
            rank: low_rank.rank_of(),
        });
    }
    Ok(low_rank)
}
