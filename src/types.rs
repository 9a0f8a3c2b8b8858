//! General type definitions

/// Errors raised while building or applying a hierarchical matrix.
#[derive(thiserror::Error, Debug)]
pub enum HMatrixError {
    /// The point set cannot be clustered (for example because it is empty).
    #[error("Degenerate geometry: {0}")]
    GeometryDegenerate(String),
    /// Adaptive cross approximation stopped before reaching the target accuracy.
    #[error("ACA did not converge for a {rows}x{cols} block (rank {rank})")]
    AcaNonConvergent {
        /// Number of rows of the block
        rows: usize,
        /// Number of columns of the block
        cols: usize,
        /// Rank reached before stopping
        rank: usize,
    },
    /// A fixed rank larger than the block allows was requested.
    #[error("Requested rank {requested} exceeds the maximal rank {max} of the block")]
    RankExceeded {
        /// Requested rank
        requested: usize,
        /// Largest admissible rank, `min(rows, cols)`
        max: usize,
    },
    /// The processes disagree on the distribution of rows or columns.
    #[error("Partition mismatch: {0}")]
    PartitionMismatch(String),
    /// A collective communication primitive failed.
    #[error("Collective communication failed: {0}")]
    CollectiveTransportFailure(String),
    /// Arguments of a call do not fit the matrix.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, HMatrixError>;

/// Structure exploited when storing the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symmetry {
    /// General matrix, every block is stored.
    None,
    /// `A = A^T`, only one triangle is stored.
    Symmetric,
    /// `A = A^H`, only one triangle is stored.
    Hermitian,
}

/// Triangle kept in storage when a [Symmetry] other than [Symmetry::None] is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    /// Blocks on or below the diagonal
    Lower,
    /// Blocks on or above the diagonal
    Upper,
}

/// Rank control for a low-rank compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankRequest {
    /// Exactly this many rank-one terms.
    Fixed(usize),
    /// Stop when the relative accuracy is reached. The rank is bounded by
    /// `max_rank` if given and by `min(rows, cols)` otherwise.
    Auto {
        /// Rank budget
        max_rank: Option<usize>,
    },
}

/// Memory layout of a batch of `mu` vectors of length `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchLayout {
    /// Vector `m` occupies `[m * n, (m + 1) * n)`.
    Contiguous,
    /// Entry `i` of vector `m` sits at `i * mu + m`.
    Interleaved,
}

impl BatchLayout {
    /// Position of entry `index` of vector `vector` in a batch of `mu` vectors of length `n`.
    pub fn position(&self, index: usize, vector: usize, n: usize, mu: usize) -> usize {
        match self {
            BatchLayout::Contiguous => vector * n + index,
            BatchLayout::Interleaved => index * mu + vector,
        }
    }
}

/// Copy a batch of `mu` vectors of length `n` between two layouts.
pub fn convert_layout<T: Copy>(
    input: &[T],
    input_layout: BatchLayout,
    output: &mut [T],
    output_layout: BatchLayout,
    n: usize,
    mu: usize,
) {
    debug_assert_eq!(input.len(), n * mu);
    debug_assert_eq!(output.len(), n * mu);
    if input_layout == output_layout || mu == 1 {
        output.copy_from_slice(input);
        return;
    }
    for vector in 0..mu {
        for index in 0..n {
            output[output_layout.position(index, vector, n, mu)] =
                input[input_layout.position(index, vector, n, mu)];
        }
    }
}

/// Contiguous range `[offset, offset + size)` owned by one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MasterOffset {
    /// First index of the range
    pub offset: usize,
    /// Number of indices in the range
    pub size: usize,
}

impl MasterOffset {
    /// One past the last index of the range.
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Test whether `[offset, offset + size)` lies inside this range.
    pub fn contains_range(&self, offset: usize, size: usize) -> bool {
        offset >= self.offset && offset + size <= self.end()
    }

    /// Test whether `[offset, offset + size)` intersects this range.
    pub fn intersects(&self, offset: usize, size: usize) -> bool {
        offset < self.end() && self.offset < offset + size
    }
}
