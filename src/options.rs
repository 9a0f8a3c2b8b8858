//! Construction parameters of a hierarchical matrix
use crate::types::{HMatrixError, RankRequest, Result, Symmetry, Triangle};

/// Options for building a hierarchical matrix
#[derive(Debug, Clone)]
pub struct HMatrixOptions {
    /// Target relative accuracy of the low-rank blocks
    pub(crate) epsilon: f64,
    /// Admissibility parameter
    pub(crate) eta: f64,
    /// Clusters with at most this many points are leaves
    pub(crate) min_cluster_size: usize,
    /// Admissible blocks with more entries are subdivided when possible
    pub(crate) max_block_size: usize,
    /// Row clusters above this depth are always subdivided
    pub(crate) min_target_depth: usize,
    /// Rank control passed to the compressor
    pub(crate) rank: RankRequest,
    /// Stored structure
    pub(crate) symmetry: Symmetry,
    /// Stored triangle if `symmetry` is not [Symmetry::None]
    pub(crate) triangle: Triangle,
}

impl Default for HMatrixOptions {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            eta: 10.0,
            min_cluster_size: 10,
            max_block_size: 1_000_000,
            min_target_depth: 0,
            rank: RankRequest::Auto { max_rank: None },
            symmetry: Symmetry::None,
            triangle: Triangle::Lower,
        }
    }
}

impl HMatrixOptions {
    /// Set the target relative accuracy
    pub fn set_epsilon(&mut self, epsilon: f64) -> &mut Self {
        self.epsilon = epsilon;
        self
    }

    /// Set the admissibility parameter
    pub fn set_eta(&mut self, eta: f64) -> &mut Self {
        self.eta = eta;
        self
    }

    /// Set the leaf threshold of the cluster trees
    pub fn set_min_cluster_size(&mut self, size: usize) -> &mut Self {
        self.min_cluster_size = size;
        self
    }

    /// Set the largest number of entries of a block sent to the compressor
    pub fn set_max_block_size(&mut self, size: usize) -> &mut Self {
        self.max_block_size = size;
        self
    }

    /// Set the depth above which row clusters are always subdivided
    pub fn set_min_target_depth(&mut self, depth: usize) -> &mut Self {
        self.min_target_depth = depth;
        self
    }

    /// Set the rank control of the compressor
    pub fn set_rank(&mut self, rank: RankRequest) -> &mut Self {
        self.rank = rank;
        self
    }

    /// Store only one triangle of a symmetric or Hermitian matrix
    pub fn set_symmetry(&mut self, symmetry: Symmetry, triangle: Triangle) -> &mut Self {
        self.symmetry = symmetry;
        self.triangle = triangle;
        self
    }

    /// Target relative accuracy
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Admissibility parameter
    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// Leaf threshold
    pub fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
    }

    /// Largest number of entries of a compressed block
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Depth above which row clusters are always subdivided
    pub fn min_target_depth(&self) -> usize {
        self.min_target_depth
    }

    /// Rank control
    pub fn rank(&self) -> RankRequest {
        self.rank
    }

    /// Stored structure
    pub fn symmetry(&self) -> Symmetry {
        self.symmetry
    }

    /// Stored triangle
    pub fn triangle(&self) -> Triangle {
        self.triangle
    }

    /// Reject values no matrix can be built with.
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(HMatrixError::InvalidInput(format!(
                "epsilon must be positive and finite, got {}.",
                self.epsilon
            )));
        }
        if self.eta.is_nan() || self.eta < 0.0 {
            return Err(HMatrixError::InvalidInput(format!(
                "eta must not be negative, got {}.",
                self.eta
            )));
        }
        if self.min_cluster_size == 0 {
            return Err(HMatrixError::InvalidInput(
                "Leaf clusters must hold at least one point.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_setters_chain() {
        let mut options = HMatrixOptions::default();
        options
            .set_epsilon(1e-3)
            .set_eta(2.0)
            .set_min_cluster_size(4)
            .set_symmetry(Symmetry::Hermitian, Triangle::Upper);
        assert_eq!(options.epsilon(), 1e-3);
        assert_eq!(options.eta(), 2.0);
        assert_eq!(options.min_cluster_size(), 4);
        assert_eq!(options.symmetry(), Symmetry::Hermitian);
        assert_eq!(options.triangle(), Triangle::Upper);
        assert_eq!(options.rank(), RankRequest::Auto { max_rank: None });
    }

    #[test]
    fn test_validate() {
        assert!(HMatrixOptions::default().validate().is_ok());

        let mut options = HMatrixOptions::default();
        options.set_min_cluster_size(0);
        assert!(matches!(options.validate(), Err(HMatrixError::InvalidInput(_))));

        for epsilon in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
            let mut options = HMatrixOptions::default();
            options.set_epsilon(epsilon);
            assert!(matches!(options.validate(), Err(HMatrixError::InvalidInput(_))));
        }

        let mut options = HMatrixOptions::default();
        options.set_eta(f64::NAN);
        assert!(options.validate().is_err());
        options.set_eta(0.0);
        assert!(options.validate().is_ok());
    }
}
