//! Bisection of clusters
use crate::geometry::{BoundingBox, Geometry};

/// Strategy to split the points of a cluster in two.
pub trait ClusterSplitter: Sync {
    /// Reorder `indices` (point numbers into `geometry`) so that the first child
    /// comes first, and return the number of points of the first child.
    ///
    /// `bounds` is the radius-inflated bounding box of the points in `indices`.
    /// A return value of `0` or `indices.len()` signals that no useful split was
    /// found; the caller then falls back to halving the cluster by count.
    fn split(&self, geometry: &Geometry, bounds: &BoundingBox, indices: &mut [usize]) -> usize;
}
