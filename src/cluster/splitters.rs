//! Implementations of cluster bisection strategies
use crate::geometry::{BoundingBox, Geometry};
use crate::traits::ClusterSplitter;
use std::cmp::Ordering;

/// Split into two halves of equal size along the longest side of the box.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegularSplitter;

/// Split at the midpoint of the longest side of the box.
///
/// Children are not balanced in size; a split that leaves one side empty is
/// rejected and the caller falls back to halving by count.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricSplitter;

fn compare_along(geometry: &Geometry, axis: usize, a: usize, b: usize) -> Ordering {
    geometry.points()[a][axis]
        .partial_cmp(&geometry.points()[b][axis])
        .unwrap_or(Ordering::Equal)
        .then(a.cmp(&b))
}

impl ClusterSplitter for RegularSplitter {
    fn split(&self, geometry: &Geometry, bounds: &BoundingBox, indices: &mut [usize]) -> usize {
        let axis = bounds.largest_axis();
        indices.sort_by(|a, b| compare_along(geometry, axis, *a, *b));
        indices.len() / 2
    }
}

impl ClusterSplitter for GeometricSplitter {
    fn split(&self, geometry: &Geometry, bounds: &BoundingBox, indices: &mut [usize]) -> usize {
        let axis = bounds.largest_axis();
        let middle = bounds.center()[axis];
        indices.sort_by(|a, b| compare_along(geometry, axis, *a, *b));
        indices.partition_point(|index| geometry.points()[*index][axis] <= middle)
    }
}
