//! Point clouds carrying the degrees of freedom
use crate::types::{HMatrixError, Result};
use rand::Rng;

/// Positions, radii and dof numbers of a point cloud.
///
/// Point `j` sits at `points[j]`, has extent `radii[j]` and carries the natural
/// dof number `tags[j]`. The tags form a bijection onto `0..len()`.
#[derive(Debug, Clone)]
pub struct Geometry {
    points: Vec<[f64; 3]>,
    radii: Vec<f64>,
    tags: Vec<usize>,
}

impl Geometry {
    /// Create a point cloud with zero radii where point `j` carries dof `j`.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        let npoints = points.len();
        Self {
            points,
            radii: vec![0.0; npoints],
            tags: (0..npoints).collect(),
        }
    }

    /// Attach a radius to every point.
    pub fn with_radii(mut self, radii: Vec<f64>) -> Result<Self> {
        if radii.len() != self.points.len() {
            return Err(HMatrixError::InvalidInput(format!(
                "{} radii given for {} points.",
                radii.len(),
                self.points.len()
            )));
        }
        if radii.iter().any(|r| !(*r >= 0.0)) {
            return Err(HMatrixError::InvalidInput(
                "Radii must be non-negative.".to_string(),
            ));
        }
        self.radii = radii;
        Ok(self)
    }

    /// Attach the natural dof number carried by every point.
    pub fn with_tags(mut self, tags: Vec<usize>) -> Result<Self> {
        let npoints = self.points.len();
        if tags.len() != npoints {
            return Err(HMatrixError::InvalidInput(format!(
                "{} tags given for {} points.",
                tags.len(),
                npoints
            )));
        }
        let mut seen = vec![false; npoints];
        for &tag in &tags {
            if tag >= npoints || seen[tag] {
                return Err(HMatrixError::InvalidInput(format!(
                    "Tag {tag} is out of range or repeated."
                )));
            }
            seen[tag] = true;
        }
        self.tags = tags;
        Ok(self)
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Test whether the cloud has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Coordinates of all points
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Radii of all points
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    /// Dof numbers of all points
    pub fn tags(&self) -> &[usize] {
        &self.tags
    }

    /// Radius-inflated bounding box of a subset of the points.
    pub fn bounding_box(&self, indices: &[usize]) -> BoundingBox {
        let mut bounds = BoundingBox {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        };
        for &index in indices {
            let point = &self.points[index];
            let radius = self.radii[index];
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(point[axis] - radius);
                bounds.max[axis] = bounds.max[axis].max(point[axis] + radius);
            }
        }
        bounds
    }
}

/// Axis aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Lower corner
    pub min: [f64; 3],
    /// Upper corner
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Side length along `axis`
    pub fn extent(&self, axis: usize) -> f64 {
        (self.max[axis] - self.min[axis]).max(0.0)
    }

    /// Axis of the longest side (the first one on ties)
    pub fn largest_axis(&self) -> usize {
        let mut axis = 0;
        for candidate in 1..3 {
            if self.extent(candidate) > self.extent(axis) {
                axis = candidate;
            }
        }
        axis
    }

    /// Midpoint
    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }

    /// Length of the diagonal
    pub fn diameter(&self) -> f64 {
        (0..3)
            .map(|axis| self.extent(axis).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Euclidean distance between two boxes, zero if they touch or overlap.
    pub fn distance(&self, other: &BoundingBox) -> f64 {
        let mut dist = 0.0;
        for axis in 0..3 {
            dist += f64::max(0.0, self.min[axis] - other.max[axis]).powi(2);
            dist += f64::max(0.0, other.min[axis] - self.max[axis]).powi(2);
        }
        dist.sqrt()
    }
}

/// Random points in the unit disk of the plane `z = height`.
///
/// The radial coordinate is the square root of a uniform sample so that the
/// points are uniformly spread over the disk.
pub fn unit_disk<R: Rng>(npoints: usize, height: f64, rng: &mut R) -> Geometry {
    let points = (0..npoints)
        .map(|_| {
            let rho: f64 = rng.gen();
            let theta: f64 = rng.gen();
            let angle = 2.0 * std::f64::consts::PI * theta;
            [rho.sqrt() * angle.cos(), rho.sqrt() * angle.sin(), height]
        })
        .collect();
    Geometry::new(points)
}

/// Nearly uniform points on the unit sphere (Fibonacci lattice).
pub fn fibonacci_sphere(npoints: usize) -> Geometry {
    let golden_angle = std::f64::consts::PI * (3.0 - 5f64.sqrt());
    let points = (0..npoints)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / npoints as f64;
            let r = (1.0 - z * z).sqrt();
            let angle = golden_angle * i as f64;
            [r * angle.cos(), r * angle.sin(), z]
        })
        .collect();
    Geometry::new(points)
}
