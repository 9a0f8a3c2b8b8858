//! Kernel matrices
use crate::geometry::Geometry;
use crate::linalg::f64_to_real;
use crate::traits::KernelMatrix;
use rlst::{
    c64, rlst_array_from_slice2, rlst_array_from_slice_mut2, rlst_dynamic_array2, DynamicArray,
    MultInto, RawAccess, RawAccessMut, RlstScalar, Shape, TransMode,
};
use std::f64::consts::PI;

/// A kernel matrix given by an explicit column-major array.
pub struct DenseKernelMatrix<T: RlstScalar> {
    data: DynamicArray<T, 2>,
}

impl<T: RlstScalar> DenseKernelMatrix<T> {
    /// Wrap a dense array.
    pub fn new(data: DynamicArray<T, 2>) -> Self {
        Self { data }
    }

    /// Evaluate every entry of another kernel matrix.
    pub fn from_kernel<K: KernelMatrix<T = T>>(kernel: &K) -> Self {
        let rows = (0..kernel.nrows()).collect::<Vec<_>>();
        let cols = (0..kernel.ncols()).collect::<Vec<_>>();
        let mut data = rlst_dynamic_array2!(T, [rows.len(), cols.len()]);
        kernel.submatrix(&rows, &cols, data.data_mut());
        Self { data }
    }

    /// The underlying array
    pub fn data(&self) -> &DynamicArray<T, 2> {
        &self.data
    }

    /// `y = A x` for `mu` contiguous vectors.
    pub fn matvec(&self, x: &[T], y: &mut [T], mu: usize) {
        let (m, n) = (self.nrows(), self.ncols());
        assert_eq!(x.len(), n * mu);
        assert_eq!(y.len(), m * mu);
        if m == 0 || n == 0 || mu == 0 {
            y.fill(T::zero());
            return;
        }
        rlst_array_from_slice_mut2!(y, [m, mu]).mult_into(
            TransMode::NoTrans,
            TransMode::NoTrans,
            T::one(),
            self.data.view(),
            rlst_array_from_slice2!(x, [n, mu]),
            T::zero(),
        );
    }
}

impl<T: RlstScalar> KernelMatrix for DenseKernelMatrix<T> {
    type T = T;

    fn nrows(&self) -> usize {
        self.data.shape()[0]
    }

    fn ncols(&self) -> usize {
        self.data.shape()[1]
    }

    fn coefficient(&self, i: usize, j: usize) -> T {
        self.data.data()[j * self.nrows() + i]
    }
}

/// A kernel matrix whose entries are computed by a closure.
pub struct FnKernelMatrix<T: RlstScalar, F: Fn(usize, usize) -> T + Sync> {
    nrows: usize,
    ncols: usize,
    f: F,
}

impl<T: RlstScalar, F: Fn(usize, usize) -> T + Sync> FnKernelMatrix<T, F> {
    /// Create a `nrows x ncols` matrix with entries `f(i, j)`.
    pub fn new(nrows: usize, ncols: usize, f: F) -> Self {
        Self { nrows, ncols, f }
    }
}

impl<T: RlstScalar, F: Fn(usize, usize) -> T + Sync> KernelMatrix for FnKernelMatrix<T, F> {
    type T = T;

    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn coefficient(&self, i: usize, j: usize) -> T {
        (self.f)(i, j)
    }
}

/// Points ordered by natural dof number.
fn points_by_dof(geometry: &Geometry) -> Vec<[f64; 3]> {
    let mut points = vec![[0.0; 3]; geometry.len()];
    for (point, tag) in geometry.points().iter().zip(geometry.tags()) {
        points[*tag] = *point;
    }
    points
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Interaction matrix of the Laplace Green's function `1 / (4 pi r)`.
///
/// With a regularisation `delta > 0` the entries are `1 / (4 pi sqrt(r^2 + delta^2))`.
/// Without it, coincident points interact with strength zero.
pub struct LaplaceKernelMatrix<T: RlstScalar> {
    targets: Vec<[f64; 3]>,
    sources: Vec<[f64; 3]>,
    delta: f64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: RlstScalar> LaplaceKernelMatrix<T> {
    /// Rows are the dofs of `targets` and columns the dofs of `sources`.
    pub fn new(targets: &Geometry, sources: &Geometry) -> Self {
        Self {
            targets: points_by_dof(targets),
            sources: points_by_dof(sources),
            delta: 0.0,
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the regularisation length.
    pub fn with_regularisation(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }
}

impl<T: RlstScalar> KernelMatrix for LaplaceKernelMatrix<T> {
    type T = T;

    fn nrows(&self) -> usize {
        self.targets.len()
    }

    fn ncols(&self) -> usize {
        self.sources.len()
    }

    fn coefficient(&self, i: usize, j: usize) -> T {
        let r = distance(&self.targets[i], &self.sources[j]);
        let r = (r * r + self.delta * self.delta).sqrt();
        if r == 0.0 {
            T::zero()
        } else {
            T::from_real(f64_to_real::<T>(0.25 / (PI * r)))
        }
    }
}

/// Interaction matrix of the Helmholtz Green's function `exp(i k r) / (4 pi r)`.
///
/// Coincident points interact with strength zero.
pub struct HelmholtzKernelMatrix {
    targets: Vec<[f64; 3]>,
    sources: Vec<[f64; 3]>,
    wavenumber: f64,
}

impl HelmholtzKernelMatrix {
    /// Rows are the dofs of `targets` and columns the dofs of `sources`.
    pub fn new(targets: &Geometry, sources: &Geometry, wavenumber: f64) -> Self {
        Self {
            targets: points_by_dof(targets),
            sources: points_by_dof(sources),
            wavenumber,
        }
    }
}

impl KernelMatrix for HelmholtzKernelMatrix {
    type T = c64;

    fn nrows(&self) -> usize {
        self.targets.len()
    }

    fn ncols(&self) -> usize {
        self.sources.len()
    }

    fn coefficient(&self, i: usize, j: usize) -> c64 {
        let r = distance(&self.targets[i], &self.sources[j]);
        if r == 0.0 {
            return c64::new(0.0, 0.0);
        }
        let scale = 0.25 / (PI * r);
        let phase = self.wavenumber * r;
        c64::new(scale * phase.cos(), scale * phase.sin())
    }
}
